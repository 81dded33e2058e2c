//! The untyped record/value model records are received as (§3).
//!
//! The upstream runtime hands the sink dynamically-shaped data; we
//! model it as a tagged sum rather than relying on any runtime
//! reflection, per the design notes.

use std::collections::HashMap;
use std::fmt;

/// One inbound record, addressed by its topic/partition/offset
/// coordinates.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub kafka_partition: i32,
    pub offset: i64,
    pub key: Option<SinkData>,
    pub value: Option<SinkData>,
    pub headers: Vec<Header>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub value: SinkData,
}

/// A dynamically-typed value flowing through the sink. `Null` carries
/// no schema annotation here (the schema side-channel a real connector
/// would thread through is collapsed into this crate's `Missing`
/// handling; see `extract`).
#[derive(Debug, Clone)]
pub enum SinkData {
    Struct(HashMap<String, SinkData>),
    Map(HashMap<String, SinkData>),
    Array(Vec<SinkData>),
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    Null,
}

impl SinkData {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            SinkData::String(_)
                | SinkData::Int(_)
                | SinkData::Long(_)
                | SinkData::Float(_)
                | SinkData::Double(_)
                | SinkData::Boolean(_)
                | SinkData::Null
        )
    }

    /// Canonical decimal/lowercase rendering used both for partition
    /// values and for numeric header rendering (§4.1: headers render by
    /// canonical decimal form, not type-specific suffixes).
    pub fn render(&self) -> String {
        match self {
            SinkData::String(s) => s.clone(),
            SinkData::Int(i) => i.to_string(),
            SinkData::Long(l) => l.to_string(),
            SinkData::Float(f) => render_float(*f as f64),
            SinkData::Double(d) => render_float(*d),
            SinkData::Boolean(b) => b.to_string(),
            SinkData::Bytes(b) => String::from_utf8_lossy(b).to_string(),
            SinkData::Null => "null".to_string(),
            SinkData::Struct(_) | SinkData::Map(_) | SinkData::Array(_) => {
                "[complex]".to_string()
            }
        }
    }
}

fn render_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl fmt::Display for SinkData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

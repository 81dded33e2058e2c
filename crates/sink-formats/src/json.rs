use sink_core::SinkData;

use crate::{FormatWriter, Result};

/// Newline-delimited JSON: one object per record, concatenated as
/// records are appended (§4.5, §8 S1/S2).
pub struct JsonWriter {
    buf: Vec<u8>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl FormatWriter for JsonWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        let json = to_json(value);
        serde_json::to_writer(&mut self.buf, &json).map_err(|e| crate::FormatError::Other(e.into()))?;
        self.buf.push(b'\n');
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.buf)
    }
}

pub(crate) fn to_json(value: &SinkData) -> serde_json::Value {
    match value {
        SinkData::Null => serde_json::Value::Null,
        SinkData::Boolean(b) => serde_json::Value::Bool(*b),
        SinkData::Int(i) => serde_json::Value::from(*i),
        SinkData::Long(l) => serde_json::Value::from(*l),
        SinkData::Float(f) => serde_json::json!(*f),
        SinkData::Double(d) => serde_json::json!(*d),
        SinkData::String(s) => serde_json::Value::String(s.clone()),
        SinkData::Bytes(b) => serde_json::Value::String(base64_lite(b)),
        SinkData::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        SinkData::Struct(fields) | SinkData::Map(fields) => {
            let mut map = serde_json::Map::new();
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            for key in keys {
                map.insert(key.clone(), to_json(&fields[key]));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Minimal base64 encoding so `Bytes` values round-trip through JSON
/// without pulling in another dependency for one call site.
fn base64_lite(bytes: &[u8]) -> String {
    const TABLE: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        out.push(TABLE[(b0 >> 2) as usize] as char);
        out.push(TABLE[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 {
            TABLE[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            TABLE[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

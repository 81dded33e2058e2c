use std::io::Write;
use std::sync::{Arc, Mutex};

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use sink_core::SinkData;

use crate::{reject, FormatWriter, Result};

/// A `Vec<u8>` sink that also lets us read back the bytes written so
/// far, so `current_size` can report real (if pre-footer) progress
/// instead of a constant.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Parquet is not append-continuable across files (§4.5): a schema
/// change always means a new writer, never mutating this one. The
/// reported `current_size` is the pre-footer estimate the design notes
/// (§9) call out as approximate by design.
pub struct ParquetWriter {
    writer: Option<ArrowWriter<SharedBuffer>>,
    buffer: SharedBuffer,
    schema: Option<Arc<Schema>>,
    columns: Vec<String>,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            writer: None,
            buffer: SharedBuffer::default(),
            schema: None,
            columns: Vec::new(),
        }
    }
}

impl FormatWriter for ParquetWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        let fields = match value {
            SinkData::Struct(f) | SinkData::Map(f) => f,
            other => return Err(reject("parquet", other)),
        };

        if self.writer.is_none() {
            let mut names: Vec<String> = fields.keys().cloned().collect();
            names.sort();
            let arrow_fields: Vec<Field> = names
                .iter()
                .map(|name| Field::new(name, arrow_type(&fields[name]), true))
                .collect();
            let schema = Arc::new(Schema::new(arrow_fields));
            let writer = ArrowWriter::try_new(self.buffer.clone(), schema.clone(), None)
                .map_err(|e| crate::FormatError::Other(e.into()))?;
            self.writer = Some(writer);
            self.schema = Some(schema);
            self.columns = names;
        }

        let schema = self.schema.clone().expect("initialized above");
        let batch = build_single_row_batch(&schema, &self.columns, fields)?;
        self.writer
            .as_mut()
            .expect("initialized above")
            .write(&batch)
            .map_err(|e| crate::FormatError::Other(e.into()))?;
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.buffer.0.lock().unwrap().len() as u64
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        match self.writer {
            Some(writer) => {
                writer.close().map_err(|e| crate::FormatError::Other(e.into()))?;
            }
            None => {}
        }
        let bytes = self.buffer.0.lock().unwrap().clone();
        Ok(bytes)
    }
}

fn arrow_type(value: &SinkData) -> DataType {
    match value {
        SinkData::Boolean(_) => DataType::Boolean,
        SinkData::Int(_) | SinkData::Long(_) => DataType::Int64,
        SinkData::Float(_) | SinkData::Double(_) => DataType::Float64,
        SinkData::String(_) | SinkData::Bytes(_) => DataType::Utf8,
        SinkData::Null | SinkData::Struct(_) | SinkData::Map(_) | SinkData::Array(_) => {
            DataType::Utf8
        }
    }
}

fn build_single_row_batch(
    schema: &Arc<Schema>,
    columns: &[String],
    fields: &std::collections::HashMap<String, SinkData>,
) -> Result<RecordBatch> {
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let value = fields.get(name).unwrap_or(&SinkData::Null);
        let array: ArrayRef = match schema.field(idx).data_type() {
            DataType::Boolean => Arc::new(BooleanArray::from(vec![as_bool(value)])),
            DataType::Int64 => Arc::new(Int64Array::from(vec![as_i64(value)])),
            DataType::Float64 => Arc::new(Float64Array::from(vec![as_f64(value)])),
            DataType::Utf8 => Arc::new(StringArray::from(vec![as_string(value)])),
            _ => Arc::new(NullArray::new(1)),
        };
        arrays.push(array);
    }
    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| crate::FormatError::Other(e.into()))
}

fn as_bool(v: &SinkData) -> Option<bool> {
    match v {
        SinkData::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn as_i64(v: &SinkData) -> Option<i64> {
    match v {
        SinkData::Int(i) => Some(*i as i64),
        SinkData::Long(l) => Some(*l),
        _ => None,
    }
}

fn as_f64(v: &SinkData) -> Option<f64> {
    match v {
        SinkData::Float(f) => Some(*f as f64),
        SinkData::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_string(v: &SinkData) -> Option<String> {
    match v {
        SinkData::String(s) => Some(s.clone()),
        SinkData::Bytes(b) => Some(String::from_utf8_lossy(b).to_string()),
        SinkData::Null => None,
        other => Some(other.render()),
    }
}

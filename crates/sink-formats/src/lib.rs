//! # sink-formats
//!
//! C5: the format writer abstraction (§4.5) and one implementation per
//! `sink_core::Format`. Each writer owns an in-memory byte buffer; the
//! staging store (`sink-store`) decides whether those bytes land on
//! local disk or stream straight to a multipart upload.

mod avro;
mod bytes;
mod csv;
mod json;
mod parquet;
mod text;

use sink_core::{Format, SinkData};

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("record type incompatible with format: {0}")]
    Incompatible(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;

/// A streaming byte producer for one open file. `write` enforces
/// format-specific compatibility; `current_size` is best-effort but
/// must be monotonic; `finish` finalizes (footers, compressors) and
/// returns the complete byte stream.
pub trait FormatWriter: Send {
    fn write(&mut self, value: &SinkData) -> Result<()>;
    fn current_size(&self) -> u64;
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Open a fresh writer for `format`. Parquet and Avro are not
/// append-continuable (§4.5: `Format::append_continuable`), so callers
/// must always call this rather than try to reuse a finished writer.
pub fn open(format: Format) -> Box<dyn FormatWriter> {
    match format {
        Format::Json => Box::new(json::JsonWriter::new()),
        Format::Csv => Box::new(csv::CsvWriter::new(false)),
        Format::CsvWithHeaders => Box::new(csv::CsvWriter::new(true)),
        Format::Text => Box::new(text::TextWriter::new()),
        Format::Bytes => Box::new(bytes::BytesWriter::new()),
        Format::Avro => Box::new(avro::AvroWriter::new()),
        Format::Parquet => Box::new(parquet::ParquetWriter::new()),
    }
}

pub(crate) fn reject(format: &str, value: &SinkData) -> FormatError {
    FormatError::Incompatible(format!("{format} writer cannot accept {value:?}"))
}

//! The format enum (§3). Encoder implementations live in `sink-formats`;
//! this crate only needs the static facts about each format (extension,
//! what record shapes it accepts) to drive naming and validation.

use crate::error::SinkError;
use crate::model::SinkData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Avro,
    Parquet,
    Csv,
    CsvWithHeaders,
    Text,
    Bytes,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Avro => "avro",
            Format::Parquet => "parquet",
            Format::Csv | Format::CsvWithHeaders => "csv",
            Format::Text => "text",
            Format::Bytes => "bytes",
        }
    }

    pub fn parse(name: &str) -> Result<Format, SinkError> {
        match name.to_ascii_uppercase().as_str() {
            "JSON" => Ok(Format::Json),
            "AVRO" => Ok(Format::Avro),
            "PARQUET" => Ok(Format::Parquet),
            "CSV" => Ok(Format::Csv),
            "CSV_WITHHEADERS" => Ok(Format::CsvWithHeaders),
            "TEXT" => Ok(Format::Text),
            "BYTES" => Ok(Format::Bytes),
            other => Err(SinkError::Config(format!("unknown STOREAS format: {other}"))),
        }
    }

    /// Whether `value` may legally be appended under this format.
    /// TEXT requires `String`, BYTES requires `Bytes`; everything else
    /// accepts any `Struct`/`Map`/primitive (§3, §4.5).
    pub fn accepts(&self, value: &SinkData) -> bool {
        match self {
            Format::Text => matches!(value, SinkData::String(_)),
            Format::Bytes => matches!(value, SinkData::Bytes(_)),
            Format::Csv | Format::CsvWithHeaders => {
                matches!(value, SinkData::Struct(_) | SinkData::Map(_))
            }
            Format::Parquet | Format::Avro => {
                matches!(value, SinkData::Struct(_) | SinkData::Map(_) | SinkData::Array(_))
            }
            Format::Json => true,
        }
    }

    /// Parquet is not append-continuable across files: a new file
    /// always means a new writer (§4.5). This is true of Avro's
    /// container format in this implementation too (one `Writer` owns
    /// one output buffer), so both report `false`.
    pub fn append_continuable(&self) -> bool {
        !matches!(self, Format::Parquet | Format::Avro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rejects_non_string() {
        assert!(!Format::Text.accepts(&SinkData::Long(1)));
        assert!(Format::Text.accepts(&SinkData::String("x".into())));
    }

    #[test]
    fn bytes_rejects_non_bytes() {
        assert!(!Format::Bytes.accepts(&SinkData::String("x".into())));
        assert!(Format::Bytes.accepts(&SinkData::Bytes(vec![1, 2])));
    }

    #[test]
    fn unknown_format_is_config_error() {
        assert!(Format::parse("XML").is_err());
    }
}

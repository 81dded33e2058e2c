use sink_core::SinkData;

use crate::{reject, FormatWriter, Result};

/// CSV requires `Struct`/`Map` values with primitive fields (§3,
/// §4.5). The column order is fixed by the first record's field names,
/// sorted for determinism (schema changes across the file boundary are
/// the writer manager's job, not this writer's). `CSV_WITHHEADERS`
/// writes the header row once per file, at construction.
pub struct CsvWriter {
    inner: ::csv::Writer<Vec<u8>>,
    with_headers: bool,
    columns: Option<Vec<String>>,
}

impl CsvWriter {
    pub fn new(with_headers: bool) -> Self {
        Self {
            inner: ::csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new()),
            with_headers,
            columns: None,
        }
    }

    fn field_names(value: &SinkData) -> Option<Vec<String>> {
        match value {
            SinkData::Struct(fields) | SinkData::Map(fields) => {
                let mut names: Vec<String> = fields.keys().cloned().collect();
                names.sort();
                Some(names)
            }
            _ => None,
        }
    }
}

impl FormatWriter for CsvWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        let fields = match value {
            SinkData::Struct(f) | SinkData::Map(f) => f,
            other => return Err(reject("csv", other)),
        };

        let columns = match &self.columns {
            Some(c) => c.clone(),
            None => {
                let names = Self::field_names(value).expect("checked above");
                if self.with_headers {
                    self.inner
                        .write_record(&names)
                        .map_err(|e| crate::FormatError::Other(e.into()))?;
                }
                self.columns = Some(names.clone());
                names
            }
        };

        let row: Vec<String> = columns
            .iter()
            .map(|c| fields.get(c).map(|v| v.render()).unwrap_or_default())
            .collect();
        self.inner
            .write_record(&row)
            .map_err(|e| crate::FormatError::Other(e.into()))?;
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.inner.get_ref().len() as u64
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
        self.inner
            .flush()
            .map_err(|e| crate::FormatError::Other(e.into()))?;
        self.inner
            .into_inner()
            .map_err(|e| crate::FormatError::Other(anyhow::anyhow!(e.to_string())))
    }
}

//! C2: builds the ordered logical-partition identity from a record and
//! a list of partition selectors (§4.2).

use crate::error::SinkError;
use crate::extract::{extract, extract_header, Extracted, Source};
use crate::model::{Record, SinkData};

/// One `PARTITIONBY` selector (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionField {
    ValuePath(Vec<String>),
    KeyPath(Vec<String>),
    HeaderPath(String, Vec<String>),
    WholeKey,
    Topic,
    Partition,
}

/// `(displayName, renderedValue)`, ordered, forming the logical
/// partition identity. Equality is by ordered tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPartitionKey(pub Vec<(String, String)>);

impl LogicalPartitionKey {
    pub fn empty() -> Self {
        LogicalPartitionKey(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Build the display name for a selector in `NAME_VALUE` (KeysAndValues)
/// mode, per §4.2.
fn display_name(field: &PartitionField) -> String {
    match field {
        PartitionField::ValuePath(path) => path.join("."),
        PartitionField::KeyPath(path) => {
            if path.is_empty() {
                "key".to_string()
            } else {
                path.join(".")
            }
        }
        PartitionField::HeaderPath(name, sub) => {
            if sub.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", name, sub.join("."))
            }
        }
        PartitionField::WholeKey => "key".to_string(),
        PartitionField::Topic => "topic".to_string(),
        PartitionField::Partition => "partition".to_string(),
    }
}

/// Build the `LogicalPartitionKey` for `record` given the configured
/// selectors. `/` in a rendered value is rejected at config-parse time,
/// not here (§3) — callers that accept arbitrary runtime values should
/// still treat a slash as a config bug surfaced earlier.
pub fn build_partition_key(
    record: &Record,
    selectors: &[PartitionField],
) -> Result<LogicalPartitionKey, SinkError> {
    let mut entries = Vec::with_capacity(selectors.len());

    for field in selectors {
        let name = display_name(field);
        let rendered = match field {
            PartitionField::ValuePath(path) => {
                let extracted = extract(record, Source::Value, path);
                check_primitive_if_key(field, &extracted)?;
                extracted.render()
            }
            PartitionField::KeyPath(path) => {
                let extracted = extract(record, Source::Key, path);
                check_primitive_if_key(field, &extracted)?;
                extracted.render()
            }
            PartitionField::HeaderPath(header, sub) => {
                extract_header(record, header, sub)?.render()
            }
            PartitionField::WholeKey => {
                let extracted = extract(record, Source::Key, &[]);
                check_primitive_if_key(field, &extracted)?;
                extracted.render()
            }
            PartitionField::Topic => record.topic.clone(),
            PartitionField::Partition => record.kafka_partition.to_string(),
        };
        entries.push((name, rendered));
    }

    Ok(LogicalPartitionKey(entries))
}

/// `PARTITIONBY _key` (or a bare key path) over a non-primitive key is
/// `NON_PRIMITIVE_KEY` (§4.2).
fn check_primitive_if_key(field: &PartitionField, extracted: &Extracted) -> Result<(), SinkError> {
    let is_key_field = matches!(
        field,
        PartitionField::WholeKey | PartitionField::KeyPath(_)
    );
    if !is_key_field {
        return Ok(());
    }
    if let Extracted::Value(SinkData::Struct(_) | SinkData::Map(_) | SinkData::Array(_)) =
        extracted
    {
        return Err(SinkError::RecordType(
            "NON_PRIMITIVE_KEY: _key partitioner requires a primitive key".to_string(),
        ));
    }
    Ok(())
}

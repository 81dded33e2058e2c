//! C1: pure evaluation of a dotted path against a record's value, key,
//! or header, returning a typed scalar or `Missing`.

use crate::error::SinkError;
use crate::model::{Record, SinkData};

/// Where a path is rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Value,
    Key,
}

/// The result of an extraction: either a scalar-ish `SinkData` or an
/// explicit absence. Absence in value/key is not an error (§4.1); it is
/// only promoted to `HEADER_NOT_FOUND` when the absent thing is a header
/// that participates in partitioning.
#[derive(Debug, Clone)]
pub enum Extracted {
    Value(SinkData),
    Missing,
}

impl Extracted {
    pub fn render(&self) -> String {
        match self {
            Extracted::Value(v) => v.render(),
            Extracted::Missing => "[missing]".to_string(),
        }
    }
}

/// `ValuePath([])`/`KeyPath([])` select the whole value/key.
pub fn extract(record: &Record, source: Source, path: &[String]) -> Extracted {
    let root = match source {
        Source::Value => record.value.as_ref(),
        Source::Key => record.key.as_ref(),
    };
    let Some(root) = root else {
        return Extracted::Missing;
    };
    if path.is_empty() {
        return Extracted::Value(root.clone());
    }
    walk(root, path)
}

fn walk(data: &SinkData, path: &[String]) -> Extracted {
    let Some((head, rest)) = path.split_first() else {
        return Extracted::Value(data.clone());
    };
    let next = match data {
        SinkData::Struct(fields) | SinkData::Map(fields) => fields.get(head),
        _ => None,
    };
    match next {
        None => Extracted::Missing,
        Some(SinkData::Null) => Extracted::Missing,
        Some(v) if rest.is_empty() => Extracted::Value(v.clone()),
        Some(v) => walk(v, rest),
    }
}

/// Find header `name` and, if `subpath` is non-empty, recurse into its
/// structured value the same way value/key traversal does. Returns
/// `HEADER_NOT_FOUND` if the header is absent — the one case where
/// absence is an error rather than `Missing`, per §4.1.
pub fn extract_header(
    record: &Record,
    name: &str,
    subpath: &[String],
) -> Result<Extracted, SinkError> {
    let header = record
        .headers
        .iter()
        .find(|h| h.name == name)
        .ok_or_else(|| SinkError::HeaderMissing(name.to_string()))?;

    if subpath.is_empty() {
        Ok(Extracted::Value(header.value.clone()))
    } else {
        Ok(walk(&header.value, subpath))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rec(value: SinkData) -> Record {
        Record {
            topic: "t".into(),
            kafka_partition: 0,
            offset: 0,
            key: None,
            value: Some(value),
            headers: vec![],
            timestamp: None,
        }
    }

    #[test]
    fn missing_field_on_null_returns_missing() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), SinkData::Null);
        let r = rec(SinkData::Struct(fields));
        let path = vec!["name".to_string()];
        assert!(matches!(extract(&r, Source::Value, &path), Extracted::Missing));
    }

    #[test]
    fn absent_map_key_is_missing() {
        let r = rec(SinkData::Map(HashMap::new()));
        let path = vec!["region".to_string()];
        assert!(matches!(extract(&r, Source::Value, &path), Extracted::Missing));
    }

    #[test]
    fn header_numeric_renders_canonical_decimal() {
        let r = Record {
            topic: "t".into(),
            kafka_partition: 0,
            offset: 0,
            key: None,
            value: None,
            headers: vec![crate::model::Header {
                name: "longheader".into(),
                value: SinkData::Long(2),
            }],
            timestamp: None,
        };
        let extracted = extract_header(&r, "longheader", &[]).unwrap();
        assert_eq!(extracted.render(), "2");
    }

    #[test]
    fn missing_header_is_error() {
        let r = rec(SinkData::Null);
        assert!(extract_header(&r, "nope", &[]).is_err());
    }
}

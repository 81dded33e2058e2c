use apache_avro::types::Value as AvroValue;
use apache_avro::{to_avro_datum, Schema, Writer};
use sink_core::SinkData;

use crate::{reject, FormatWriter, Result};

/// Avro requires `Struct`/`Map`/`Array` values (§3, §4.5). The schema
/// is inferred from the first record written and fixed for the
/// lifetime of the file — a later schema-change roll opens a brand new
/// writer with a freshly inferred schema, never mutates this one.
///
/// `apache_avro::Writer` borrows its schema for its own lifetime, so
/// holding one open across calls would either leak the schema or make
/// this struct self-referential. Instead, records are buffered as
/// `AvroValue`s and the `Writer` is built once, at `finish`, from the
/// schema this struct owns.
pub struct AvroWriter {
    schema: Option<Box<Schema>>,
    buffered: Vec<AvroValue>,
    approx_size: u64,
}

impl AvroWriter {
    pub fn new() -> Self {
        Self {
            schema: None,
            buffered: Vec::new(),
            approx_size: 0,
        }
    }
}

impl FormatWriter for AvroWriter {
    fn write(&mut self, value: &SinkData) -> Result<()> {
        if !matches!(
            value,
            SinkData::Struct(_) | SinkData::Map(_) | SinkData::Array(_)
        ) {
            return Err(reject("avro", value));
        }

        if self.schema.is_none() {
            let schema_json = infer_schema(value);
            let schema = Schema::parse_str(&schema_json.to_string())
                .map_err(|e| crate::FormatError::Other(e.into()))?;
            self.schema = Some(Box::new(schema));
        }

        let schema = self.schema.as_ref().expect("initialized above");
        let avro_value = to_avro_value(value);
        let datum = to_avro_datum(schema, avro_value.clone())
            .map_err(|e| crate::FormatError::Other(e.into()))?;
        self.approx_size += datum.len() as u64;
        self.buffered.push(avro_value);
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.approx_size
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        let schema = match &self.schema {
            Some(schema) => schema,
            None => return Ok(Vec::new()),
        };
        let mut writer = Writer::new(schema, Vec::new());
        for value in self.buffered {
            writer
                .append(value)
                .map_err(|e| crate::FormatError::Other(e.into()))?;
        }
        writer
            .into_inner()
            .map_err(|e| crate::FormatError::Other(e.into()))
    }
}

fn to_avro_value(value: &SinkData) -> AvroValue {
    match value {
        SinkData::Null => AvroValue::Null,
        SinkData::Boolean(b) => AvroValue::Boolean(*b),
        SinkData::Int(i) => AvroValue::Int(*i),
        SinkData::Long(l) => AvroValue::Long(*l),
        SinkData::Float(f) => AvroValue::Float(*f),
        SinkData::Double(d) => AvroValue::Double(*d),
        SinkData::String(s) => AvroValue::String(s.clone()),
        SinkData::Bytes(b) => AvroValue::Bytes(b.clone()),
        SinkData::Array(items) => AvroValue::Array(items.iter().map(to_avro_value).collect()),
        SinkData::Struct(fields) => {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort();
            AvroValue::Record(
                names
                    .into_iter()
                    .map(|k| (k.clone(), to_avro_value(&fields[k])))
                    .collect(),
            )
        }
        SinkData::Map(fields) => AvroValue::Map(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_avro_value(v)))
                .collect(),
        ),
    }
}

fn avro_type_name(value: &SinkData) -> serde_json::Value {
    match value {
        SinkData::Null => serde_json::json!("null"),
        SinkData::Boolean(_) => serde_json::json!("boolean"),
        SinkData::Int(_) => serde_json::json!("int"),
        SinkData::Long(_) => serde_json::json!("long"),
        SinkData::Float(_) => serde_json::json!("float"),
        SinkData::Double(_) => serde_json::json!("double"),
        SinkData::String(_) => serde_json::json!("string"),
        SinkData::Bytes(_) => serde_json::json!("bytes"),
        SinkData::Array(items) => serde_json::json!({
            "type": "array",
            "items": items.first().map(avro_type_name).unwrap_or(serde_json::json!("string")),
        }),
        SinkData::Map(fields) => serde_json::json!({
            "type": "map",
            "values": fields.values().next().map(avro_type_name).unwrap_or(serde_json::json!("string")),
        }),
        SinkData::Struct(_) => record_schema("nested", value),
    }
}

fn record_schema(name: &str, value: &SinkData) -> serde_json::Value {
    let fields = match value {
        SinkData::Struct(fields) => fields,
        _ => unreachable!("record_schema only called for Struct values"),
    };
    let mut names: Vec<&String> = fields.keys().collect();
    names.sort();
    let field_defs: Vec<serde_json::Value> = names
        .iter()
        .map(|k| {
            serde_json::json!({
                "name": k,
                "type": ["null", avro_type_name(&fields[*k])],
                "default": null_default(),
            })
        })
        .collect();
    serde_json::json!({
        "type": "record",
        "name": name,
        "fields": field_defs,
    })
}

fn null_default() -> serde_json::Value {
    serde_json::Value::Null
}

/// Infer an Avro record schema from the first value written to this
/// file. Every field is wrapped `["null", T]` so later records with a
/// genuinely missing field don't need a distinct schema — the writer
/// manager still rolls on a true schema-fingerprint change (§3).
fn infer_schema(value: &SinkData) -> serde_json::Value {
    match value {
        SinkData::Struct(_) => record_schema("record", value),
        other => avro_type_name(other),
    }
}

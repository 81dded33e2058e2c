//! Per-partition writer (C7, §4.7). `OpenFile` is the live state for
//! one `(topic, kafkaPartition, logicalPartitionKey)` while it is
//! buffering records between commits.

use sink_core::error::Result;
use sink_core::naming::{ObjectNamingStrategy, PartitionerMode};
use sink_core::partition_key::LogicalPartitionKey;
use sink_core::{CommitState, Format, SinkData};
use sink_formats::FormatWriter;
use sink_store::Stage;

/// Shallow schema fingerprint: the sorted set of field names and their
/// top-level type tags. Good enough to detect the schema-change rolls
/// §4.7/§8 (invariant 2) require without needing a declared schema —
/// records are untyped at the boundary (§9).
pub fn schema_fingerprint(value: &SinkData) -> String {
    match value {
        SinkData::Struct(fields) | SinkData::Map(fields) => {
            let mut entries: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{k}:{}", type_tag(v)))
                .collect();
            entries.sort();
            entries.join(",")
        }
        other => type_tag(other).to_string(),
    }
}

fn type_tag(value: &SinkData) -> &'static str {
    match value {
        SinkData::Struct(_) => "struct",
        SinkData::Map(_) => "map",
        SinkData::Array(_) => "array",
        SinkData::String(_) => "string",
        SinkData::Int(_) => "int",
        SinkData::Long(_) => "long",
        SinkData::Float(_) => "float",
        SinkData::Double(_) => "double",
        SinkData::Boolean(_) => "boolean",
        SinkData::Bytes(_) => "bytes",
        SinkData::Null => "null",
    }
}

/// Live state for one `(topic, kafkaPartition, logicalPartitionKey)`
/// between `Idle` and the next successful commit (§4.7).
pub struct OpenFile {
    pub topic: String,
    pub kafka_partition: i32,
    pub partition_key: LogicalPartitionKey,
    pub format: Format,
    pub naming_strategy: ObjectNamingStrategy,
    pub partitioner_mode: PartitionerMode,
    pub prefix: String,
    pub first_offset: i64,
    pub last_offset: i64,
    pub schema_fingerprint: Option<String>,
    pub commit_state: CommitState,
    writer: Box<dyn FormatWriter>,
    stage: Stage,
}

impl OpenFile {
    pub fn open(
        topic: String,
        kafka_partition: i32,
        partition_key: LogicalPartitionKey,
        format: Format,
        naming_strategy: ObjectNamingStrategy,
        partitioner_mode: PartitionerMode,
        prefix: String,
        offset: i64,
        stage: Stage,
        now_millis: i64,
    ) -> Self {
        Self {
            topic,
            kafka_partition,
            partition_key,
            format,
            naming_strategy,
            partitioner_mode,
            prefix,
            first_offset: offset,
            last_offset: offset,
            schema_fingerprint: None,
            commit_state: CommitState {
                record_count: 0,
                bytes_written: 0,
                opened_at_millis: now_millis,
            },
            writer: sink_formats::open(format),
            stage,
        }
    }

    /// Append one record's value. Caller is responsible for having
    /// already checked the schema fingerprint and rolled if needed —
    /// this only appends and tracks bookkeeping.
    pub fn append(&mut self, value: &SinkData, offset: i64) -> Result<()> {
        self.writer
            .write(value)
            .map_err(|e| sink_core::error::SinkError::RecordType(e.to_string()))?;
        self.last_offset = offset;
        self.commit_state.record_count += 1;
        self.commit_state.bytes_written = self.writer.current_size();
        if self.schema_fingerprint.is_none() {
            self.schema_fingerprint = Some(schema_fingerprint(value));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.commit_state.record_count == 0
    }

    /// Finalize the format writer and stage the committed byte payload,
    /// along with the object key to put it under. This is the
    /// `Flushing --format close OK--> Uploading` edge. The returned
    /// `Stage` is what the manager retries an upload against on a
    /// `StoreTransient` error (§4.10): OpenFile state is preserved by
    /// simply not discarding this stage until the put succeeds.
    pub fn finish(mut self) -> Result<(String, Stage)> {
        let key = sink_core::naming::object_name(
            self.naming_strategy,
            self.partitioner_mode,
            &self.prefix,
            &self.topic,
            self.kafka_partition,
            self.last_offset,
            &self.partition_key,
            self.format.extension(),
        );
        let bytes = self
            .writer
            .finish()
            .map_err(|e| sink_core::error::SinkError::Other(anyhow::anyhow!(e.to_string())))?;
        self.stage.write_all(&bytes)?;
        Ok((key, self.stage))
    }
}

//! Writer manager (C8, §4.8). Owns the table of open files, applies
//! dedup/schema-roll/commit-policy logic, and preserves per-partition
//! offset-commit ordering.

use std::collections::HashMap;

use sink_core::error::{Result, SinkError};
use sink_core::partition_key::{build_partition_key, LogicalPartitionKey};
use sink_core::{KcqlStatement, Record};
use sink_store::{S3Client, Stage};
use tracing::{info, warn};

use crate::writer::{schema_fingerprint, OpenFile};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriterKey {
    topic: String,
    kafka_partition: i32,
    logical: Vec<(String, String)>,
}

fn writer_key(topic: &str, kafka_partition: i32, key: &LogicalPartitionKey) -> WriterKey {
    WriterKey {
        topic: topic.to_string(),
        kafka_partition,
        logical: key.0.clone(),
    }
}

/// A committed object, reported once its upload has actually succeeded.
pub struct CommitReport {
    pub topic: String,
    pub kafka_partition: i32,
    pub object_key: String,
    pub next_offset: i64,
}

pub struct WriterManager {
    statement: KcqlStatement,
    write_mode: sink_core::config::WriteMode,
    local_tmp_directory: std::path::PathBuf,
    open_files: HashMap<WriterKey, OpenFile>,
    last_committed_offset: HashMap<(String, i32), i64>,
}

impl WriterManager {
    pub fn new(
        statement: KcqlStatement,
        write_mode: sink_core::config::WriteMode,
        local_tmp_directory: std::path::PathBuf,
    ) -> Self {
        Self {
            statement,
            write_mode,
            local_tmp_directory,
            open_files: HashMap::new(),
            last_committed_offset: HashMap::new(),
        }
    }

    pub fn seed_last_committed_offset(&mut self, topic: &str, kafka_partition: i32, offset: i64) {
        self.last_committed_offset
            .insert((topic.to_string(), kafka_partition), offset);
    }

    fn new_stage(&self) -> Result<Stage> {
        match self.write_mode {
            sink_core::config::WriteMode::BuildLocal => Stage::build_local(&self.local_tmp_directory),
            sink_core::config::WriteMode::Streamed => Ok(Stage::streamed()),
        }
    }

    /// Drive one batch through dedup → partition → append → policy
    /// evaluation → commit (§4.8 step 1), then sweep every remaining
    /// open file for the same `(topic, kafkaPartition)`s touched by
    /// this batch for a policy-triggered flush (§4.8 step 2). An empty
    /// batch still runs the sweep (§4.8 step 3, §4.4).
    pub async fn put(
        &mut self,
        client: &S3Client,
        records: &[Record],
        now_millis: i64,
    ) -> Result<Vec<CommitReport>> {
        let mut reports = Vec::new();
        let mut touched: Vec<(String, i32)> = Vec::new();

        for record in records {
            let last_committed = self
                .last_committed_offset
                .get(&(record.topic.clone(), record.kafka_partition))
                .copied();
            if let Some(last) = last_committed {
                if record.offset <= last {
                    continue; // dedup (§4.8.1.a)
                }
            }

            let partition_key = build_partition_key(record, &self.statement.partition_by)?;
            let key = writer_key(&record.topic, record.kafka_partition, &partition_key);
            let value = record
                .value
                .as_ref()
                .ok_or_else(|| SinkError::RecordType("record has no value to write".into()))?;

            if !self.statement.format.accepts(value) {
                return Err(SinkError::RecordType(format!(
                    "{:?} writer cannot accept this record's value shape",
                    self.statement.format
                )));
            }

            if let Some(existing) = self.open_files.get(&key) {
                let incoming_fingerprint = schema_fingerprint(value);
                let needs_roll = existing
                    .schema_fingerprint
                    .as_ref()
                    .is_some_and(|fp| fp != &incoming_fingerprint);
                if needs_roll {
                    if let Some(report) = self.commit(client, key.clone()).await? {
                        reports.push(report);
                    }
                }
            }

            if !self.open_files.contains_key(&key) {
                let stage = self.new_stage()?;
                let open_file = OpenFile::open(
                    record.topic.clone(),
                    record.kafka_partition,
                    partition_key,
                    self.statement.format,
                    self.statement.naming_strategy(),
                    self.statement.partitioner_mode,
                    self.statement.prefix.clone(),
                    record.offset,
                    stage,
                    now_millis,
                );
                self.open_files.insert(key.clone(), open_file);
            }

            let open_file = self.open_files.get_mut(&key).expect("just inserted or present");
            open_file.append(value, record.offset)?;
            touched.push((record.topic.clone(), record.kafka_partition));

            if self
                .statement
                .commit_policy
                .should_flush(open_file.commit_state, now_millis)
            {
                if let Some(report) = self.commit(client, key).await? {
                    reports.push(report);
                }
            }
        }

        touched.sort();
        touched.dedup();
        for (topic, kafka_partition) in &touched {
            self.sweep_time_policy(client, topic, *kafka_partition, now_millis, &mut reports)
                .await?;
        }

        reports.sort_by_key(|r| (r.kafka_partition, r.next_offset));
        Ok(reports)
    }

    async fn sweep_time_policy(
        &mut self,
        client: &S3Client,
        topic: &str,
        kafka_partition: i32,
        now_millis: i64,
        reports: &mut Vec<CommitReport>,
    ) -> Result<()> {
        let mut keys: Vec<(WriterKey, i64)> = self
            .open_files
            .iter()
            .filter(|(k, f)| {
                k.topic == topic
                    && k.kafka_partition == kafka_partition
                    && self
                        .statement
                        .commit_policy
                        .should_flush(f.commit_state, now_millis)
            })
            .map(|(k, f)| (k.clone(), f.last_offset))
            .collect();
        keys.sort_by_key(|(_, last_offset)| *last_offset);
        for (key, _) in keys {
            if let Some(report) = self.commit(client, key).await? {
                reports.push(report);
            }
        }
        Ok(())
    }

    /// Flush every open file, regardless of commit policy (§4.11
    /// `close`, §8 invariant 6).
    pub async fn close_all(&mut self, client: &S3Client) -> Result<Vec<CommitReport>> {
        let mut keys: Vec<(WriterKey, i64)> = self
            .open_files
            .iter()
            .map(|(k, f)| (k.clone(), f.last_offset))
            .collect();
        keys.sort_by_key(|(_, last_offset)| *last_offset);
        let mut reports = Vec::new();
        for (key, _) in keys {
            if let Some(report) = self.commit(client, key).await? {
                reports.push(report);
            }
        }
        reports.sort_by_key(|r| (r.kafka_partition, r.next_offset));
        Ok(reports)
    }

    /// Flush only the `OpenFile`s belonging to the given `(topic,
    /// kafkaPartition)` pairs, regardless of commit policy — used when
    /// a subset of assigned partitions is revoked while siblings stay
    /// assigned (§4.11 `close`). Ordered by `last_offset` within each
    /// partition, same as `close_all`.
    pub async fn close_partitions(
        &mut self,
        client: &S3Client,
        partitions: &[(String, i32)],
    ) -> Result<Vec<CommitReport>> {
        let mut keys: Vec<(WriterKey, i64)> = self
            .open_files
            .iter()
            .filter(|(k, _)| {
                partitions
                    .iter()
                    .any(|(topic, kp)| &k.topic == topic && k.kafka_partition == *kp)
            })
            .map(|(k, f)| (k.clone(), f.last_offset))
            .collect();
        keys.sort_by_key(|(_, last_offset)| *last_offset);
        let mut reports = Vec::new();
        for (key, _) in keys {
            if let Some(report) = self.commit(client, key).await? {
                reports.push(report);
            }
        }
        reports.sort_by_key(|r| (r.kafka_partition, r.next_offset));
        Ok(reports)
    }

    /// `Open --policy triggers flush--> Flushing --format close OK-->
    /// Uploading --put OK--> Idle`. On success the writer entry is
    /// removed and the next offset to commit is returned for the
    /// runtime. Empty files (never appended to) are dropped silently,
    /// not uploaded.
    async fn commit(&mut self, client: &S3Client, key: WriterKey) -> Result<Option<CommitReport>> {
        let open_file = match self.open_files.remove(&key) {
            Some(f) => f,
            None => return Ok(None),
        };
        if open_file.is_empty() {
            return Ok(None);
        }

        let topic = open_file.topic.clone();
        let kafka_partition = open_file.kafka_partition;
        let last_offset = open_file.last_offset;
        let (object_key, mut stage) = open_file.finish()?;

        let bytes = stage.contents()?;
        client.put(&object_key, bytes).await?;
        stage.cleanup();

        info!(topic, kafka_partition, object_key, last_offset, "committed object");
        self.last_committed_offset
            .insert((topic.clone(), kafka_partition), last_offset);

        Ok(Some(CommitReport {
            topic,
            kafka_partition,
            object_key,
            next_offset: last_offset + 1,
        }))
    }

    /// Number of writers currently open, for monitoring and tests.
    pub fn open_count(&self) -> usize {
        self.open_files.len()
    }

    pub fn last_committed_offset(&self, topic: &str, kafka_partition: i32) -> Option<i64> {
        self.last_committed_offset
            .get(&(topic.to_string(), kafka_partition))
            .copied()
    }

    /// Drop every open file without uploading (used on `stop` without
    /// a prior `close`, §8 scenario S2).
    pub fn discard_all(&mut self) {
        if !self.open_files.is_empty() {
            warn!(count = self.open_files.len(), "discarding unflushed open files on stop");
        }
        self.open_files.clear();
    }
}

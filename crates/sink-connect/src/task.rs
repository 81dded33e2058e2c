//! Task lifecycle (C11, §4.11): bridges the runtime's record-delivery
//! protocol to the writer manager (C8) and offset seeker (C9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sink_core::config::SinkConfig;
use sink_core::error::{Result, SinkError};
use sink_core::Record;
use sink_store::{last_committed_offset, S3Client};
use tracing::{error, info, warn};

use crate::context::SinkContext;
use crate::manager::{CommitReport, WriterManager};
use crate::retry::{classify, Outcome};

/// Bounded number of redelivery attempts for a transient store error
/// under the RETRY error policy, before giving up and propagating the
/// error as fatal (§4.10).
const MAX_RETRY_ATTEMPTS: u32 = 5;

pub struct SinkTask {
    config: SinkConfig,
    clients: HashMap<String, Arc<S3Client>>,
    managers: HashMap<usize, WriterManager>,
    context: Arc<dyn SinkContext>,
}

impl SinkTask {
    /// `start(props)`: parse/validate already happened in
    /// `SinkConfig::from_properties` (§4.11); this just builds the
    /// per-statement manager table and one S3 client per bucket.
    pub fn start(config: SinkConfig, context: Arc<dyn SinkContext>) -> Result<Self> {
        let mut clients: HashMap<String, Arc<S3Client>> = HashMap::new();
        for statement in &config.statements {
            if !clients.contains_key(&statement.bucket) {
                let client = S3Client::new(&config.connection, &statement.bucket)?;
                clients.insert(statement.bucket.clone(), Arc::new(client));
            }
        }
        Self::start_with_clients(config, clients, context)
    }

    /// Same as `start`, but with already-built per-bucket clients
    /// instead of constructing them from `config.connection` — used by
    /// tests to run a `SinkTask` against an in-memory or
    /// failure-injecting store.
    pub fn start_with_clients(
        config: SinkConfig,
        clients: HashMap<String, Arc<S3Client>>,
        context: Arc<dyn SinkContext>,
    ) -> Result<Self> {
        let mut managers = HashMap::new();
        for (idx, statement) in config.statements.iter().enumerate() {
            clients
                .get(&statement.bucket)
                .ok_or_else(|| SinkError::Config(format!("no client configured for bucket {}", statement.bucket)))?;
            let manager = WriterManager::new(
                statement.clone(),
                config.write_mode,
                config.local_tmp_directory.clone(),
            );
            managers.insert(idx, manager);
        }

        Ok(Self {
            config,
            clients,
            managers,
            context,
        })
    }

    fn client_for(&self, bucket: &str) -> Result<Arc<S3Client>> {
        self.clients
            .get(bucket)
            .cloned()
            .ok_or_else(|| SinkError::Config(format!("no client configured for bucket {bucket}")))
    }

    /// `open(tps)`: C9 runs for each assigned partition; the runtime is
    /// seeked to the committed offset + 1 when one was found (§4.9).
    /// Reopening a partition within the same task lifetime re-seeks
    /// unconditionally (§9 open question) — idempotent by design.
    pub async fn open(&mut self, assigned: &[(String, i32)]) -> Result<()> {
        for (topic, kafka_partition) in assigned {
            let (idx, statement) = self
                .config
                .statements
                .iter()
                .enumerate()
                .find(|(_, s)| &s.topic == topic)
                .ok_or_else(|| SinkError::Config(format!("no KCQL statement for topic {topic}")))?;

            let client = self.client_for(&statement.bucket)?;
            let committed = last_committed_offset(
                &client,
                statement.naming_strategy(),
                &statement.prefix,
                topic,
                *kafka_partition,
            )
            .await?;

            if let Some(offset) = committed {
                info!(topic, kafka_partition, offset, "seeking to last committed offset");
                self.context.seek(topic, *kafka_partition, offset + 1);
                if let Some(manager) = self.managers.get_mut(&idx) {
                    manager.seed_last_committed_offset(topic, *kafka_partition, offset);
                }
            }
        }
        Ok(())
    }

    /// `put(batch)`: C8 drives; exceptions propagate per C10.
    pub async fn put(&mut self, records: Vec<Record>, now_millis: i64) -> Result<()> {
        let mut by_statement: HashMap<usize, Vec<Record>> = HashMap::new();
        for record in records {
            let idx = self
                .config
                .statements
                .iter()
                .position(|s| s.topic == record.topic)
                .ok_or_else(|| {
                    SinkError::Config(format!("no KCQL statement for topic {}", record.topic))
                })?;
            by_statement.entry(idx).or_default().push(record);
        }

        // §4.8 step 3: an empty put still sweeps time-based policy, so
        // every configured statement runs even with no records routed
        // to it this round.
        for idx in 0..self.config.statements.len() {
            let batch = by_statement.remove(&idx).unwrap_or_default();
            self.put_one_statement(idx, &batch, now_millis).await?;
        }
        Ok(())
    }

    /// Runs `manager.put` to completion, retrying under backoff while
    /// the error policy classifies the failure as `Outcome::Retry`
    /// (§4.10). `Outcome::Fatal` aborts immediately; retries give up
    /// after `MAX_RETRY_ATTEMPTS` and propagate the last error as
    /// fatal, since a store that is still failing after that many
    /// backoffs is no longer a transient blip.
    async fn put_one_statement(&mut self, idx: usize, batch: &[Record], now_millis: i64) -> Result<()> {
        let bucket = self.config.statements[idx].bucket.clone();
        let client = self.client_for(&bucket)?;
        let retry_interval = Duration::from_millis(self.config.error_retry_interval_millis);
        let mut attempt = 0u32;

        loop {
            let manager = self
                .managers
                .get_mut(&idx)
                .ok_or_else(|| SinkError::Config("writer manager missing for statement".into()))?;

            match manager.put(&client, batch, now_millis).await {
                Ok(reports) => {
                    self.report_commits(reports);
                    return Ok(());
                }
                Err(err) => {
                    let outcome = classify(&err, self.config.error_policy);
                    match outcome {
                        Outcome::Recovered => {
                            warn!(error = %err, "recovered locally, continuing");
                            return Ok(());
                        }
                        Outcome::Retry => {
                            attempt += 1;
                            if attempt > MAX_RETRY_ATTEMPTS {
                                error!(error = %err, attempt, "exhausted retry attempts, aborting task");
                                return Err(err);
                            }
                            warn!(error = %err, attempt, "transient store error, retrying after backoff");
                            tokio::time::sleep(retry_interval).await;
                        }
                        Outcome::Fatal => {
                            error!(error = %err, "fatal error, aborting task");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    fn report_commits(&self, reports: Vec<CommitReport>) {
        for report in reports {
            self.context
                .report_offset(&report.topic, report.kafka_partition, report.next_offset);
        }
    }

    /// `close(tps)`: flush OpenFiles for exactly the closing `(topic,
    /// kafkaPartition)` pairs, regardless of commit policy (§4.11, §8
    /// invariant 6) — siblings on the same statement that are not in
    /// `partitions` are left open. Retries the same way `put` does.
    pub async fn close(&mut self, partitions: &[(String, i32)]) -> Result<()> {
        let mut by_statement: HashMap<usize, Vec<(String, i32)>> = HashMap::new();
        for (topic, kafka_partition) in partitions {
            if let Some((idx, _)) = self
                .config
                .statements
                .iter()
                .enumerate()
                .find(|(_, s)| &s.topic == topic)
            {
                by_statement
                    .entry(idx)
                    .or_default()
                    .push((topic.clone(), *kafka_partition));
            }
        }

        for (idx, assigned) in by_statement {
            let bucket = self.config.statements[idx].bucket.clone();
            let client = self.client_for(&bucket)?;
            let retry_interval = Duration::from_millis(self.config.error_retry_interval_millis);
            let mut attempt = 0u32;

            loop {
                let manager = self
                    .managers
                    .get_mut(&idx)
                    .ok_or_else(|| SinkError::Config("writer manager missing for statement".into()))?;

                match manager.close_partitions(&client, &assigned).await {
                    Ok(reports) => {
                        self.report_commits(reports);
                        break;
                    }
                    Err(err) => {
                        let outcome = classify(&err, self.config.error_policy);
                        match outcome {
                            Outcome::Recovered => break,
                            Outcome::Retry => {
                                attempt += 1;
                                if attempt > MAX_RETRY_ATTEMPTS {
                                    error!(error = %err, attempt, "exhausted retry attempts while closing, aborting task");
                                    return Err(err);
                                }
                                warn!(error = %err, attempt, "transient store error while closing, retrying after backoff");
                                tokio::time::sleep(retry_interval).await;
                            }
                            Outcome::Fatal => {
                                error!(error = %err, "fatal error while closing, aborting task");
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// `stop()`: release local resources. A safe no-op if `start` never
    /// succeeded (there is simply nothing in `self.managers` to drop).
    pub fn stop(&mut self) {
        for manager in self.managers.values_mut() {
            manager.discard_all();
        }
    }
}

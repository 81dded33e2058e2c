//! Worker binary that drives a `sink_connect::SinkTask` against a live
//! Kafka cluster.
//!
//! Configuration is two-layered, the way a Kafka Connect worker is
//! configured in practice: an optional YAML profile supplies defaults
//! (cluster-wide settings a team keeps checked in), and a native
//! properties file — `connect.s3.*` keys, one `key=value` per line —
//! overrides them for a specific connector instance. Deprecated
//! `aws.*` aliases are mirrored onto their canonical keys before the
//! merged bag is handed to `sink_core::config::from_properties`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::{ClientConfig, Offset};
use sink_connect::{SinkContext, SinkTask};
use sink_core::config::{apply_deprecated_aliases, from_properties};
use sink_core::{Header, Record, SinkData};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "s3-sink-runner")]
#[command(about = "Runs a KCQL-configured Kafka-to-S3 sink task against a live cluster")]
struct Args {
    /// Native connector properties file (`connect.s3.*` keys, one
    /// `key=value` per line).
    #[arg(short, long)]
    properties: PathBuf,

    /// Optional YAML profile supplying defaults the properties file
    /// can override.
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long, default_value = "localhost:9092")]
    brokers: String,

    #[arg(long, default_value = "s3-sink-runner")]
    group_id: String,

    /// Maximum records accumulated before a `put` is issued, even if
    /// the commit policy itself would wait for more.
    #[arg(long, default_value_t = 500)]
    batch_size: usize,

    /// Maximum time to wait for a batch to fill before issuing a
    /// `put` with whatever arrived (and sweeping time-based commit
    /// policy on every statement, per §4.8 step 3).
    #[arg(long, default_value_t = 500)]
    batch_timeout_ms: u64,
}

/// Bridges `SinkContext` callbacks onto a live `rdkafka` consumer
/// handle. Both calls are the synchronous, fire-and-forget primitives
/// `rdkafka::consumer::Consumer` exposes directly.
struct KafkaContext {
    consumer: Arc<StreamConsumer>,
}

impl SinkContext for KafkaContext {
    fn seek(&self, topic: &str, partition: i32, offset: i64) {
        if let Err(e) = self
            .consumer
            .seek(topic, partition, Offset::Offset(offset), Duration::from_secs(5))
        {
            warn!(topic, partition, offset, error = %e, "failed to seek consumer");
        }
    }

    fn report_offset(&self, topic: &str, partition: i32, offset: i64) {
        if let Err(e) = self.consumer.store_offset(topic, partition, offset - 1) {
            warn!(topic, partition, offset, error = %e, "failed to store consumer offset");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut props = HashMap::new();
    if let Some(profile) = &args.profile {
        props.extend(load_yaml_profile(profile)?);
    }
    props.extend(load_properties_file(&args.properties)?);
    apply_deprecated_aliases(&mut props);

    let config = from_properties(&props).context("invalid connector configuration")?;
    info!(statements = config.statements.len(), "loaded connector configuration");

    let topics: Vec<&str> = config
        .statements
        .iter()
        .map(|s| s.topic.as_str())
        .collect();

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &args.brokers)
        .set("group.id", &args.group_id)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .create()
        .context("failed to create Kafka consumer")?;
    consumer
        .subscribe(&topics)
        .context("failed to subscribe to configured topics")?;
    let consumer = Arc::new(consumer);

    let context = Arc::new(KafkaContext {
        consumer: consumer.clone(),
    });
    let mut task = SinkTask::start(config, context)?;

    let mut opened_partitions: HashSet<(String, i32)> = HashSet::new();
    let mut batch: Vec<Record> = Vec::new();
    let mut stream = consumer.stream();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received, flushing open writers");
                if !batch.is_empty() {
                    let now = now_millis();
                    task.put(std::mem::take(&mut batch), now).await?;
                }
                let assigned: Vec<(String, i32)> = opened_partitions.iter().cloned().collect();
                task.close(&assigned).await?;
                task.stop();
                break;
            }
            message = tokio::time::timeout(Duration::from_millis(args.batch_timeout_ms), stream.next()) => {
                match message {
                    Ok(Some(Ok(m))) => {
                        let topic = m.topic().to_string();
                        let partition = m.partition();
                        let key = (topic.clone(), partition);
                        if opened_partitions.insert(key) {
                            // §9: a reopened partition re-seeks unconditionally;
                            // this lazily treats "first message observed" the
                            // same as "partition assigned". Any record that
                            // slipped through before the seek lands is simply
                            // deduplicated by offset (§4.8.1.a), so correctness
                            // does not depend on seeking before the first poll.
                            task.open(&[(topic.clone(), partition)]).await?;
                        }
                        batch.push(record_from_message(&m)?);
                        if batch.len() >= args.batch_size {
                            let now = now_millis();
                            task.put(std::mem::take(&mut batch), now).await?;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "kafka error while polling");
                    }
                    Ok(None) => {
                        info!("consumer stream ended");
                        break;
                    }
                    Err(_timeout) => {
                        // §4.8 step 3: flush the accumulated batch (possibly
                        // empty) so time-based commit policy still sweeps.
                        let now = now_millis();
                        task.put(std::mem::take(&mut batch), now).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn record_from_message(m: &rdkafka::message::BorrowedMessage<'_>) -> Result<Record> {
    let value = m
        .payload()
        .map(|bytes| serde_json::from_slice::<serde_json::Value>(bytes))
        .transpose()
        .context("record payload is not valid JSON")?
        .map(|v| json_to_sink_data(&v));

    let key = m
        .key()
        .map(|bytes| match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(v) => json_to_sink_data(&v),
            Err(_) => SinkData::String(String::from_utf8_lossy(bytes).to_string()),
        });

    let headers = m
        .headers()
        .map(|hs| {
            hs.iter()
                .map(|h| Header {
                    name: h.key.to_string(),
                    value: h
                        .value
                        .map(|v| SinkData::String(String::from_utf8_lossy(v).to_string()))
                        .unwrap_or(SinkData::Null),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Record {
        topic: m.topic().to_string(),
        kafka_partition: m.partition(),
        offset: m.offset(),
        key,
        value,
        headers,
        timestamp: m.timestamp().to_millis(),
    })
}

fn json_to_sink_data(value: &serde_json::Value) -> SinkData {
    match value {
        serde_json::Value::Null => SinkData::Null,
        serde_json::Value::Bool(b) => SinkData::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SinkData::Long(i)
            } else {
                SinkData::Double(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => SinkData::String(s.clone()),
        serde_json::Value::Array(items) => {
            SinkData::Array(items.iter().map(json_to_sink_data).collect())
        }
        serde_json::Value::Object(fields) => SinkData::Struct(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_sink_data(v)))
                .collect(),
        ),
    }
}

fn load_yaml_profile(path: &Path) -> Result<HashMap<String, String>> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .build()
        .with_context(|| format!("failed to load profile {}", path.display()))?;
    let mut props = HashMap::new();
    for (key, value) in settings
        .try_deserialize::<HashMap<String, config::Value>>()
        .with_context(|| format!("profile {} is not a flat key/value map", path.display()))?
    {
        let rendered = value
            .clone()
            .into_string()
            .unwrap_or_else(|_| format!("{:?}", value));
        props.insert(key, rendered);
    }
    Ok(props)
}

/// Parses a Kafka Connect-style worker properties file: `key=value`
/// per line, `#`/`!` comment lines, blank lines ignored.
fn load_properties_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read properties file {}", path.display()))?;
    let mut props = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            props.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(props)
}

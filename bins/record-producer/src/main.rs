//! Streams JSON records from local files into a Kafka topic, for
//! exercising `s3-sink-runner` without a real upstream producer.
//!
//! Supports the same three shapes a hand-written fixture file tends to
//! take: a single JSON object, a JSON array, or newline-delimited JSON
//! (one object per line). Format is auto-detected unless overridden.
//!
//! ```bash
//! record-producer -i fixtures/orders.ndjson -t myTopic -f ndjson
//! record-producer -i fixtures/ -t myTopic -g '*.json' --key-field id
//! ```

#![allow(unused)]

use anyhow::{Context, Result};
use clap::Parser;
use glob::glob;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[clap(name = "record-producer", about = "Stream JSON fixture records into a Kafka topic")]
struct Args {
    /// Path to a JSON file or a directory containing JSON files.
    #[arg(short, long)]
    input: PathBuf,

    /// Kafka brokers (comma-separated).
    #[arg(short, long, default_value = "localhost:9092")]
    brokers: String,

    /// Kafka topic to send records to.
    #[arg(short, long)]
    topic: String,

    /// Delay between messages in milliseconds (0 = no delay).
    #[arg(short, long, default_value_t = 0)]
    delay_ms: u64,

    /// Number of messages to send per batch.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// JSON shape: object (single object), array (JSON array), ndjson
    /// (newline-delimited), auto (detect from the first non-blank line).
    #[arg(short, long, default_value = "auto")]
    format: JsonFormat,

    /// Glob pattern used when `--input` is a directory.
    #[arg(short, long, default_value = "*.json")]
    glob_pattern: String,

    /// Top-level field to use as the Kafka record key, if present.
    #[arg(long)]
    key_field: Option<String>,

    /// Kafka partition to send to explicitly. Left unset, the producer
    /// partitions by key (or round-robins a null key).
    #[arg(long)]
    partition: Option<i32>,

    /// Skip malformed records instead of aborting the whole file.
    #[arg(long)]
    continue_on_error: bool,

    /// Don't actually send anything; just log what would be sent.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = "record-producer")]
    client_id: String,

    #[arg(long, default_value_t = 100)]
    progress_interval: usize,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum JsonFormat {
    Auto,
    Object,
    Array,
    Ndjson,
}

struct ProducerStats {
    total_messages: usize,
    successful_messages: usize,
    failed_messages: usize,
    total_bytes: usize,
}

impl ProducerStats {
    fn new() -> Self {
        Self {
            total_messages: 0,
            successful_messages: 0,
            failed_messages: 0,
            total_bytes: 0,
        }
    }

    fn print_summary(&self) {
        info!("Producer summary:");
        info!("  total messages:    {}", self.total_messages);
        info!("  successful:        {}", self.successful_messages);
        info!("  failed:            {}", self.failed_messages);
        info!("  total bytes sent:  {}", self.total_bytes);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!(?args, "starting record producer");

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &args.brokers)
        .set("client.id", &args.client_id)
        .set("message.timeout.ms", "30000")
        .create()
        .context("failed to create Kafka producer")?;

    let json_files = get_json_files(&args.input, &args.glob_pattern)?;
    if json_files.is_empty() {
        warn!("no JSON files found to process");
        return Ok(());
    }
    info!(count = json_files.len(), "found JSON files to process");

    let mut stats = ProducerStats::new();

    for (file_idx, file_path) in json_files.iter().enumerate() {
        info!(
            "processing file {}/{}: {}",
            file_idx + 1,
            json_files.len(),
            file_path.display()
        );

        match process_json_file(&producer, file_path, &args, &mut stats).await {
            Ok(_) => info!("finished: {}", file_path.display()),
            Err(e) => {
                error!("failed to process {}: {}", file_path.display(), e);
                if !args.continue_on_error {
                    return Err(e);
                }
            }
        }
    }

    if !args.dry_run {
        if let Err(e) = producer.flush(Duration::from_secs(10)) {
            warn!("error flushing producer: {:?}", e);
        }
    }

    stats.print_summary();
    Ok(())
}

fn get_json_files(input: &Path, glob_pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if input.is_file() {
        files.push(input.to_path_buf());
    } else if input.is_dir() {
        let pattern = format!("{}/{}", input.display(), glob_pattern);
        for entry in glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("error reading glob entry: {}", e),
            }
        }
    } else {
        anyhow::bail!("input path does not exist: {}", input.display());
    }

    files.sort();
    files.dedup();
    Ok(files)
}

async fn process_json_file(
    producer: &FutureProducer,
    file_path: &Path,
    args: &Args,
    stats: &mut ProducerStats,
) -> Result<()> {
    let file = File::open(file_path)
        .with_context(|| format!("failed to open file: {}", file_path.display()))?;
    let reader = BufReader::new(file);

    let actual_format = if matches!(args.format, JsonFormat::Auto) {
        detect_json_format(file_path)?
    } else {
        args.format.clone()
    };
    info!(format = ?actual_format, "using JSON format");

    match actual_format {
        JsonFormat::Object => {
            let content = std::fs::read_to_string(file_path)?;
            let value: Value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON from {}", file_path.display()))?;
            send_message(producer, args, &value, stats).await?;
        }
        JsonFormat::Array => {
            let content = std::fs::read_to_string(file_path)?;
            let array: Vec<Value> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON array from {}", file_path.display()))?;

            let mut batch = Vec::new();
            for (idx, value) in array.into_iter().enumerate() {
                batch.push(value);
                if batch.len() >= args.batch_size {
                    send_batch(producer, args, &batch, stats).await?;
                    batch.clear();
                }
                if (idx + 1) % args.progress_interval == 0 {
                    info!("progress: {} records processed", idx + 1);
                }
            }
            if !batch.is_empty() {
                send_batch(producer, args, &batch, stats).await?;
            }
        }
        JsonFormat::Ndjson | JsonFormat::Auto => {
            let mut batch = Vec::new();
            for (line_num, line) in reader.lines().enumerate() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => {
                        batch.push(value);
                        if batch.len() >= args.batch_size {
                            send_batch(producer, args, &batch, stats).await?;
                            batch.clear();
                        }
                        if stats.total_messages % args.progress_interval == 0 && stats.total_messages > 0 {
                            info!("progress: {} records processed", stats.total_messages);
                        }
                    }
                    Err(e) => {
                        warn!("failed to parse JSON at line {}: {}", line_num + 1, e);
                        if !args.continue_on_error {
                            return Err(e.into());
                        }
                        stats.failed_messages += 1;
                    }
                }
            }
            if !batch.is_empty() {
                send_batch(producer, args, &batch, stats).await?;
            }
        }
    }

    Ok(())
}

async fn send_batch(
    producer: &FutureProducer,
    args: &Args,
    messages: &[Value],
    stats: &mut ProducerStats,
) -> Result<()> {
    for message in messages {
        send_message(producer, args, message, stats).await?;
        if args.delay_ms > 0 {
            sleep(Duration::from_millis(args.delay_ms)).await;
        }
    }
    Ok(())
}

async fn send_message(
    producer: &FutureProducer,
    args: &Args,
    message: &Value,
    stats: &mut ProducerStats,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    let payload_bytes = payload.as_bytes();

    let key = args
        .key_field
        .as_ref()
        .and_then(|field| message.get(field))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    stats.total_messages += 1;
    stats.total_bytes += payload_bytes.len();

    if args.dry_run {
        info!(topic = %args.topic, key = %key, "dry run: would send {}", payload);
        stats.successful_messages += 1;
        return Ok(());
    }

    let mut record = FutureRecord::to(&args.topic).payload(payload_bytes).key(&key);
    if let Some(p) = args.partition {
        record = record.partition(p);
    }

    match producer.send(record, Duration::from_secs(0)).await {
        Ok(_) => {
            stats.successful_messages += 1;
            Ok(())
        }
        Err((e, _)) => {
            stats.failed_messages += 1;
            Err(anyhow::anyhow!("failed to send record: {}", e))
        }
    }
}

fn detect_json_format(file_path: &Path) -> Result<JsonFormat> {
    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();

    loop {
        first_line.clear();
        if reader.read_line(&mut first_line)? == 0 {
            return Ok(JsonFormat::Ndjson);
        }
        let trimmed = first_line.trim();
        if !trimmed.is_empty() {
            if trimmed.starts_with('[') {
                return Ok(JsonFormat::Array);
            } else if trimmed.starts_with('{') {
                let content = std::fs::read_to_string(file_path)?;
                return Ok(if serde_json::from_str::<Value>(&content).is_ok() {
                    JsonFormat::Object
                } else {
                    JsonFormat::Ndjson
                });
            }
            break;
        }
    }

    Ok(JsonFormat::Ndjson)
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Error as StoreError, GetOptions, GetResult, ListResult, MultipartId, ObjectMeta, ObjectStore,
    PutOptions, PutResult,
};
use sink_core::commit_policy::CommitPolicy;
use sink_core::config::{ErrorPolicyKind, S3Connection, AuthMode, WriteMode};
use sink_core::kcql::KcqlStatement;
use sink_core::naming::{ObjectNamingStrategy, PartitionerMode};
use sink_core::partition_key::PartitionField;
use sink_core::{Format, Header, Record, SinkData};
use sink_connect::context::NullContext;
use sink_connect::manager::WriterManager;
use sink_connect::task::SinkTask;
use sink_formats::FormatWriter;
use sink_store::S3Client;

fn struct_of(fields: &[(&str, SinkData)]) -> SinkData {
    let mut map = HashMap::new();
    for (k, v) in fields {
        map.insert(k.to_string(), v.clone());
    }
    SinkData::Struct(map)
}

fn record(topic: &str, kafka_partition: i32, offset: i64, value: SinkData) -> Record {
    Record {
        topic: topic.to_string(),
        kafka_partition,
        offset,
        key: None,
        value: Some(value),
        headers: Vec::new(),
        timestamp: None,
    }
}

fn in_memory_client() -> S3Client {
    S3Client::from_store(Arc::new(InMemory::new()), "bucket".to_string())
}

fn statement(prefix: &str, topic: &str, commit_policy: CommitPolicy) -> KcqlStatement {
    KcqlStatement {
        bucket: "bucket".to_string(),
        prefix: prefix.to_string(),
        topic: topic.to_string(),
        partition_by: Vec::new(),
        format: Format::Json,
        partitioner_mode: PartitionerMode::KeysAndValues,
        commit_policy,
    }
}

#[tokio::test]
async fn s1_flush_count_one_commits_each_record_as_its_own_object() {
    let client = in_memory_client();
    let stmt = statement(
        "p",
        "myTopic",
        CommitPolicy {
            max_count: Some(1),
            ..Default::default()
        },
    );
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let records = vec![
        record(
            "myTopic",
            1,
            0,
            struct_of(&[
                ("name", SinkData::String("sam".into())),
                ("title", SinkData::String("mr".into())),
                ("salary", SinkData::Double(100.43)),
            ]),
        ),
        record(
            "myTopic",
            1,
            1,
            struct_of(&[
                ("name", SinkData::String("laura".into())),
                ("title", SinkData::String("ms".into())),
                ("salary", SinkData::Double(429.06)),
            ]),
        ),
        record(
            "myTopic",
            1,
            2,
            struct_of(&[
                ("name", SinkData::String("tom".into())),
                ("title", SinkData::Null),
                ("salary", SinkData::Double(395.44)),
            ]),
        ),
    ];

    let reports = manager.put(&client, &records, 0).await.unwrap();
    assert_eq!(reports.len(), 3);

    let mut keys = client.list_under("p").await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "p/myTopic/1/0.json".to_string(),
            "p/myTopic/1/1.json".to_string(),
            "p/myTopic/1/2.json".to_string(),
        ]
    );
    assert_eq!(manager.last_committed_offset("myTopic", 1), Some(2));
    assert_eq!(manager.open_count(), 0);
}

#[tokio::test]
async fn flush_size_leaves_the_partial_file_open_until_close() {
    let client = in_memory_client();

    // Calibrate the byte budget against the real JSON encoding of the
    // first two records instead of assuming a fixed size: two records
    // should exactly clear the budget, the third should not yet be
    // appended when the test inspects state.
    let first = struct_of(&[("name", SinkData::String("sam".into()))]);
    let second = struct_of(&[("name", SinkData::String("laura".into()))]);
    let mut probe = sink_formats::open(Format::Json);
    probe.write(&first).unwrap();
    probe.write(&second).unwrap();
    let budget = probe.current_size();

    let stmt = statement(
        "p",
        "t",
        CommitPolicy {
            max_bytes: Some(budget),
            ..Default::default()
        },
    );
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let third = struct_of(&[("name", SinkData::String("tom".into()))]);
    let records = vec![
        record("t", 1, 0, first),
        record("t", 1, 1, second),
        record("t", 1, 2, third),
    ];

    let reports = manager.put(&client, &records, 0).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].object_key, "p/t/1/1.json");
    assert_eq!(manager.open_count(), 1, "third record's file stays open");

    let closed = manager.close_all(&client).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].object_key, "p/t/1/2.json");
    assert_eq!(manager.open_count(), 0);
}

#[tokio::test]
async fn stop_without_close_discards_the_open_file() {
    let client = in_memory_client();
    let stmt = statement(
        "p",
        "t",
        CommitPolicy {
            max_count: Some(10),
            ..Default::default()
        },
    );
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());
    let records = vec![record(
        "t",
        0,
        0,
        struct_of(&[("name", SinkData::String("a".into()))]),
    )];
    manager.put(&client, &records, 0).await.unwrap();
    assert_eq!(manager.open_count(), 1);

    manager.discard_all();
    assert_eq!(manager.open_count(), 0);
    assert!(client.list_under("p").await.unwrap().is_empty());
}

#[tokio::test]
async fn s4_partitioned_naming_with_missing_salary_field() {
    let client = in_memory_client();
    let stmt = KcqlStatement {
        bucket: "bucket".to_string(),
        prefix: "streamReactorBackups".to_string(),
        topic: "myTopic".to_string(),
        partition_by: vec![
            PartitionField::ValuePath(vec!["name".to_string()]),
            PartitionField::ValuePath(vec!["title".to_string()]),
            PartitionField::ValuePath(vec!["salary".to_string()]),
        ],
        format: Format::Json,
        partitioner_mode: PartitionerMode::KeysAndValues,
        commit_policy: CommitPolicy {
            max_count: Some(1),
            ..Default::default()
        },
    };
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let value = struct_of(&[
        ("name", SinkData::String("first".into())),
        ("title", SinkData::String("primary".into())),
    ]);
    let reports = manager
        .put(&client, &[record("myTopic", 1, 0, value)], 0)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].object_key,
        "streamReactorBackups/name=first/title=primary/salary=[missing]/myTopic(1_0).json"
    );
}

#[tokio::test]
async fn s5_header_partitioner_values_mode_omits_names() {
    let client = in_memory_client();
    let stmt = KcqlStatement {
        bucket: "bucket".to_string(),
        prefix: "p".to_string(),
        topic: "t".to_string(),
        partition_by: vec![
            PartitionField::HeaderPath("intheader".to_string(), Vec::new()),
            PartitionField::HeaderPath("longheader".to_string(), Vec::new()),
        ],
        format: Format::CsvWithHeaders,
        partitioner_mode: PartitionerMode::Values,
        commit_policy: CommitPolicy {
            max_count: Some(1),
            ..Default::default()
        },
    };
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let mut value = record(
        "t",
        0,
        0,
        struct_of(&[("name", SinkData::String("a".into()))]),
    );
    value.headers = vec![
        Header {
            name: "intheader".to_string(),
            value: SinkData::Int(1),
        },
        Header {
            name: "longheader".to_string(),
            value: SinkData::Long(2),
        },
    ];

    let reports = manager.put(&client, &[value], 0).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].object_key, "p/1/2/t(0_0).csv");
}

#[tokio::test]
async fn schema_change_rolls_into_a_new_file_without_skipping_offsets() {
    let client = in_memory_client();
    let stmt = statement(
        "p",
        "t",
        CommitPolicy {
            max_count: Some(10),
            ..Default::default()
        },
    );
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let records = vec![
        record("t", 1, 0, struct_of(&[("name", SinkData::String("a".into()))])),
        record("t", 1, 1, struct_of(&[("name", SinkData::String("b".into()))])),
        record(
            "t",
            1,
            2,
            struct_of(&[
                ("name", SinkData::String("c".into())),
                ("extra", SinkData::Int(1)),
            ]),
        ),
    ];

    let reports = manager.put(&client, &records, 0).await.unwrap();
    assert_eq!(reports.len(), 1, "the schema change rolls the first two records out");
    assert_eq!(reports[0].object_key, "p/t/1/1.json");
    assert_eq!(manager.open_count(), 1, "the third record opened a fresh file");

    let closed = manager.close_all(&client).await.unwrap();
    assert_eq!(closed[0].object_key, "p/t/1/2.json");
}

#[tokio::test]
async fn s3_parquet_schema_change_rolls_into_a_new_file_across_a_commit_boundary() {
    let client = in_memory_client();
    let stmt = KcqlStatement {
        bucket: "bucket".to_string(),
        prefix: "p".to_string(),
        topic: "t".to_string(),
        partition_by: Vec::new(),
        format: Format::Parquet,
        partitioner_mode: PartitionerMode::KeysAndValues,
        commit_policy: CommitPolicy {
            max_count: Some(10),
            ..Default::default()
        },
    };
    let mut manager = WriterManager::new(stmt, WriteMode::Streamed, std::env::temp_dir());

    let records = vec![
        record("t", 2, 0, struct_of(&[("name", SinkData::String("a".into()))])),
        record("t", 2, 1, struct_of(&[("name", SinkData::String("b".into()))])),
        record(
            "t",
            2,
            2,
            struct_of(&[
                ("name", SinkData::String("c".into())),
                ("age", SinkData::Int(30)),
            ]),
        ),
    ];

    let reports = manager.put(&client, &records, 0).await.unwrap();
    assert_eq!(reports.len(), 1, "the schema change commits the first file early");
    assert_eq!(reports[0].object_key, "p/t/2/1.parquet");
    assert_eq!(manager.open_count(), 1, "the third record opened a fresh parquet file");

    let closed = manager.close_all(&client).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].object_key, "p/t/2/2.parquet");
    assert_eq!(manager.last_committed_offset("t", 2), Some(2));

    let mut keys = client.list_under("p").await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec!["p/t/2/1.parquet".to_string(), "p/t/2/2.parquet".to_string()]
    );
}

/// Wraps an in-memory store and fails the first `fail_count` calls to
/// `put_opts` with a `Generic` error (the class `S3Client` classifies
/// as transient), then delegates to the inner store — used to
/// exercise the RETRY error policy without a live S3 endpoint.
#[derive(Debug)]
struct FlakyStore {
    inner: InMemory,
    remaining_failures: AtomicUsize,
}

impl FlakyStore {
    fn new(fail_count: usize) -> Self {
        Self {
            inner: InMemory::new(),
            remaining_failures: AtomicUsize::new(fail_count),
        }
    }
}

impl std::fmt::Display for FlakyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FlakyStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        bytes: Bytes,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Generic {
                store: "flaky-test-store",
                source: format!("injected failure, {remaining} left").into(),
            });
        }
        self.inner.put_opts(location, bytes, opts).await
    }

    async fn put_multipart(
        &self,
        location: &ObjectPath,
    ) -> object_store::Result<(MultipartId, Box<dyn tokio::io::AsyncWrite + Unpin + Send>)> {
        self.inner.put_multipart(location).await
    }

    async fn abort_multipart(
        &self,
        location: &ObjectPath,
        multipart_id: &MultipartId,
    ) -> object_store::Result<()> {
        self.inner.abort_multipart(location, multipart_id).await
    }

    async fn get_opts(&self, location: &ObjectPath, options: GetOptions) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn head(&self, location: &ObjectPath) -> object_store::Result<ObjectMeta> {
        self.inner.head(location).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&ObjectPath>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

#[tokio::test]
async fn s6_retry_policy_recovers_after_transient_store_failures() {
    let flaky = Arc::new(FlakyStore::new(2));
    let client = Arc::new(S3Client::from_store(flaky, "bucket".to_string()));

    let stmt = statement(
        "p",
        "t",
        CommitPolicy {
            max_count: Some(1),
            ..Default::default()
        },
    );
    let config = sink_core::config::SinkConfig {
        statements: vec![stmt],
        connection: S3Connection {
            access_key: None,
            secret_key: None,
            auth_mode: AuthMode::Default,
            custom_endpoint: None,
            vhost_bucket: false,
        },
        write_mode: WriteMode::Streamed,
        local_tmp_directory: std::env::temp_dir(),
        error_policy: ErrorPolicyKind::Retry,
        error_retry_interval_millis: 1,
    };

    let mut clients = HashMap::new();
    clients.insert("bucket".to_string(), client.clone());
    let mut task = SinkTask::start_with_clients(config, clients, Arc::new(NullContext)).unwrap();

    let records = vec![record(
        "t",
        0,
        0,
        struct_of(&[("name", SinkData::String("a".into()))]),
    )];
    task.put(records, 0).await.unwrap();

    let keys = client.list_under("p").await.unwrap();
    assert_eq!(keys, vec!["p/t/0/0.json".to_string()]);
}

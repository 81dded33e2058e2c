//! Error taxonomy for the sink (§7 of the design).
//!
//! Variants map 1:1 onto the classifications the writer manager and
//! task lifecycle need to distinguish: fatal configuration problems,
//! per-record type errors, missing partition headers, and the two
//! store-failure classes that drive the retry policy. Everything else
//! is wrapped in `Other` the way `rde_core::RdeError` wraps `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// Malformed KCQL, slashes in prefix/partition path, unknown format,
    /// incompatible combination of options. Always fatal at `start`.
    #[error("config error: {0}")]
    Config(String),

    /// A record's runtime shape is incompatible with the selected format
    /// or partitioner (TEXT with non-string, BYTES with non-bytes, a
    /// `_key` partitioner over a non-primitive key, ...). Fatal for the
    /// batch currently being processed.
    #[error("record type error: {0}")]
    RecordType(String),

    /// A header referenced by `PARTITIONBY` was absent on a record that
    /// needed it for partitioning.
    #[error("header not found: {0}")]
    HeaderMissing(String),

    /// Connection refused, 5xx, throttling. Retriable under `RETRY`,
    /// otherwise promoted to `StoreFatal` by the retry policy.
    #[error("transient store error: {0}")]
    StoreTransient(String),

    /// 4xx, permission denied, bucket absent. Never retried.
    #[error("fatal store error: {0}")]
    StoreFatal(String),

    /// The local staging file backing an `OpenFile` disappeared between
    /// writes. Recoverable: the affected writer is discarded, the task
    /// keeps running.
    #[error("stage corruption: {0}")]
    StageCorruption(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SinkError {
    /// Whether this error should be surfaced to the runtime as
    /// retriable (preserving `OpenFile` state) rather than fatal.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SinkError::StoreTransient(_))
    }

    /// Whether this error can be silently recovered from by discarding
    /// the affected `OpenFile` and continuing (§7: only `StageCorruption`).
    pub fn is_recoverable_locally(&self) -> bool {
        matches!(self, SinkError::StageCorruption(_))
    }
}

pub type Result<T> = std::result::Result<T, SinkError>;

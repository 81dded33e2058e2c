//! # sink-core
//!
//! Data model, field extraction, logical-partition derivation, object
//! naming, commit policy, KCQL parsing, and the error taxonomy for the
//! S3 streaming sink. This crate has no I/O: everything here is pure
//! evaluation over in-memory records, mirroring how `rde-core` holds
//! only traits/types and leaves I/O to `rde-io`.

pub mod commit_policy;
pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod kcql;
pub mod model;
pub mod naming;
pub mod partition_key;

pub use commit_policy::{CommitPolicy, CommitState};
pub use error::{SinkError, Result};
pub use format::Format;
pub use kcql::KcqlStatement;
pub use model::{Header, Record, SinkData};
pub use naming::{ObjectNamingStrategy, PartitionerMode};
pub use partition_key::{LogicalPartitionKey, PartitionField};

//! C6 staging store, S3 client wrapper, and the C9 offset seeker.
//! Everything in this crate touches either the filesystem or the
//! remote object store; `sink-core` stays pure.

pub mod client;
pub mod seek;
pub mod staging;

pub use client::S3Client;
pub use seek::last_committed_offset;
pub use staging::Stage;

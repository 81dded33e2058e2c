//! The boundary between this crate and whatever runtime is delivering
//! records (§6 addendum). A real worker implements this against
//! `rdkafka`'s consumer; tests implement it with a recording stub.

/// Callbacks a task issues back into the upstream runtime. Both calls
/// are synchronous by design: `rdkafka::consumer::Consumer::seek` and
/// offset-store commits are themselves non-blocking, fire-and-forget
/// calls against the consumer handle, not requests that need to be
/// awaited.
pub trait SinkContext: Send + Sync {
    /// Rewind the runtime's consumer to resume delivery at `offset` for
    /// `(topic, partition)`. Issued by C9 on `open` when a committed
    /// offset was found, and by C11 on a reopened partition (§9 open
    /// question).
    fn seek(&self, topic: &str, partition: i32, offset: i64);

    /// Report that `offset` is the next offset to deliver for `(topic,
    /// partition)` — called only after a successful upload, per the
    /// C7 offset contract.
    fn report_offset(&self, topic: &str, partition: i32, offset: i64);
}

/// A context that does nothing; useful when running the task without a
/// live runtime (e.g. exercising it against an in-memory store).
pub struct NullContext;

impl SinkContext for NullContext {
    fn seek(&self, _topic: &str, _partition: i32, _offset: i64) {}
    fn report_offset(&self, _topic: &str, _partition: i32, _offset: i64) {}
}

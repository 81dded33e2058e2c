//! Retry/error policy (C10, §4.10, §7). Classifies a `SinkError` into
//! what the task should do about it, given the configured
//! `ErrorPolicyKind`.

use sink_core::config::ErrorPolicyKind;
use sink_core::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Preserve OpenFile state and redeliver; the caller should back
    /// off by `error_retry_interval_millis` before the next attempt.
    Retry,
    /// Abort the task; this error will not resolve itself.
    Fatal,
    /// Already handled locally (stage corruption); nothing further to
    /// do besides having logged it.
    Recovered,
}

pub fn classify(error: &SinkError, policy: ErrorPolicyKind) -> Outcome {
    if error.is_recoverable_locally() {
        return Outcome::Recovered;
    }
    if error.is_retriable() {
        return match policy {
            ErrorPolicyKind::Retry => Outcome::Retry,
            ErrorPolicyKind::Throw | ErrorPolicyKind::Noop => Outcome::Fatal,
        };
    }
    Outcome::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_error_retries_under_retry_policy() {
        let err = SinkError::StoreTransient("connection refused".into());
        assert_eq!(classify(&err, ErrorPolicyKind::Retry), Outcome::Retry);
    }

    #[test]
    fn transient_error_is_fatal_under_throw_policy() {
        let err = SinkError::StoreTransient("connection refused".into());
        assert_eq!(classify(&err, ErrorPolicyKind::Throw), Outcome::Fatal);
    }

    #[test]
    fn stage_corruption_is_always_recovered() {
        let err = SinkError::StageCorruption("stage file gone".into());
        assert_eq!(classify(&err, ErrorPolicyKind::Throw), Outcome::Recovered);
    }

    #[test]
    fn fatal_store_error_is_always_fatal() {
        let err = SinkError::StoreFatal("access denied".into());
        assert_eq!(classify(&err, ErrorPolicyKind::Retry), Outcome::Fatal);
    }
}

//! C4: decides when an open file should be flushed, from count/size/
//! elapsed-time thresholds (§4.4).

use crate::error::SinkError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitPolicy {
    pub max_count: Option<u64>,
    pub max_bytes: Option<u64>,
    pub max_interval_millis: Option<u64>,
}

impl CommitPolicy {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.max_count.is_none() && self.max_bytes.is_none() && self.max_interval_millis.is_none()
        {
            return Err(SinkError::Config(
                "at least one of WITH_FLUSH_COUNT, WITH_FLUSH_SIZE, WITH_FLUSH_INTERVAL must be set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// State an open file must expose for policy evaluation. Kept
    /// deliberately minimal so `sink-connect`'s `OpenFile` can just
    /// implement `Into<CommitState>` rather than depending back on it.
    pub fn should_flush(&self, state: CommitState, now_millis: i64) -> bool {
        if let Some(max_count) = self.max_count {
            if state.record_count >= max_count {
                return true;
            }
        }
        if let Some(max_bytes) = self.max_bytes {
            if state.bytes_written >= max_bytes {
                return true;
            }
        }
        if let Some(max_interval) = self.max_interval_millis {
            let elapsed = now_millis.saturating_sub(state.opened_at_millis);
            if elapsed >= max_interval as i64 {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommitState {
    pub record_count: u64,
    pub bytes_written: u64,
    pub opened_at_millis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_flush_count_one_triggers_every_record() {
        let policy = CommitPolicy {
            max_count: Some(1),
            ..Default::default()
        };
        let state = CommitState {
            record_count: 1,
            bytes_written: 10,
            opened_at_millis: 0,
        };
        assert!(policy.should_flush(state, 0));
    }

    #[test]
    fn s2_flush_size_triggers_once_bytes_exceed_budget() {
        let policy = CommitPolicy {
            max_bytes: Some(80),
            ..Default::default()
        };
        let under = CommitState {
            record_count: 1,
            bytes_written: 44,
            opened_at_millis: 0,
        };
        assert!(!policy.should_flush(under, 0));
        let over = CommitState {
            record_count: 2,
            bytes_written: 90,
            opened_at_millis: 0,
        };
        assert!(policy.should_flush(over, 0));
    }

    #[test]
    fn time_policy_fires_on_elapsed_regardless_of_record_count() {
        let policy = CommitPolicy {
            max_interval_millis: Some(1000),
            ..Default::default()
        };
        let state = CommitState {
            record_count: 0,
            bytes_written: 0,
            opened_at_millis: 0,
        };
        assert!(policy.should_flush(state, 1500));
        assert!(!policy.should_flush(state, 500));
    }

    #[test]
    fn no_thresholds_is_a_config_error() {
        assert!(CommitPolicy::default().validate().is_err());
    }
}

//! C3: maps `(topic, kafkaPartition, offset, partitionKey, format)` to
//! a remote object key, per the configured naming strategy (§3, §4.3).

use crate::partition_key::LogicalPartitionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionerMode {
    Values,
    KeysAndValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectNamingStrategy {
    /// `<prefix>/<topic>/<kafkaPartition>/<offset>.<ext>` — used only
    /// when there is no `PARTITIONBY`.
    Hierarchical,
    /// `<prefix>/[name=]value/.../<topic>(<kafkaPartition>_<offset>).<ext>`
    Partitioned,
}

/// Build the object key for a committed file. `prefix` and the
/// rendered components of `partition_key` must already be free of `/`
/// (rejected at config-parse time, §3/§6); this function does not
/// re-validate that.
pub fn object_name(
    strategy: ObjectNamingStrategy,
    mode: PartitionerMode,
    prefix: &str,
    topic: &str,
    kafka_partition: i32,
    offset: i64,
    partition_key: &LogicalPartitionKey,
    ext: &str,
) -> String {
    match strategy {
        ObjectNamingStrategy::Hierarchical => {
            format!("{}/{}/{}/{}.{}", prefix, topic, kafka_partition, offset, ext)
        }
        ObjectNamingStrategy::Partitioned => {
            let mut segments = Vec::with_capacity(partition_key.0.len());
            for (name, value) in &partition_key.0 {
                match mode {
                    PartitionerMode::Values => segments.push(value.clone()),
                    PartitionerMode::KeysAndValues => segments.push(format!("{}={}", name, value)),
                }
            }
            let dir = segments.join("/");
            if dir.is_empty() {
                format!(
                    "{}/{}({}_{}).{}",
                    prefix, topic, kafka_partition, offset, ext
                )
            } else {
                format!(
                    "{}/{}/{}({}_{}).{}",
                    prefix, dir, topic, kafka_partition, offset, ext
                )
            }
        }
    }
}

/// Build a regex anchored to this naming strategy that extracts the
/// `offset` component of a committed object name, for use by the C9
/// offset seeker. Capture group 1 is the offset.
pub fn offset_regex(
    strategy: ObjectNamingStrategy,
    prefix: &str,
    topic: &str,
    kafka_partition: i32,
) -> regex::Regex {
    let escaped_prefix = regex::escape(prefix);
    let escaped_topic = regex::escape(topic);
    let pattern = match strategy {
        ObjectNamingStrategy::Hierarchical => format!(
            r"^{}/{}/{}/(\d+)\.[A-Za-z_]+$",
            escaped_prefix, escaped_topic, kafka_partition
        ),
        ObjectNamingStrategy::Partitioned => format!(
            r"^{}/.*{}\({}_(\d+)\)\.[A-Za-z_]+$",
            escaped_prefix, escaped_topic, kafka_partition
        ),
    };
    regex::Regex::new(&pattern).expect("naming regex is always well-formed")
}

/// `/` is forbidden anywhere in a rendered partition-key component, and
/// in the configured prefix (§3, §6). `.` is permitted.
pub fn contains_forbidden_slash(s: &str) -> bool {
    s.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_partitioned_naming_with_missing_salary() {
        let key = LogicalPartitionKey(vec![
            ("name".to_string(), "first".to_string()),
            ("title".to_string(), "primary".to_string()),
            ("salary".to_string(), "[missing]".to_string()),
        ]);
        let name = object_name(
            ObjectNamingStrategy::Partitioned,
            PartitionerMode::KeysAndValues,
            "streamReactorBackups",
            "myTopic",
            1,
            0,
            &key,
            "json",
        );
        assert_eq!(
            name,
            "streamReactorBackups/name=first/title=primary/salary=[missing]/myTopic(1_0).json"
        );
    }

    #[test]
    fn hierarchical_naming_has_no_logical_partition() {
        let key = LogicalPartitionKey::empty();
        let name = object_name(
            ObjectNamingStrategy::Hierarchical,
            PartitionerMode::KeysAndValues,
            "bucket-prefix",
            "t",
            1,
            42,
            &key,
            "json",
        );
        assert_eq!(name, "bucket-prefix/t/1/42.json");
    }

    #[test]
    fn s5_header_partitioner_values_mode_omits_names() {
        let key = LogicalPartitionKey(vec![
            ("intheader".to_string(), "1".to_string()),
            ("longheader".to_string(), "2".to_string()),
        ]);
        let name = object_name(
            ObjectNamingStrategy::Partitioned,
            PartitionerMode::Values,
            "p",
            "t",
            0,
            0,
            &key,
            "csv",
        );
        assert_eq!(name, "p/1/2/t(0_0).csv");
    }
}

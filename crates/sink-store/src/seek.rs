//! Offset seeker (C9, §4.9). On open/rebalance, scans the remote store
//! to determine the highest committed offset per `(topic,
//! kafka-partition)` so the upstream runtime can be rewound to resume
//! exactly where the last successful commit left off.

use regex::Regex;
use sink_core::error::Result;
use sink_core::naming::{offset_regex, ObjectNamingStrategy};

use crate::client::S3Client;

/// Highest offset observed for a `(topic, kafka-partition)`, or `None`
/// if nothing has ever been committed for it.
pub async fn last_committed_offset(
    client: &S3Client,
    strategy: ObjectNamingStrategy,
    prefix: &str,
    topic: &str,
    kafka_partition: i32,
) -> Result<Option<i64>> {
    let regex = offset_regex(strategy, prefix, topic, kafka_partition);
    let keys = client.list_under(prefix).await?;
    Ok(max_offset(&regex, &keys))
}

fn max_offset(regex: &Regex, keys: &[String]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| regex.captures(key))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_offset_among_matching_keys() {
        let regex = offset_regex(ObjectNamingStrategy::Hierarchical, "prefix", "orders", 0);
        let keys = vec![
            "prefix/orders/0/3.json".to_string(),
            "prefix/orders/0/9.json".to_string(),
            "prefix/orders/0/5.json".to_string(),
            "prefix/orders/1/99.json".to_string(),
        ];
        assert_eq!(max_offset(&regex, &keys), Some(9));
    }

    #[test]
    fn no_matching_keys_is_none() {
        let regex = offset_regex(ObjectNamingStrategy::Hierarchical, "prefix", "orders", 0);
        assert_eq!(max_offset(&regex, &[]), None);
    }
}

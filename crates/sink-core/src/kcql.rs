//! A small hand-rolled parser for one KCQL statement (§6). The KCQL
//! lexer/grammar proper is treated as an external collaborator by the
//! design (§1, §9); this module is the minimal adapter a runnable
//! binary needs on the other side of that boundary. It understands
//! exactly the grammar in §6 and nothing more.

use crate::commit_policy::CommitPolicy;
use crate::error::SinkError;
use crate::format::Format;
use crate::naming::{contains_forbidden_slash, ObjectNamingStrategy, PartitionerMode};
use crate::partition_key::PartitionField;

#[derive(Debug, Clone)]
pub struct KcqlStatement {
    pub bucket: String,
    pub prefix: String,
    pub topic: String,
    pub partition_by: Vec<PartitionField>,
    pub format: Format,
    pub partitioner_mode: PartitionerMode,
    pub commit_policy: CommitPolicy,
}

impl KcqlStatement {
    pub fn naming_strategy(&self) -> ObjectNamingStrategy {
        if self.partition_by.is_empty() {
            ObjectNamingStrategy::Hierarchical
        } else {
            ObjectNamingStrategy::Partitioned
        }
    }
}

/// Parse one `INSERT INTO ... SELECT * FROM ...` statement. Multiple
/// statements (one per line) are split by the caller.
pub fn parse(statement: &str) -> Result<KcqlStatement, SinkError> {
    let mut tokens = statement.split_whitespace().peekable();

    expect_keyword(&mut tokens, "INSERT")?;
    expect_keyword(&mut tokens, "INTO")?;
    let target = next_token(&mut tokens, "bucket:prefix")?;
    let (bucket, prefix) = target.split_once(':').ok_or_else(|| {
        SinkError::Config(format!("expected <bucket>:<prefix>, got `{target}`"))
    })?;
    if contains_forbidden_slash(prefix) {
        return Err(SinkError::Config(
            "NESTED_PREFIX_UNSUPPORTED: prefix must not contain '/'".to_string(),
        ));
    }

    expect_keyword(&mut tokens, "SELECT")?;
    expect_keyword(&mut tokens, "*")?;
    expect_keyword(&mut tokens, "FROM")?;
    let topic = next_token(&mut tokens, "topic")?.to_string();

    let mut partition_by = Vec::new();
    let mut format = Format::Json;
    let mut partitioner_mode = PartitionerMode::KeysAndValues;
    let mut max_count = None;
    let mut max_bytes = None;
    let mut max_interval_millis = None;

    while let Some(&tok) = tokens.peek() {
        let upper = tok.to_ascii_uppercase();
        if upper == "PARTITIONBY" {
            tokens.next();
            let list = next_token(&mut tokens, "PARTITIONBY selectors")?;
            partition_by = parse_partition_selectors(list)?;
        } else if upper == "STOREAS" {
            tokens.next();
            let raw = next_token(&mut tokens, "STOREAS format")?;
            let stripped = raw.trim_matches('`');
            format = Format::parse(stripped)?;
        } else if let Some(value) = upper.strip_prefix("WITHPARTITIONER=") {
            tokens.next();
            partitioner_mode = match value {
                "VALUES" => PartitionerMode::Values,
                "KEYSANDVALUES" => PartitionerMode::KeysAndValues,
                other => {
                    return Err(SinkError::Config(format!(
                        "unknown WITHPARTITIONER mode: {other}"
                    )))
                }
            };
        } else if let Some(value) = upper.strip_prefix("WITH_FLUSH_COUNT=") {
            tokens.next();
            max_count = Some(parse_positive_int(value, "WITH_FLUSH_COUNT")?);
        } else if let Some(value) = upper.strip_prefix("WITH_FLUSH_SIZE=") {
            tokens.next();
            max_bytes = Some(parse_positive_int(value, "WITH_FLUSH_SIZE")?);
        } else if let Some(value) = upper.strip_prefix("WITH_FLUSH_INTERVAL=") {
            tokens.next();
            let seconds = parse_positive_int(value, "WITH_FLUSH_INTERVAL")?;
            max_interval_millis = Some(seconds * 1000);
        } else {
            return Err(SinkError::Config(format!("unexpected KCQL token: {tok}")));
        }
    }

    if partitioner_mode == PartitionerMode::Values {
        let has_topic_or_partition = partition_by
            .iter()
            .any(|f| matches!(f, PartitionField::Topic | PartitionField::Partition));
        if has_topic_or_partition {
            // allowed only with Values mode; nothing further to check.
            let _ = has_topic_or_partition;
        }
    } else {
        let has_topic_or_partition = partition_by
            .iter()
            .any(|f| matches!(f, PartitionField::Topic | PartitionField::Partition));
        if has_topic_or_partition {
            return Err(SinkError::Config(
                "_topic/_partition selectors require WITHPARTITIONER=Values".to_string(),
            ));
        }
    }

    let commit_policy = CommitPolicy {
        max_count,
        max_bytes,
        max_interval_millis,
    };
    commit_policy.validate()?;

    Ok(KcqlStatement {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        topic,
        partition_by,
        format,
        partitioner_mode,
        commit_policy,
    })
}

fn parse_partition_selectors(list: &str) -> Result<Vec<PartitionField>, SinkError> {
    list.split(',').map(parse_selector).collect()
}

fn parse_selector(raw: &str) -> Result<PartitionField, SinkError> {
    if contains_forbidden_slash(raw) {
        return Err(SinkError::Config(
            "INVALID_PARTITION_PATH: partition path must not contain '/'".to_string(),
        ));
    }
    if raw == "_key" {
        return Ok(PartitionField::WholeKey);
    }
    if let Some(rest) = raw.strip_prefix("_key.") {
        return Ok(PartitionField::KeyPath(split_path(rest)));
    }
    if raw == "_topic" {
        return Ok(PartitionField::Topic);
    }
    if raw == "_partition" {
        return Ok(PartitionField::Partition);
    }
    if let Some(rest) = raw.strip_prefix("_header.") {
        let mut segments = split_path(rest);
        if segments.is_empty() {
            return Err(SinkError::Config("empty _header selector".to_string()));
        }
        let header_name = segments.remove(0);
        return Ok(PartitionField::HeaderPath(header_name, segments));
    }
    Ok(PartitionField::ValuePath(split_path(raw)))
}

fn split_path(raw: &str) -> Vec<String> {
    raw.split('.').map(|s| s.to_string()).collect()
}

fn parse_positive_int(raw: &str, field: &str) -> Result<u64, SinkError> {
    raw.parse::<u64>()
        .map_err(|_| SinkError::Config(format!("{field} must be a positive integer, got `{raw}`")))
}

fn expect_keyword<'a>(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'a>>,
    keyword: &str,
) -> Result<(), SinkError> {
    match tokens.next() {
        Some(tok) if tok.eq_ignore_ascii_case(keyword) => Ok(()),
        Some(tok) => Err(SinkError::Config(format!(
            "expected `{keyword}`, got `{tok}`"
        ))),
        None => Err(SinkError::Config(format!("expected `{keyword}`, got end of statement"))),
    }
}

fn next_token<'a>(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'a>>,
    what: &str,
) -> Result<&'a str, SinkError> {
    tokens
        .next()
        .ok_or_else(|| SinkError::Config(format!("expected {what}, got end of statement")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_statement() {
        let stmt = parse("INSERT INTO mybucket:myprefix SELECT * FROM myTopic").unwrap();
        assert_eq!(stmt.bucket, "mybucket");
        assert_eq!(stmt.prefix, "myprefix");
        assert_eq!(stmt.topic, "myTopic");
        assert!(stmt.partition_by.is_empty());
        assert_eq!(stmt.format, Format::Json);
    }

    #[test]
    fn parses_full_statement() {
        let stmt = parse(
            "INSERT INTO streamReactorBackups:myprefix SELECT * FROM myTopic \
             PARTITIONBY name,title,salary STOREAS `JSON` WITHPARTITIONER=KeysAndValues \
             WITH_FLUSH_COUNT=1",
        )
        .unwrap();
        assert_eq!(stmt.partition_by.len(), 3);
        assert_eq!(stmt.commit_policy.max_count, Some(1));
    }

    #[test]
    fn rejects_slash_in_prefix() {
        assert!(parse("INSERT INTO b:a/b SELECT * FROM t").is_err());
    }

    #[test]
    fn rejects_slash_in_partition_path() {
        assert!(parse("INSERT INTO b:p SELECT * FROM t PARTITIONBY a/b WITH_FLUSH_COUNT=1").is_err());
    }

    #[test]
    fn s5_header_selectors_parse_with_subpath() {
        let stmt = parse(
            "INSERT INTO b:p SELECT * FROM t PARTITIONBY _header.phonePrefix,_header.region \
             STOREAS `CSV` WITH_FLUSH_COUNT=1",
        )
        .unwrap();
        assert_eq!(
            stmt.partition_by,
            vec![
                PartitionField::HeaderPath("phonePrefix".to_string(), vec![]),
                PartitionField::HeaderPath("region".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn topic_partition_selectors_require_values_mode() {
        let err = parse(
            "INSERT INTO b:p SELECT * FROM t PARTITIONBY _topic,_partition WITH_FLUSH_COUNT=1",
        );
        assert!(err.is_err());

        let ok = parse(
            "INSERT INTO b:p SELECT * FROM t PARTITIONBY _topic,_partition \
             WITHPARTITIONER=Values WITH_FLUSH_COUNT=1",
        );
        assert!(ok.is_ok());
    }
}

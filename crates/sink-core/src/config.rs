//! Connection-level configuration surface (§6, §4.12). Turns a bag of
//! native properties (as a Kafka Connect worker would deliver them)
//! into a validated `SinkConfig`. Profile-file merging and the
//! deprecated-alias warning both happen before this point, in the
//! binary that owns the ambient config stack — this module only
//! validates and structures the merged result.

use std::collections::HashMap;

use crate::error::SinkError;
use crate::kcql::{self, KcqlStatement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    BuildLocal,
    Streamed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Credentials,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicyKind {
    Throw,
    Noop,
    Retry,
}

#[derive(Debug, Clone)]
pub struct S3Connection {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub auth_mode: AuthMode,
    pub custom_endpoint: Option<String>,
    pub vhost_bucket: bool,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub statements: Vec<KcqlStatement>,
    pub connection: S3Connection,
    pub write_mode: WriteMode,
    pub local_tmp_directory: std::path::PathBuf,
    pub error_policy: ErrorPolicyKind,
    pub error_retry_interval_millis: u64,
}

const KEY_KCQL: &str = "connect.s3.kcql";
const KEY_ACCESS_KEY: &str = "connect.s3.aws.access.key";
const KEY_SECRET_KEY: &str = "connect.s3.aws.secret.key";
const KEY_AUTH_MODE: &str = "connect.s3.aws.auth.mode";
const KEY_CUSTOM_ENDPOINT: &str = "connect.s3.custom.endpoint";
const KEY_VHOST_BUCKET: &str = "connect.s3.vhost.bucket";
const KEY_WRITE_MODE: &str = "connect.s3.write.mode";
const KEY_LOCAL_TMP_DIR: &str = "connect.s3.local.tmp.directory";
const KEY_ERROR_POLICY: &str = "connect.s3.error.policy";
const KEY_ERROR_RETRY_INTERVAL: &str = "connect.s3.error.retry.interval";

/// `aws.*` mirrors `connect.s3.aws.*` 1:1 with a deprecation warning.
const DEPRECATED_ALIASES: &[(&str, &str)] = &[
    ("aws.access.key", KEY_ACCESS_KEY),
    ("aws.secret.key", KEY_SECRET_KEY),
    ("aws.auth.mode", KEY_AUTH_MODE),
    ("aws.custom.endpoint", KEY_CUSTOM_ENDPOINT),
    ("aws.vhost.bucket", KEY_VHOST_BUCKET),
];

/// Apply deprecated-alias mirroring: any alias present and not already
/// shadowed by its canonical key is copied over, with a `tracing::warn!`.
pub fn apply_deprecated_aliases(props: &mut HashMap<String, String>) {
    for (alias, canonical) in DEPRECATED_ALIASES {
        if let Some(value) = props.get(*alias).cloned() {
            if !props.contains_key(*canonical) {
                tracing::warn!(alias, canonical, "using deprecated config alias");
                props.insert(canonical.to_string(), value);
            }
        }
    }
}

pub fn from_properties(props: &HashMap<String, String>) -> Result<SinkConfig, SinkError> {
    let kcql_raw = props
        .get(KEY_KCQL)
        .ok_or_else(|| SinkError::Config(format!("{KEY_KCQL} is required")))?;

    let statements = kcql_raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(kcql::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if statements.is_empty() {
        return Err(SinkError::Config(format!("{KEY_KCQL} contained no statements")));
    }

    let auth_mode = match props.get(KEY_AUTH_MODE).map(String::as_str) {
        None | Some("Credentials") => AuthMode::Credentials,
        Some("Default") => AuthMode::Default,
        Some(other) => {
            return Err(SinkError::Config(format!("unknown auth mode: {other}")))
        }
    };

    let write_mode = match props.get(KEY_WRITE_MODE).map(String::as_str) {
        None | Some("Streamed") => WriteMode::Streamed,
        Some("BuildLocal") => WriteMode::BuildLocal,
        Some(other) => return Err(SinkError::Config(format!("unknown write mode: {other}"))),
    };

    let error_policy = match props.get(KEY_ERROR_POLICY).map(String::as_str) {
        None | Some("THROW") => ErrorPolicyKind::Throw,
        Some("NOOP") => ErrorPolicyKind::Noop,
        Some("RETRY") => ErrorPolicyKind::Retry,
        Some(other) => return Err(SinkError::Config(format!("unknown error policy: {other}"))),
    };

    let error_retry_interval_millis = props
        .get(KEY_ERROR_RETRY_INTERVAL)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| SinkError::Config(format!("{KEY_ERROR_RETRY_INTERVAL} must be an integer")))
        })
        .transpose()?
        .unwrap_or(60_000);

    let local_tmp_directory = props
        .get(KEY_LOCAL_TMP_DIR)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);

    let vhost_bucket = props
        .get(KEY_VHOST_BUCKET)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    Ok(SinkConfig {
        statements,
        connection: S3Connection {
            access_key: props.get(KEY_ACCESS_KEY).cloned(),
            secret_key: props.get(KEY_SECRET_KEY).cloned(),
            auth_mode,
            custom_endpoint: props.get(KEY_CUSTOM_ENDPOINT).cloned(),
            vhost_bucket,
        },
        write_mode,
        local_tmp_directory,
        error_policy,
        error_retry_interval_millis,
    })
}

impl SinkConfig {
    pub fn statement_for_topic(&self, topic: &str) -> Option<&KcqlStatement> {
        self.statements.iter().find(|s| s.topic == topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_kcql() {
        assert!(from_properties(&HashMap::new()).is_err());
    }

    #[test]
    fn parses_single_statement_with_defaults() {
        let mut props = HashMap::new();
        props.insert(
            KEY_KCQL.to_string(),
            "INSERT INTO b:p SELECT * FROM t WITH_FLUSH_COUNT=1".to_string(),
        );
        let cfg = from_properties(&props).unwrap();
        assert_eq!(cfg.statements.len(), 1);
        assert_eq!(cfg.write_mode, WriteMode::Streamed);
        assert_eq!(cfg.error_policy, ErrorPolicyKind::Throw);
    }

    #[test]
    fn deprecated_alias_is_mirrored() {
        let mut props = HashMap::new();
        props.insert("aws.access.key".to_string(), "AKID".to_string());
        apply_deprecated_aliases(&mut props);
        assert_eq!(props.get(KEY_ACCESS_KEY), Some(&"AKID".to_string()));
    }
}

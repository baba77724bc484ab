//! Configuration loading: YAML parsing, `${VAR}` substitution, and the
//! legacy `queries:` lowering pass.
//!
//! Follows a parse-then-typed-deserialize pattern: substitution runs as
//! one recursive pass over the parsed [`serde_yaml::Value`] tree so every
//! scalar string in the document is eligible, before the typed structs
//! are built.

pub mod legacy;

use crate::errors::{Result, SqlGateError};
use crate::workflow::RawWorkflow;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default, rename = "rate_limits")]
    pub rate_limits: Vec<RateLimitPoolConfig>,
    #[serde(default)]
    pub workflows: Vec<RawWorkflow>,
    /// Legacy top-level `queries:` section, lowered into synthetic
    /// workflows by [`legacy::lower_query_config`] before use.
    #[serde(default)]
    pub queries: Vec<legacy::LegacyQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_sec")]
    pub default_timeout_sec: u64,
    #[serde(default = "default_max_timeout_sec")]
    pub max_timeout_sec: u64,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            default_timeout_sec: default_timeout_sec(),
            max_timeout_sec: default_max_timeout_sec(),
            cache: CacheConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout_sec() -> u64 {
    30
}
fn default_max_timeout_sec() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_ttl_sec")]
    pub default_ttl_sec: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            max_size_mb: default_cache_mb(),
            default_ttl_sec: default_ttl_sec(),
        }
    }
}

fn default_cache_mb() -> u64 {
    64
}
fn default_ttl_sec() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_isolation")]
    pub isolation: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_deadlock_priority")]
    pub deadlock_priority: String,
    #[serde(default)]
    pub implicit_transactions: bool,
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            isolation: default_isolation(),
            lock_timeout_ms: default_lock_timeout_ms(),
            deadlock_priority: default_deadlock_priority(),
            implicit_transactions: false,
            journal_mode: default_journal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_isolation() -> String {
    "READ UNCOMMITTED".to_string()
}
fn default_lock_timeout_ms() -> u64 {
    5000
}
fn default_deadlock_priority() -> String {
    "LOW".to_string()
}
fn default_journal_mode() -> String {
    "WAL".to_string()
}
fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DbKind,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub readonly: bool,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Sqlserver,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file_path: Option<std::path::PathBuf>,
    #[serde(default = "default_log_max_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_log_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_log_max_age_days")]
    pub max_age_days: u32,
    #[serde(default)]
    pub compress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file_path: None,
            max_size_mb: default_log_max_size_mb(),
            max_backups: default_log_max_backups(),
            max_age_days: default_log_max_age_days(),
            compress: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_max_size_mb() -> u64 {
    100
}
fn default_log_max_backups() -> u32 {
    5
}
fn default_log_max_age_days() -> u32 {
    14
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file_path: Option<std::path::PathBuf>,
    #[serde(default = "default_metrics_interval")]
    pub interval_sec: u64,
    #[serde(default = "default_retain_files")]
    pub retain_files: u32,
}

fn default_metrics_interval() -> u64 {
    60
}
fn default_retain_files() -> u32 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitPoolConfig {
    pub name: String,
    pub requests_per_second: f64,
    pub burst: f64,
    #[serde(default)]
    pub key: Option<String>,
}

/// Parse a config document from disk: read, `${VAR}` substitute, typed deserialize.
pub fn load(path: impl AsRef<Path>) -> Result<RawConfig> {
    let text = std::fs::read_to_string(path)?;
    load_str(&text)
}

/// Parse a config document from an in-memory string (used by tests and `--validate`).
pub fn load_str(text: &str) -> Result<RawConfig> {
    let mut doc: serde_yaml::Value = serde_yaml::from_str(text)?;
    substitute_env(&mut doc)?;
    let mut cfg: RawConfig = serde_yaml::from_value(doc)?;
    legacy::lower_query_config(&mut cfg);
    Ok(cfg)
}

/// Recursively walk a parsed YAML tree, replacing every `${VAR}` occurrence
/// in scalar strings with the corresponding environment variable. An
/// unresolved `${VAR}` is a hard error.
pub fn substitute_env(value: &mut serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute_env_str(s)?;
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                substitute_env(item)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_env_str(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match rest.find("${") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                let end = after
                    .find('}')
                    .ok_or_else(|| SqlGateError::ConfigError(format!("unterminated ${{VAR}} in {input:?}")))?;
                let var_name = &after[..end];
                let val = std::env::var(var_name).map_err(|_| {
                    SqlGateError::ConfigError(format!("unresolved environment variable: ${{{var_name}}}"))
                })?;
                out.push_str(&val);
                rest = &after[end + 1..];
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_env_resolves() {
        std::env::set_var("SQLGATE_TEST_VAR", "secret123");
        let got = substitute_env_str("postgres://${SQLGATE_TEST_VAR}@host").unwrap();
        assert_eq!(got, "postgres://secret123@host");
    }

    #[test]
    fn test_substitute_env_unresolved_is_error() {
        std::env::remove_var("SQLGATE_DOES_NOT_EXIST");
        let err = substitute_env_str("${SQLGATE_DOES_NOT_EXIST}").unwrap_err();
        assert!(matches!(err, SqlGateError::ConfigError(_)));
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090
databases:
  - name: main
    type: sqlite
    path: ":memory:"
workflows: []
"#;
        let cfg = load_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.databases.len(), 1);
    }
}

//! DB Manager (C2): a named pool of database drivers with health tracking,
//! parameter translation, and session hardening.
//!
//! The `Driver` trait is an `async_trait` with one method per lifecycle
//! verb (`query`/`exec`/`ping`/`reconnect`), so SQLite and SQL Server
//! backends plug into the same manager and health loop.

pub mod mssql;
pub mod params;
pub mod sqlite;

use crate::config::{DatabaseConfig, DbKind, SessionConfig};
use crate::errors::{Result, SqlGateError};
use crate::value::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub name: String,
    pub kind: DbKind,
    pub readonly: bool,
    pub session: SessionConfig,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn query(&self, sql: &str, params: &[(String, Value)]) -> Result<Vec<IndexMap<String, Value>>>;
    async fn exec(&self, sql: &str, params: &[(String, Value)]) -> Result<u64>;
    async fn ping(&self) -> Result<()>;
    async fn reconnect(&self) -> Result<()>;
    fn config(&self) -> &DriverConfig;
    fn healthy(&self) -> bool;
}

/// Classifies SQL as read-only vs. write via a leading-keyword regex:
/// `^\s*(INSERT|UPDATE|DELETE|ALTER|DROP|CREATE)`.
pub fn is_write_sql(sql: &str) -> bool {
    let trimmed = sql.trim_start().to_uppercase();
    const WRITE_KEYWORDS: [&str; 6] = ["INSERT", "UPDATE", "DELETE", "ALTER", "DROP", "CREATE"];
    WRITE_KEYWORDS.iter().any(|kw| trimmed.starts_with(kw))
}

/// A driver's health flag, readable without touching the driver itself —
/// shared with `http::admin`'s `/_/health` handler.
#[derive(Clone)]
pub struct HealthFlag(Arc<AtomicBool>);

impl HealthFlag {
    pub fn new() -> Self {
        HealthFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::Relaxed);
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DbManager {
    drivers: IndexMap<String, Arc<dyn Driver>>,
    health: IndexMap<String, HealthFlag>,
}

impl DbManager {
    /// Open every configured database and start the shared health checker.
    pub async fn connect(configs: &[DatabaseConfig]) -> Result<Arc<DbManager>> {
        let mut drivers: IndexMap<String, Arc<dyn Driver>> = IndexMap::new();
        let mut health: IndexMap<String, HealthFlag> = IndexMap::new();
        for cfg in configs {
            let driver: Arc<dyn Driver> = match cfg.kind {
                DbKind::Sqlite => Arc::new(sqlite::SqliteDriver::connect(cfg).await?),
                DbKind::Sqlserver => Arc::new(mssql::MssqlDriver::connect(cfg).await?),
            };
            health.insert(cfg.name.clone(), HealthFlag::new());
            drivers.insert(cfg.name.clone(), driver);
        }
        let manager = Arc::new(DbManager { drivers, health });
        DbManager::spawn_health_checker(manager.clone());
        Ok(manager)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| SqlGateError::UnknownDb(name.to_string()))
    }

    pub fn healthy(&self, name: &str) -> Option<bool> {
        self.health.get(name).map(|h| h.get())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(|s| s.as_str())
    }

    pub async fn ping_all(&self) -> IndexMap<String, Result<()>> {
        let mut out = IndexMap::new();
        for (name, driver) in &self.drivers {
            out.insert(name.clone(), driver.ping().await);
        }
        out
    }

    pub async fn reconnect_all(&self) {
        for driver in self.drivers.values() {
            if let Err(e) = driver.reconnect().await {
                warn!(error = %e, "reconnect failed");
            }
        }
    }

    /// Background task, `#[instrument]`-decorated: ping every driver every
    /// 30s with a 5s timeout, flip `healthy` after three consecutive
    /// failures and attempt one reconnect.
    #[instrument(skip(manager))]
    fn spawn_health_checker(manager: Arc<DbManager>) {
        tokio::spawn(async move {
            let mut failures: IndexMap<String, u32> = manager.drivers.keys().map(|n| (n.clone(), 0)).collect();
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                for (name, driver) in &manager.drivers {
                    let ok = tokio::time::timeout(Duration::from_secs(5), driver.ping()).await;
                    let count = failures.entry(name.clone()).or_insert(0);
                    match ok {
                        Ok(Ok(())) => {
                            *count = 0;
                            if let Some(flag) = manager.health.get(name) {
                                flag.set(true);
                            }
                        }
                        _ => {
                            *count += 1;
                            if *count >= 3 {
                                if let Some(flag) = manager.health.get(name) {
                                    flag.set(false);
                                }
                                warn!(database = %name, "health check failed 3 times, attempting reconnect");
                                if let Err(e) = driver.reconnect().await {
                                    warn!(database = %name, error = %e, "reconnect failed");
                                } else {
                                    *count = 0;
                                }
                            }
                        }
                    }
                }
            }
        });
    }
}

/// SQL Server session-hardening prelude, assembled from resolved session
/// config and prepended as a single batch ahead of the user statement.
/// User SQL is never interpolated into this string.
pub fn mssql_session_prelude(session: &SessionConfig) -> String {
    format!(
        "SET TRANSACTION ISOLATION LEVEL {}; SET LOCK_TIMEOUT {}; SET DEADLOCK_PRIORITY {}; SET IMPLICIT_TRANSACTIONS {};",
        session.isolation,
        session.lock_timeout_ms,
        session.deadlock_priority,
        if session.implicit_transactions { "ON" } else { "OFF" }
    )
}

/// SQLite pragma prelude for the given session config and read-only flag.
pub fn sqlite_session_prelude(session: &SessionConfig, readonly: bool) -> Vec<String> {
    let mut out = vec![
        format!("PRAGMA busy_timeout = {};", session.busy_timeout_ms),
        format!("PRAGMA journal_mode = {};", session.journal_mode),
    ];
    if readonly {
        out.push("PRAGMA query_only = ON;".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_write_sql_classifier() {
        assert!(is_write_sql("  insert into t values (1)"));
        assert!(is_write_sql("DELETE FROM t"));
        assert!(!is_write_sql("SELECT 1 AS n"));
        assert!(!is_write_sql("  -- comment\nSELECT 1"));
    }
}

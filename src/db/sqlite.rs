//! SQLite driver via `sqlx` (already an `apitap` dependency; the `sqlite`
//! feature is added alongside Postgres for this crate's production path).

use super::{params, sqlite_session_prelude, Driver, DriverConfig};
use crate::config::DatabaseConfig;
use crate::errors::{Result, SqlGateError};
use crate::value::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct SqliteDriver {
    pool: RwLock<SqlitePool>,
    database_url: String,
    config: DriverConfig,
    healthy: Arc<AtomicBool>,
}

impl SqliteDriver {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<SqliteDriver> {
        let path = cfg
            .path
            .clone()
            .ok_or_else(|| SqlGateError::ConfigError(format!("database {:?}: sqlite requires `path`", cfg.name)))?;
        let url = if path == ":memory:" { path.clone() } else { format!("sqlite://{path}?mode=rwc") };
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;
        Ok(SqliteDriver {
            pool: RwLock::new(pool),
            database_url: url,
            config: DriverConfig {
                name: cfg.name.clone(),
                kind: cfg.kind,
                readonly: cfg.readonly,
                session: cfg.session.clone(),
            },
            healthy: Arc::new(AtomicBool::new(true)),
        })
    }

    async fn apply_prelude(&self, conn: &SqlitePool) -> Result<()> {
        for stmt in sqlite_session_prelude(&self.config.session, self.config.readonly) {
            sqlx::query(&stmt).execute(conn).await?;
        }
        Ok(())
    }

    fn row_to_map(row: &SqliteRow) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for (i, col) in row.columns().iter().enumerate() {
            let value = sqlite_cell_to_value(row, i, col.type_info().name());
            out.insert(col.name().to_string(), value);
        }
        out
    }

    fn bind_args<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        names: &[String],
        params: &'q [(String, Value)],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for name in names {
            let value = params.iter().find(|(n, _)| n == name).map(|(_, v)| v);
            query = match value {
                Some(Value::Int(i)) => query.bind(*i),
                Some(Value::Float(f)) => query.bind(*f),
                Some(Value::Bool(b)) => query.bind(*b),
                Some(Value::String(s)) => query.bind(s.clone()),
                Some(Value::Bytes(b)) => query.bind(b.clone()),
                Some(Value::Null) | None => query.bind(None::<String>),
                Some(other) => query.bind(other.to_string()),
            };
        }
        query
    }
}

fn sqlite_cell_to_value(row: &SqliteRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(i).map(Value::Int).unwrap_or(Value::Null),
        "REAL" => row.try_get::<f64, _>(i).map(Value::Float).unwrap_or(Value::Null),
        "TEXT" | "DATETIME" | "DATE" => row.try_get::<String, _>(i).map(Value::String).unwrap_or(Value::Null),
        "BLOB" => row.try_get::<Vec<u8>, _>(i).map(Value::Bytes).unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(i)
            .map(Value::String)
            .or_else(|_| row.try_get::<i64, _>(i).map(Value::Int))
            .unwrap_or(Value::Null),
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn query(&self, sql: &str, params: &[(String, Value)]) -> Result<Vec<IndexMap<String, Value>>> {
        if self.config.readonly && super::is_write_sql(sql) {
            return Err(SqlGateError::QueryError(format!(
                "database {:?} is read-only, rejecting write statement",
                self.config.name
            )));
        }
        let (rewritten, names) = params::to_positional(sql);
        let pool = self.pool.read().await;
        self.apply_prelude(&pool).await?;
        let q = Self::bind_args(sqlx::query(&rewritten), &names, params);
        let rows = q.fetch_all(&*pool).await.map_err(SqlGateError::from)?;
        Ok(rows.iter().map(Self::row_to_map).collect())
    }

    async fn exec(&self, sql: &str, params: &[(String, Value)]) -> Result<u64> {
        if self.config.readonly && super::is_write_sql(sql) {
            return Err(SqlGateError::QueryError(format!(
                "database {:?} is read-only, rejecting write statement",
                self.config.name
            )));
        }
        let (rewritten, names) = params::to_positional(sql);
        let pool = self.pool.read().await;
        self.apply_prelude(&pool).await?;
        let q = Self::bind_args(sqlx::query(&rewritten), &names, params);
        let result = q.execute(&*pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let pool = self.pool.read().await;
        sqlx::query("SELECT 1").execute(&*pool).await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        let new_pool = SqlitePoolOptions::new().max_connections(8).connect(&self.database_url).await?;
        let mut pool = self.pool.write().await;
        let old = std::mem::replace(&mut *pool, new_pool);
        old.close().await;
        self.healthy.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

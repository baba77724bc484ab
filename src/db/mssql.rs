//! SQL Server driver via `tiberius` + `bb8`. No repo in the retrieved
//! example pack drives SQL Server directly; `tiberius` is imported as a
//! targeted addition (the only maintained async Tokio-native MSSQL
//! driver) — see DESIGN.md.

use super::{mssql_session_prelude, params, Driver, DriverConfig};
use crate::config::DatabaseConfig;
use crate::errors::{Result, SqlGateError};
use crate::value::Value;
use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tiberius::{AuthMethod, Config};
use tokio::sync::RwLock;

pub struct MssqlDriver {
    pool: RwLock<Pool<ConnectionManager>>,
    tiberius_config: Config,
    config: DriverConfig,
    healthy: Arc<AtomicBool>,
}

impl MssqlDriver {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<MssqlDriver> {
        let tiberius_config = build_tiberius_config(cfg)?;
        let manager = ConnectionManager::new(tiberius_config.clone());
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .await
            .map_err(|e| SqlGateError::TiberiusPool(e.to_string()))?;
        Ok(MssqlDriver {
            pool: RwLock::new(pool),
            tiberius_config,
            config: DriverConfig {
                name: cfg.name.clone(),
                kind: cfg.kind,
                readonly: cfg.readonly,
                session: cfg.session.clone(),
            },
            healthy: Arc::new(AtomicBool::new(true)),
        })
    }

    fn prelude_and_sql(&self, sql: &str) -> String {
        format!("{} {}", mssql_session_prelude(&self.config.session), sql)
    }
}

fn build_tiberius_config(cfg: &DatabaseConfig) -> Result<Config> {
    let mut config = Config::new();
    config.host(cfg.host.clone().ok_or_else(|| {
        SqlGateError::ConfigError(format!("database {:?}: sqlserver requires `host`", cfg.name))
    })?);
    config.port(cfg.port.unwrap_or(1433));
    if let Some(db) = &cfg.database {
        config.database(db.clone());
    }
    let user = cfg
        .user
        .clone()
        .ok_or_else(|| SqlGateError::ConfigError(format!("database {:?}: sqlserver requires `user`", cfg.name)))?;
    let password = cfg.password.clone().unwrap_or_default();
    config.authentication(AuthMethod::sql_server(user, password));
    config.trust_cert();
    Ok(config)
}

fn bind_value<'a>(value: Option<&'a Value>) -> tiberius::ColumnData<'a> {
    use tiberius::ColumnData;
    match value {
        None | Some(Value::Null) => ColumnData::Bit(None),
        Some(Value::Bool(b)) => ColumnData::Bit(Some(*b)),
        Some(Value::Int(i)) => ColumnData::I64(Some(*i)),
        Some(Value::Float(f)) => ColumnData::F64(Some(*f)),
        Some(Value::String(s)) => ColumnData::String(Some(std::borrow::Cow::Borrowed(s.as_str()))),
        Some(Value::Bytes(b)) => ColumnData::Binary(Some(std::borrow::Cow::Borrowed(b.as_slice()))),
        Some(other) => ColumnData::String(Some(std::borrow::Cow::Owned(other.to_string()))),
    }
}

fn tiberius_row_to_map(row: &tiberius::Row) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    for (i, col) in row.columns().iter().enumerate() {
        let value = tiberius_cell_to_value(row, i);
        out.insert(col.name().to_string(), value);
    }
    out
}

fn tiberius_cell_to_value(row: &tiberius::Row, i: usize) -> Value {
    if let Ok(Some(v)) = row.try_get::<i64, _>(i) {
        return Value::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(i) {
        return Value::Int(v as i64);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(i) {
        return Value::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(i) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(i) {
        return Value::String(v.to_string());
    }
    Value::Null
}

#[async_trait]
impl Driver for MssqlDriver {
    async fn query(&self, sql: &str, params: &[(String, Value)]) -> Result<Vec<IndexMap<String, Value>>> {
        if self.config.readonly && super::is_write_sql(sql) {
            return Err(SqlGateError::QueryError(format!(
                "database {:?} is read-only, rejecting write statement",
                self.config.name
            )));
        }
        let names = params::native_names(sql);
        let full_sql = self.prelude_and_sql(sql);
        let pool = self.pool.read().await;
        let mut conn = pool.get().await.map_err(|e| SqlGateError::TiberiusPool(e.to_string()))?;
        let bound: Vec<_> = names
            .iter()
            .map(|n| bind_value(params.iter().find(|(pn, _)| pn == n).map(|(_, v)| v)))
            .collect();
        let refs: Vec<&dyn tiberius::ToSql> = bound.iter().map(|c| c as &dyn tiberius::ToSql).collect();
        let stream = conn.query(&full_sql, &refs).await?;
        let rows = stream.into_first_result().await?;
        Ok(rows.iter().map(tiberius_row_to_map).collect())
    }

    async fn exec(&self, sql: &str, params: &[(String, Value)]) -> Result<u64> {
        if self.config.readonly && super::is_write_sql(sql) {
            return Err(SqlGateError::QueryError(format!(
                "database {:?} is read-only, rejecting write statement",
                self.config.name
            )));
        }
        let names = params::native_names(sql);
        let full_sql = self.prelude_and_sql(sql);
        let pool = self.pool.read().await;
        let mut conn = pool.get().await.map_err(|e| SqlGateError::TiberiusPool(e.to_string()))?;
        let bound: Vec<_> = names
            .iter()
            .map(|n| bind_value(params.iter().find(|(pn, _)| pn == n).map(|(_, v)| v)))
            .collect();
        let refs: Vec<&dyn tiberius::ToSql> = bound.iter().map(|c| c as &dyn tiberius::ToSql).collect();
        let result = conn.execute(&full_sql, &refs).await?;
        Ok(result.total())
    }

    async fn ping(&self) -> Result<()> {
        let pool = self.pool.read().await;
        let mut conn = pool.get().await.map_err(|e| SqlGateError::TiberiusPool(e.to_string()))?;
        conn.simple_query("SELECT 1").await?.into_first_result().await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        let manager = ConnectionManager::new(self.tiberius_config.clone());
        let new_pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .await
            .map_err(|e| SqlGateError::TiberiusPool(e.to_string()))?;
        let mut pool = self.pool.write().await;
        *pool = new_pool;
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

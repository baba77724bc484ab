//! Server bootstrap: wires the C1-C8 components into a running process.
//!
//! Construction order is build-then-run: assemble every shared component
//! (DB pool, cache, rate limiter, compiled workflows, executor) before
//! binding a listener or starting the scheduler; shutdown races the HTTP
//! server against `tokio::signal::ctrl_c` in a `tokio::select!`.

use crate::cache::ResponseCache;
use crate::config::RawConfig;
use crate::cron;
use crate::db::DbManager;
use crate::errors::Result;
use crate::http::{self, AppState};
use crate::log::LogHandle;
use crate::ratelimit::{PoolConfig, RateLimiter};
use crate::template;
use crate::workflow::compiler::{self, CompileContext};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Build the `reqwest` client used for `HTTPCall` steps: retry-on-transient
/// middleware wrapped around a plain `reqwest::Client`, via
/// `reqwest-middleware`'s client-then-middleware layering.
fn build_http_client() -> reqwest_middleware::ClientWithMiddleware {
    let retry_policy = reqwest_retry::policies::ExponentialBackoff::builder().build_with_max_retries(3);
    let inner = reqwest::Client::builder().build().expect("valid reqwest client");
    reqwest_middleware::ClientBuilder::new(inner)
        .with(reqwest_retry::RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Assemble every shared component from a parsed config, compile all
/// workflows, and return a ready-to-serve [`AppState`] plus the scheduler
/// that still needs `.start()`.
pub async fn build(config_path: &str, config: RawConfig, log_handle: LogHandle) -> Result<(Arc<AppState>, tokio_cron_scheduler::JobScheduler)> {
    let db = DbManager::connect(&config.databases).await?;

    let db_names: HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: IndexMap<String, bool> = config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();

    let rate_limit_pools: IndexMap<String, PoolConfig> = config
        .rate_limits
        .iter()
        .map(|p| (p.name.clone(), PoolConfig { requests_per_second: p.requests_per_second, burst: p.burst }))
        .collect();
    let rate_limiter = Arc::new(RateLimiter::new(rate_limit_pools.clone().into_iter()));

    let cache = Arc::new(ResponseCache::new(config.server.cache.max_size_mb));

    let env = Arc::new(template::build_environment());

    let compile_ctx = CompileContext {
        db_names: &db_names,
        db_readonly: &db_readonly,
        rate_limit_pools: &rate_limit_pools,
        env: &env,
    };
    let plans = compiler::compile_all(config.workflows.clone(), &compile_ctx)?;
    info!(workflows = plans.len(), "compiled workflow plans");

    let executor = crate::workflow::executor::Executor {
        db: db.clone(),
        cache: cache.clone(),
        rate_limiter: rate_limiter.clone(),
        http_client: build_http_client(),
        env: env.clone(),
        default_timeout_sec: config.server.default_timeout_sec,
        max_timeout_sec: config.server.max_timeout_sec,
    };

    let router = http::router::Router::build(&plans);
    let metrics = http::metrics::Metrics::new();

    let state = Arc::new(AppState {
        executor,
        router,
        db: db.clone(),
        cache,
        rate_limiter,
        log_handle,
        metrics,
        started_at: Instant::now(),
        config_path: config_path.to_string(),
        max_timeout_sec: config.server.max_timeout_sec,
        plans: plans.clone(),
    });

    let cron_executor = Arc::new(crate::workflow::executor::Executor {
        db: state.db.clone(),
        cache: state.cache.clone(),
        rate_limiter: state.rate_limiter.clone(),
        http_client: build_http_client(),
        env,
        default_timeout_sec: config.server.default_timeout_sec,
        max_timeout_sec: config.server.max_timeout_sec,
    });
    let scheduler = cron::build_scheduler(cron_executor, Arc::new(plans)).await?;

    Ok((state, scheduler))
}

/// Bind the HTTP listener, start the cron scheduler, and run until
/// `ctrl_c` via a `tokio::select!`-driven shutdown.
pub async fn run(config_path: &str, config: RawConfig, log_handle: LogHandle) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;

    let (state, mut scheduler) = build(config_path, config, log_handle).await?;

    scheduler.start().await?;
    info!("cron scheduler started");

    let app = http::build_app(state.clone());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "sqlgate listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    scheduler.shutdown().await?;
    state.db.reconnect_all().await;
    info!("sqlgate stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_minimal_config_compiles() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 0
databases:
  - name: main
    type: sqlite
    path: ":memory:"
workflows: []
"#;
        let config = crate::config::load_str(yaml).unwrap();
        let (log_handle, _guard) = crate::log::init_from_config(&config.logging);
        let (state, _scheduler) = build("test.yaml", config, log_handle).await.unwrap();
        assert_eq!(state.plans.len(), 0);
    }
}

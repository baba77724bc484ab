use indexmap::IndexMap;
use sqlgate::config::load_str;
use sqlgate::ratelimit::{PoolConfig, RateLimiter};
use sqlgate::template::build_environment;
use sqlgate::workflow::compiler::{compile_all, CompileContext};
use sqlgate::workflow::executor::{CacheStatus, Executor, TriggerEvent};
use std::collections::HashSet;
use std::sync::Arc;

const CONFIG: &str = r#"
databases:
  - name: main
    type: sqlite
    path: ":memory:"
workflows:
  - name: list_widgets
    triggers:
      - type: http
        method: GET
        path: /widgets
        cache:
          key: "widgets"
          ttl_sec: 60
    steps:
      - type: query
        name: rows
        database: main
        sql: "SELECT 1 AS n"
      - type: response
        name: resp
        body: "{{ steps.rows.data | tojson }}"
        status: 200
"#;

fn event(request_id: &str) -> TriggerEvent {
    TriggerEvent {
        is_cron: false,
        method: "GET".to_string(),
        path: "/widgets".to_string(),
        path_params: IndexMap::new(),
        query_params: IndexMap::new(),
        form_params: IndexMap::new(),
        json_body: None,
        headers: IndexMap::new(),
        client_ip: "127.0.0.1".to_string(),
        request_id: request_id.to_string(),
        static_params: IndexMap::new(),
        nocache: false,
        timeout_override_sec: None,
    }
}

#[tokio::test]
async fn test_second_request_is_trigger_cache_hit() {
    let config = load_str(CONFIG).unwrap();
    let db = sqlgate::db::DbManager::connect(&config.databases).await.unwrap();
    let db_names: HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: IndexMap<String, bool> = config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();
    let rate_limit_pools: IndexMap<String, PoolConfig> = IndexMap::new();
    let env = Arc::new(build_environment());
    let ctx = CompileContext { db_names: &db_names, db_readonly: &db_readonly, rate_limit_pools: &rate_limit_pools, env: &env };
    let plans = compile_all(config.workflows, &ctx).unwrap();

    let executor = Executor {
        db,
        cache: Arc::new(sqlgate::cache::ResponseCache::new(16)),
        rate_limiter: Arc::new(RateLimiter::new(rate_limit_pools.into_iter())),
        http_client: reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
        env,
        default_timeout_sec: 5,
        max_timeout_sec: 30,
    };

    let first = executor.execute(&plans[0], event("req-1")).await;
    assert!(matches!(first.cache_status, CacheStatus::Miss));

    let second = executor.execute(&plans[0], event("req-2")).await;
    assert!(matches!(second.cache_status, CacheStatus::Hit));
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn test_nocache_bypasses_trigger_cache() {
    let config = load_str(CONFIG).unwrap();
    let db = sqlgate::db::DbManager::connect(&config.databases).await.unwrap();
    let db_names: HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: IndexMap<String, bool> = config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();
    let rate_limit_pools: IndexMap<String, PoolConfig> = IndexMap::new();
    let env = Arc::new(build_environment());
    let ctx = CompileContext { db_names: &db_names, db_readonly: &db_readonly, rate_limit_pools: &rate_limit_pools, env: &env };
    let plans = compile_all(config.workflows, &ctx).unwrap();

    let executor = Executor {
        db,
        cache: Arc::new(sqlgate::cache::ResponseCache::new(16)),
        rate_limiter: Arc::new(RateLimiter::new(rate_limit_pools.into_iter())),
        http_client: reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
        env,
        default_timeout_sec: 5,
        max_timeout_sec: 30,
    };

    executor.execute(&plans[0], event("req-1")).await;

    let mut bypassed = event("req-2");
    bypassed.nocache = true;
    let result = executor.execute(&plans[0], bypassed).await;
    assert!(matches!(result.cache_status, CacheStatus::Bypass));
}

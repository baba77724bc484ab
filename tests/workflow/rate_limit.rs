use indexmap::IndexMap;
use sqlgate::config::load_str;
use sqlgate::ratelimit::{PoolConfig, RateLimiter};
use sqlgate::template::build_environment;
use sqlgate::workflow::compiler::{compile_all, CompileContext};
use sqlgate::workflow::executor::{Executor, TriggerEvent};
use std::collections::HashSet;
use std::sync::Arc;

const CONFIG: &str = r#"
databases:
  - name: main
    type: sqlite
    path: ":memory:"
rate_limits:
  - name: tight
    requests_per_second: 0.0001
    burst: 1
workflows:
  - name: limited
    triggers:
      - type: http
        method: GET
        path: /limited
        rate_limit_refs: ["tight"]
    steps:
      - type: response
        name: resp
        body: "ok"
        content_type: text/plain
"#;

fn event(request_id: &str) -> TriggerEvent {
    TriggerEvent {
        is_cron: false,
        method: "GET".to_string(),
        path: "/limited".to_string(),
        path_params: IndexMap::new(),
        query_params: IndexMap::new(),
        form_params: IndexMap::new(),
        json_body: None,
        headers: IndexMap::new(),
        client_ip: "10.0.0.1".to_string(),
        request_id: request_id.to_string(),
        static_params: IndexMap::new(),
        nocache: false,
        timeout_override_sec: None,
    }
}

#[tokio::test]
async fn test_second_request_within_window_is_429() {
    let config = load_str(CONFIG).unwrap();
    let db = sqlgate::db::DbManager::connect(&config.databases).await.unwrap();
    let db_names: HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: IndexMap<String, bool> = config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();
    let rate_limit_pools: IndexMap<String, PoolConfig> = config
        .rate_limits
        .iter()
        .map(|p| (p.name.clone(), PoolConfig { requests_per_second: p.requests_per_second, burst: p.burst }))
        .collect();
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
    assert_eq!(first.status, 200);

    let second = executor.execute(&plans[0], event("req-2")).await;
    assert_eq!(second.status, 429);
    assert!(second.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("Retry-After")));
}

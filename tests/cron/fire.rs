use indexmap::IndexMap;
use sqlgate::config::load_str;
use sqlgate::cron::build_scheduler;
use sqlgate::ratelimit::PoolConfig;
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
workflows:
  - name: nightly_rollup
    triggers:
      - type: cron
        schedule: "*/5 * * * *"
        time_zone: "UTC"
        static_params:
          as_of: "today"
    steps:
      - type: query
        name: rows
        database: main
        sql: "SELECT @as_of AS as_of"
      - type: response
        name: resp
        body: "{{ steps.rows.data[0] | tojson }}"
"#;

async fn build() -> (Executor, Vec<sqlgate::workflow::compiler::CompiledWorkflow>) {
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
        rate_limiter: Arc::new(sqlgate::ratelimit::RateLimiter::new(std::iter::empty())),
        http_client: reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
        env,
        default_timeout_sec: 5,
        max_timeout_sec: 30,
    };
    (executor, plans)
}

#[tokio::test]
async fn test_cron_trigger_registers_without_error() {
    let (executor, plans) = build().await;
    let scheduler = build_scheduler(Arc::new(executor), Arc::new(plans)).await;
    assert!(scheduler.is_ok());
}

#[tokio::test]
async fn test_cron_static_param_reaches_query_as_trigger_param() {
    let (executor, plans) = build().await;

    let mut static_params = IndexMap::new();
    static_params.insert("as_of".to_string(), "2026-07-25".to_string());

    let event = TriggerEvent {
        is_cron: true,
        method: String::new(),
        path: String::new(),
        path_params: IndexMap::new(),
        query_params: IndexMap::new(),
        form_params: IndexMap::new(),
        json_body: None,
        headers: IndexMap::new(),
        client_ip: "cron".to_string(),
        request_id: "cron-test".to_string(),
        static_params,
        nocache: true,
        timeout_override_sec: None,
    };

    let result = executor.execute(&plans[0], event).await;
    assert_eq!(result.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&result.body).unwrap();
    assert_eq!(body["as_of"], "2026-07-25");
}

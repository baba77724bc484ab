use indexmap::IndexMap;
use sqlgate::config::load_str;
use sqlgate::ratelimit::{PoolConfig, RateLimiter};
use sqlgate::template::build_environment;
use sqlgate::workflow::compiler::{compile_all, CompileContext};
use sqlgate::workflow::executor::{Executor, TriggerEvent};
use std::collections::HashSet;
use std::sync::Arc;

const CONFIG: &str = r#"
server:
  host: "127.0.0.1"
  port: 0
databases:
  - name: main
    type: sqlite
    path: ":memory:"
workflows:
  - name: get_widget
    triggers:
      - type: http
        method: GET
        path: /widgets/{id}
        parameters:
          - name: id
            type: int
            required: true
    steps:
      - type: query
        name: row
        database: main
        sql: "SELECT @id AS id, 'widget' AS kind"
        when: "true"
      - type: response
        name: resp
        body: "{{ steps.row.data[0] | tojson }}"
        status: 200
"#;

async fn build_executor() -> (Executor, Vec<sqlgate::workflow::compiler::CompiledWorkflow>) {
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
    (executor, plans)
}

fn http_event(path_params: IndexMap<String, String>) -> TriggerEvent {
    TriggerEvent {
        is_cron: false,
        method: "GET".to_string(),
        path: "/widgets/1".to_string(),
        path_params,
        query_params: IndexMap::new(),
        form_params: IndexMap::new(),
        json_body: None,
        headers: IndexMap::new(),
        client_ip: "127.0.0.1".to_string(),
        request_id: "req-1".to_string(),
        static_params: IndexMap::new(),
        nocache: false,
        timeout_override_sec: None,
    }
}

#[tokio::test]
async fn test_query_step_binds_path_param_and_renders_response() {
    let (executor, plans) = build_executor().await;
    let mut path_params = IndexMap::new();
    path_params.insert("id".to_string(), "42".to_string());

    let result = executor.execute(&plans[0], http_event(path_params)).await;

    assert_eq!(result.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&result.body).unwrap();
    assert_eq!(body["id"], 42);
    assert_eq!(body["kind"], "widget");
}

#[tokio::test]
async fn test_missing_required_param_is_bad_request() {
    let (executor, plans) = build_executor().await;
    let result = executor.execute(&plans[0], http_event(IndexMap::new())).await;
    assert_eq!(result.status, 400);
}

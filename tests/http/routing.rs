use axum::body::Body;
use axum::http::{Request, StatusCode};
use indexmap::IndexMap;
use sqlgate::config::load_str;
use sqlgate::http::{build_app, metrics, router, AppState};
use sqlgate::ratelimit::{PoolConfig, RateLimiter};
use sqlgate::template::build_environment;
use sqlgate::workflow::compiler::{compile_all, CompileContext};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

const CONFIG: &str = r#"
databases:
  - name: main
    type: sqlite
    path: ":memory:"
workflows:
  - name: get_item
    triggers:
      - type: http
        method: GET
        path: /items/{id}
    steps:
      - type: response
        name: resp
        body: "{{ trigger.params.id }}"
        content_type: text/plain
  - name: list_items
    triggers:
      - type: http
        method: GET
        path: /items/recent
    steps:
      - type: response
        name: resp
        body: "recent"
        content_type: text/plain
"#;

async fn build_state() -> Arc<AppState> {
    let config = load_str(CONFIG).unwrap();
    let db = sqlgate::db::DbManager::connect(&config.databases).await.unwrap();
    let db_names: HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: IndexMap<String, bool> = config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();
    let rate_limit_pools: IndexMap<String, PoolConfig> = IndexMap::new();
    let env = Arc::new(build_environment());
    let ctx = CompileContext { db_names: &db_names, db_readonly: &db_readonly, rate_limit_pools: &rate_limit_pools, env: &env };
    let plans = compile_all(config.workflows, &ctx).unwrap();
    let router = router::Router::build(&plans);

    let executor = sqlgate::workflow::executor::Executor {
        db: db.clone(),
        cache: Arc::new(sqlgate::cache::ResponseCache::new(16)),
        rate_limiter: Arc::new(RateLimiter::new(rate_limit_pools.into_iter())),
        http_client: reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
        env,
        default_timeout_sec: 5,
        max_timeout_sec: 30,
    };

    let (log_handle, _guard) = sqlgate::log::init_from_config(&sqlgate::config::load_str(CONFIG).unwrap().logging);

    Arc::new(AppState {
        executor,
        plans,
        router,
        db,
        cache: Arc::new(sqlgate::cache::ResponseCache::new(16)),
        rate_limiter: Arc::new(RateLimiter::new(std::iter::empty())),
        log_handle,
        metrics: metrics::Metrics::new(),
        started_at: Instant::now(),
        config_path: "test.yaml".to_string(),
        max_timeout_sec: 30,
    })
}

#[tokio::test]
async fn test_literal_route_wins_over_param_route() {
    let state = build_state().await;
    let app = build_app(state);

    let response = app
        .oneshot(Request::builder().uri("/items/recent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"recent");
}

#[tokio::test]
async fn test_param_route_binds_path_segment() {
    let state = build_state().await;
    let app = build_app(state);

    let response = app
        .oneshot(Request::builder().uri("/items/42").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"42");
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let state = build_state().await;
    let app = build_app(state);

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint_reports_connected_db() {
    let state = build_state().await;
    let app = build_app(state);

    let response = app
        .oneshot(Request::builder().uri("/_/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

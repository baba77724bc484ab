//! HTTP Trigger (C7): inbound surface. `axum` is the outer transport; a
//! hand-rolled [`router::Router`] owns workflow dispatch (see its module
//! doc for why), and [`admin`] owns the fixed `/_/...` surface.

pub mod admin;
pub mod metrics;
pub mod router;

use crate::cache::ResponseCache;
use crate::db::DbManager;
use crate::log::LogHandle;
use crate::ratelimit::RateLimiter;
use crate::workflow::compiler::CompiledWorkflow;
use crate::workflow::executor::{Executor, TriggerEvent};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use indexmap::IndexMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::instrument;

pub struct AppState {
    pub executor: Executor,
    pub plans: Vec<CompiledWorkflow>,
    pub router: router::Router,
    pub db: Arc<DbManager>,
    pub cache: Arc<ResponseCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub log_handle: LogHandle,
    pub metrics: metrics::Metrics,
    pub started_at: Instant,
    pub config_path: String,
    pub max_timeout_sec: u64,
}

pub fn build_app(state: Arc<AppState>) -> axum::Router {
    let openapi = axum::Router::new()
        .route("/_/openapi.json", get(admin::openapi))
        .layer(CorsLayer::new().allow_origin(Any));

    axum::Router::new()
        .route("/_/health", get(admin::health))
        .route("/_/health/:db", get(admin::health_one))
        .route("/_/metrics", get(admin::metrics_text))
        .route("/_/metrics.json", get(admin::metrics_json))
        .route("/_/config/loglevel", get(admin::get_loglevel).post(admin::set_loglevel))
        .route("/_/cache/clear", axum::routing::post(admin::cache_clear).delete(admin::cache_clear))
        .route("/_/ratelimits", get(admin::ratelimits))
        .route("/", get(admin::root))
        .merge(openapi)
        .fallback(dispatch_workflow)
        .with_state(state)
}

#[instrument(skip(state, headers, body), fields(method = %method, path = %uri.path()))]
async fn dispatch_workflow(State(state): State<Arc<AppState>>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let outcome = state.router.find(method.as_str(), &path);

    let (workflow_index, path_params) = match outcome {
        router::MatchOutcome::Matched { workflow_index, path_params } => (workflow_index, path_params),
        router::MatchOutcome::MethodNotAllowed => {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed for this path")
        }
        router::MatchOutcome::NotFound => return error_response(StatusCode::NOT_FOUND, "no workflow bound to this path"),
    };

    let plan = &state.plans[workflow_index];

    let mut query_params: IndexMap<String, String> = IndexMap::new();
    if let Some(q) = uri.query() {
        for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
            query_params.insert(k.into_owned(), v.into_owned());
        }
    }
    let nocache = matches!(query_params.shift_remove("_nocache").as_deref(), Some("1") | Some("true"));
    let timeout_override_sec = query_params.shift_remove("_timeout").and_then(|v| v.parse::<u64>().ok());

    let content_type = headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("");
    let is_body_method = matches!(method, Method::POST | Method::PUT | Method::PATCH);

    let mut form_params = IndexMap::new();
    let mut json_body = None;
    if is_body_method {
        if content_type.starts_with("application/x-www-form-urlencoded") {
            for (k, v) in url::form_urlencoded::parse(&body) {
                form_params.insert(k.into_owned(), v.into_owned());
            }
        } else if content_type.starts_with("application/json") && !body.is_empty() {
            json_body = serde_json::from_slice::<serde_json::Value>(&body).ok();
        }
    }

    let header_map: IndexMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let request_id = header_map
        .get("x-request-id")
        .or_else(|| header_map.get("x-correlation-id"))
        .cloned()
        .unwrap_or_else(random_request_id);

    let client_ip = header_map
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let event = TriggerEvent {
        is_cron: false,
        method: method.to_string(),
        path,
        path_params,
        query_params,
        form_params,
        json_body,
        headers: header_map,
        client_ip,
        request_id: request_id.clone(),
        static_params: IndexMap::new(),
        nocache,
        timeout_override_sec,
    };

    let result = state.executor.execute(plan, event).await;
    state.metrics.record(&plan.name, result.status, result.duration_ms);

    let mut builder = Response::builder().status(result.status).header("X-Request-ID", &result.request_id);
    builder = builder.header(axum::http::header::CONTENT_TYPE, result.content_type.clone());
    if let Some(remaining) = result.cache_ttl_remaining_sec {
        builder = builder.header("X-Cache-TTL", remaining.to_string());
    }
    builder = builder.header(
        "X-Cache",
        match result.cache_status {
            crate::workflow::executor::CacheStatus::Hit => "HIT",
            crate::workflow::executor::CacheStatus::Miss => "MISS",
            crate::workflow::executor::CacheStatus::Bypass => "BYPASS",
            crate::workflow::executor::CacheStatus::NotConfigured => "NONE",
        },
    );
    for (k, v) in &result.headers {
        builder = builder.header(k, v);
    }
    builder.body(axum::body::Body::from(result.body)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn random_request_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "success": false, "error": message });
    (status, axum::Json(body)).into_response()
}

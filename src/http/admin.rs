//! The fixed `/_/...` admin surface: health, metrics, and a runtime log
//! level endpoint, following an aggregate-then-status-code shape for
//! health and a text-exposition handler for metrics.

use super::AppState;
use crate::workflow::compiler::CompiledTrigger;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut databases = serde_json::Map::new();
    let mut up = 0usize;
    let mut total = 0usize;
    for name in state.db.names() {
        total += 1;
        let healthy = state.db.healthy(name).unwrap_or(false);
        if healthy {
            up += 1;
        }
        databases.insert(name.to_string(), json!(if healthy { "connected" } else { "disconnected" }));
    }

    let status = if total == 0 || up == total {
        "healthy"
    } else if up == 0 {
        "unhealthy"
    } else {
        "degraded"
    };
    let code = if status == "unhealthy" { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };

    (
        code,
        Json(json!({
            "status": status,
            "databases": databases,
            "uptime": state.started_at.elapsed().as_secs(),
        })),
    )
}

/// Always 200: this is a detail lookup, not a liveness gate.
pub async fn health_one(State(state): State<Arc<AppState>>, Path(db): Path<String>) -> impl IntoResponse {
    match state.db.healthy(&db) {
        Some(healthy) => Json(json!({
            "database": db,
            "status": if healthy { "connected" } else { "disconnected" },
        }))
        .into_response(),
        None => (StatusCode::OK, Json(json!({ "database": db, "status": "unknown" }))).into_response(),
    }
}

pub async fn metrics_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode_text(),
    )
}

pub async fn metrics_json(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache_stats = state.cache.stats();
    let pools: Vec<_> = state
        .rate_limiter
        .pool_names()
        .into_iter()
        .map(|name| {
            let buckets = state.rate_limiter.bucket_count_for_pool(&name);
            json!({ "name": name, "active_buckets": buckets })
        })
        .collect();

    Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "cache": {
            "hits": cache_stats.hits,
            "misses": cache_stats.misses,
            "bytes": cache_stats.bytes,
            "entries": cache_stats.entries,
        },
        "rate_limit_pools": pools,
        "workflows": state.plans.len(),
    }))
}

pub async fn openapi(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut paths = serde_json::Map::new();
    for plan in &state.plans {
        for trigger in &plan.triggers {
            if let CompiledTrigger::Http(http) = trigger {
                let params: Vec<_> = http
                    .parameters
                    .iter()
                    .map(|p| {
                        json!({
                            "name": p.name,
                            "in": if http.path_param_names.contains(&p.name) { "path" } else { "query" },
                            "required": p.required,
                        })
                    })
                    .collect();
                let entry = paths.entry(http.path.clone()).or_insert_with(|| json!({}));
                entry[http.method.to_lowercase()] = json!({
                    "operationId": plan.name,
                    "parameters": params,
                    "responses": { "200": { "description": "success" } },
                });
            }
        }
    }

    Json(json!({
        "openapi": "3.0.3",
        "info": { "title": "sqlgate", "version": env!("CARGO_PKG_VERSION") },
        "paths": paths,
    }))
}

pub async fn get_loglevel(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "level": state.log_handle.current() }))
}

#[derive(Debug, Deserialize)]
pub struct SetLogLevel {
    pub level: String,
}

pub async fn set_loglevel(State(state): State<Arc<AppState>>, Json(body): Json<SetLogLevel>) -> impl IntoResponse {
    match state.log_handle.set_level(&body.level) {
        Ok(()) => (StatusCode::OK, Json(json!({ "level": state.log_handle.current() }))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// Cache fingerprints are `"{workflow_name}:{rendered_key}"`, not path-based,
/// so `?endpoint=` is resolved against each workflow's compiled HTTP trigger
/// path and invalidation is scoped by the matching workflow name(s).
pub async fn cache_clear(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("endpoint") {
        Some(endpoint) => {
            let matched: Vec<&str> = state
                .plans
                .iter()
                .filter(|plan| {
                    plan.triggers
                        .iter()
                        .any(|t| matches!(t, CompiledTrigger::Http(h) if &h.path == endpoint))
                })
                .map(|plan| plan.name.as_str())
                .collect();
            for name in &matched {
                state.cache.invalidate_by_prefix(&format!("{name}:"));
            }
        }
        None => state.cache.clear_all(),
    }
    Json(json!({ "success": true }))
}

pub async fn ratelimits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pools: Vec<_> = state
        .rate_limiter
        .pool_names()
        .into_iter()
        .filter_map(|name| {
            state.rate_limiter.pool_config(&name).map(|cfg| {
                json!({
                    "name": name,
                    "requests_per_second": cfg.requests_per_second,
                    "burst": cfg.burst,
                    "active_buckets": state.rate_limiter.bucket_count_for_pool(&name),
                })
            })
        })
        .collect();
    Json(json!({ "pools": pools }))
}

pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": "sqlgate",
        "version": env!("CARGO_PKG_VERSION"),
        "workflows": state.plans.len(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

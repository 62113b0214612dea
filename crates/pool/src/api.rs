//! HTTP surface for the pool manager, mirroring `worker_manager.py`'s
//! `aiohttp` route table one-for-one.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;

use crate::manager::PoolManager;

pub fn router(manager: Arc<PoolManager>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/workers", get(list_workers).post(add_workers).delete(remove_all_workers))
        .route("/api/workers/:id", delete(remove_worker))
        .route("/api/scale", post(scale))
        .with_state(manager)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_config(State(manager): State<Arc<PoolManager>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "hub_url": manager.hub_url(),
        "base_port": manager.base_port(),
    }))
}

#[derive(Deserialize)]
struct SetConfigBody {
    hub_url: Option<String>,
    base_port: Option<u16>,
}

async fn set_config(
    State(manager): State<Arc<PoolManager>>,
    Json(body): Json<SetConfigBody>,
) -> impl IntoResponse {
    let hub_url = body.hub_url.unwrap_or_else(|| manager.hub_url());
    let base_port = body.base_port.unwrap_or_else(|| manager.base_port());
    match manager.set_config(hub_url.clone(), base_port) {
        Ok(()) => Json(serde_json::json!({ "hub_url": hub_url, "base_port": base_port })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_workers(State(manager): State<Arc<PoolManager>>) -> impl IntoResponse {
    Json(manager.get_all_status().await)
}

#[derive(Deserialize, Default)]
struct AddWorkersBody {
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    1
}

async fn add_workers(
    State(manager): State<Arc<PoolManager>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if manager.hub_url().is_empty() {
        return (StatusCode::BAD_REQUEST, "hub_url not configured".to_string()).into_response();
    }
    let count = if body.is_empty() {
        1
    } else {
        match serde_json::from_slice::<AddWorkersBody>(&body) {
            Ok(b) => b.count,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };
    let mut added = Vec::with_capacity(count);
    for _ in 0..count {
        match manager.add_worker() {
            Ok(entry) => added.push(entry),
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }
    (StatusCode::CREATED, Json(added)).into_response()
}

async fn remove_worker(
    State(manager): State<Arc<PoolManager>>,
    AxumPath(id): AxumPath<String>,
) -> impl IntoResponse {
    match manager.remove_worker(&id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "worker not found".to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn remove_all_workers(State(manager): State<Arc<PoolManager>>) -> impl IntoResponse {
    match manager.remove_all() {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct ScaleBody {
    target: usize,
}

async fn scale(
    State(manager): State<Arc<PoolManager>>,
    Json(body): Json<ScaleBody>,
) -> impl IntoResponse {
    if manager.hub_url().is_empty() {
        return (StatusCode::BAD_REQUEST, "hub_url not configured".to_string()).into_response();
    }
    match manager.scale_to(body.target) {
        Ok(result) => Json(result).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

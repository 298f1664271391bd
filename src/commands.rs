use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::node::{
    IngestRequest, NodeError, NodeId, NodeManager, PumpToggleRequest, ThresholdRequest,
};
use crate::serial::LinkMetrics;
use crate::storage::DEFAULT_RECENT_LIMIT;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<NodeManager>,
}

/// Error body `{"status": "error", "message": ...}` with a matching status code
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    NoResponse(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::NoResponse(m) => (StatusCode::GATEWAY_TIMEOUT, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

impl From<NodeError> for ApiError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Validation(m) => ApiError::BadRequest(m),
            other => {
                log::error!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid data format: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Invalid node id: {}", rejection.body_text()))
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
struct Success<T: Serialize> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        status: "success",
        body,
    })
}

fn check_node_id(node_id: NodeId) -> ApiResult<NodeId> {
    if node_id == 0 {
        return Err(ApiError::BadRequest("'node_id' must be a positive integer".into()));
    }
    Ok(node_id)
}

/// Build the router for every relay endpoint
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/node-data/{node_id}", get(get_node_data))
        .route("/all-node-data", get(get_all_node_data))
        .route("/send-data", post(send_data))
        .route("/get-data-from-nodes", post(get_data_from_nodes))
        .route("/periodic-data/{node_id}", get(periodic_data))
        .route("/pump-status/{node_id}", get(get_pump_status))
        .route("/toggle-pump-status", post(toggle_pump_status))
        .route("/tank-threshold", get(get_tank_threshold))
        .route("/set-threshold", post(set_threshold))
        .route("/link-metrics", get(get_link_metrics))
        .with_state(state)
}

/// Liveness probe
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Last readings for one node, newest first
async fn get_node_data(
    State(state): State<AppState>,
    node_id: Result<Path<NodeId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(node_id) = node_id?;
    let node_id = check_node_id(node_id)?;
    let data = state
        .manager
        .recent_readings(node_id, DEFAULT_RECENT_LIMIT)
        .await?;
    if data.is_empty() {
        return Err(ApiError::NotFound(format!("No data found for node_id {}", node_id)));
    }
    Ok(success(json!({ "node_id": node_id, "data": data })))
}

/// Full reading history, newest first
async fn get_all_node_data(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let data = state.manager.all_readings().await?;
    Ok(success(json!({ "data": data })))
}

/// Store a reading submitted by hand, bypassing the radio
async fn send_data(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let reading = request.validate()?;
    let node_id = reading.node_id;
    let stored = state.manager.ingest(reading).await?;
    Ok((
        StatusCode::CREATED,
        success(json!({
            "message": format!("Data saved successfully for node {}", node_id),
            "data": stored,
        })),
    ))
}

/// Live fetch from every configured node
async fn get_data_from_nodes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let reports = state.manager.fetch_all_nodes().await?;
    Ok(success(json!({ "data": reports })))
}

/// Live fetch from one node
async fn periodic_data(
    State(state): State<AppState>,
    node_id: Result<Path<NodeId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(node_id) = node_id?;
    let node_id = check_node_id(node_id)?;
    match state.manager.fetch_node_data(node_id).await? {
        Some(reading) => Ok(success(json!({
            "message": "Data fetched and saved to the database",
            "data": reading,
        }))),
        None => Err(ApiError::NoResponse("No response from node".into())),
    }
}

/// Live pump state of one node
async fn get_pump_status(
    State(state): State<AppState>,
    node_id: Result<Path<NodeId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(node_id) = node_id?;
    let node_id = check_node_id(node_id)?;
    match state.manager.pump_status(node_id).await? {
        Some(is_on) => Ok(success(json!({ "node_id": node_id, "isPumpOn": is_on }))),
        None => Err(ApiError::NoResponse(format!(
            "No response for pump status from Node {}",
            node_id
        ))),
    }
}

/// Switch a pump without waiting for confirmation
async fn toggle_pump_status(
    State(state): State<AppState>,
    payload: Result<Json<PumpToggleRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let (node_id, on) = request.validate()?;
    state.manager.set_pump(node_id, on).await?;
    Ok(success(json!({
        "message": format!("Pump for Node {} turned {}", node_id, if on { "On" } else { "Off" }),
    })))
}

/// Live tank level threshold
async fn get_tank_threshold(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    match state.manager.tank_threshold().await? {
        Some(threshold) => Ok(success(json!({ "threshold": threshold }))),
        None => Err(ApiError::NoResponse("No response from tank node".into())),
    }
}

/// Send a moisture threshold to a node
async fn set_threshold(
    State(state): State<AppState>,
    payload: Result<Json<ThresholdRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let (node_id, threshold) = request.validate()?;
    state.manager.set_threshold(node_id, threshold).await?;
    Ok(success(json!({
        "message": format!("Threshold {} set for Node {}", threshold, node_id),
    })))
}

/// Radio link counters
async fn get_link_metrics(State(state): State<AppState>) -> Json<LinkMetrics> {
    Json(state.manager.correlator().metrics())
}

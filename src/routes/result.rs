use crate::{orchestrator::Snapshot, server::SharedState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub async fn current_result(State(state): State<SharedState>) -> Json<Snapshot> {
    state.metrics.record_request("/result");
    Json(state.orchestrator.snapshot())
}

pub async fn reset(State(state): State<SharedState>) -> Response {
    state.metrics.record_request("/reset");
    match state.orchestrator.reset() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

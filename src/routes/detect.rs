use crate::{
    detection::{DetectionOutcome, DetectionRequest, RequestError},
    orchestrator::{OrchestratorError, SessionId},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    file_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid upload: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error("{0}")]
    Refused(#[from] OrchestratorError),
    #[error("Upload {0} was superseded by a newer upload")]
    Superseded(SessionId),
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = match self {
            DetectError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DetectError::Refused(_) | DetectError::Superseded(_) => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Analyzes the raw request body and answers with the normalized outcome.
/// Failed detections are still `200`: the outcome itself carries the error.
#[instrument(skip(state, headers, body))]
pub async fn detect(
    State(state): State<SharedState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DetectionOutcome>, DetectError> {
    state.metrics.record_request("/detect");

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream");
    let file_name = params.file_name.unwrap_or_else(|| "upload".to_string());
    let request = DetectionRequest::new(body, media_type, file_name)?;

    let started = Instant::now();
    let pending = state.orchestrator.begin_upload(request)?;
    let session = pending.session();

    if !pending.wait().await {
        return Err(DetectError::Superseded(session));
    }

    let snapshot = state.orchestrator.snapshot();
    match snapshot.outcome {
        Some(outcome) if snapshot.session == Some(session) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            state
                .metrics
                .record_detection_duration(elapsed_ms, outcome.succeeded());
            Ok(Json(outcome))
        }
        _ => Err(DetectError::Superseded(session)),
    }
}

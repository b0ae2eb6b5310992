use crate::{
    assets::{self, AssetStatus, CandidateKind},
    server::SharedState,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::instrument;

/// Serves the rendered image of the stored outcome, walking the candidate
/// URLs. Text results stay available through `/result` whatever happens
/// here.
#[instrument(skip(state))]
pub async fn result_image(State(state): State<SharedState>) -> Response {
    state.metrics.record_request("/result/image");

    let Some(outcome) = state.orchestrator.snapshot().outcome else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "no_result", "message": "No detection result yet" })),
        )
            .into_response();
    };

    let status = assets::resolve(
        state.asset_loader.as_ref(),
        &state.resolver,
        outcome.asset_locator(),
    )
    .await;

    match status {
        AssetStatus::Loaded(asset) => {
            state
                .metrics
                .record_asset_attempt(&CandidateKind::Asset.to_string(), "loaded");
            ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response()
        }
        AssetStatus::NoAsset => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "no_image", "message": "No image available" })),
        )
            .into_response(),
        AssetStatus::Exhausted(exhaustion) => {
            let attempts: Vec<_> = exhaustion
                .attempts
                .iter()
                .map(|attempt| {
                    state
                        .metrics
                        .record_asset_attempt(&attempt.kind.to_string(), "failed");
                    json!({
                        "url": attempt.url,
                        "kind": attempt.kind.to_string(),
                        "error": attempt.error.to_string(),
                    })
                })
                .collect();

            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "status": "image_unavailable",
                    "message": "Failed to load image",
                    "locator": exhaustion.locator,
                    "diagnosis": exhaustion.diagnosis().to_string(),
                    "attempts": attempts,
                })),
            )
                .into_response()
        }
    }
}

mod detect;
mod health;
mod image;
mod metrics;
mod result;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/detect", post(detect::detect))
        .route("/result", get(result::current_result))
        .route("/reset", post(result::reset))
        .route("/result/image", get(image::result_image))
}

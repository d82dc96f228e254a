mod health;
mod metrics;
mod model_status;
mod predict;
mod unload;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::healthcheck))
        .route("/model-status", get(model_status::model_status))
        .route("/predict", post(predict::predict))
        .route("/unload-model", get(unload::unload_model))
        .route("/metrics", get(metrics::metrics_handler))
}

fn format_uptime(uptime: Duration) -> String {
    format!("{:.2}s", uptime.as_secs_f64())
}

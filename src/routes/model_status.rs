use crate::{routes::format_uptime, server::SharedState, state::ModelStatus};
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct ModelStatusReport {
    model_loaded: bool,
    model_loading: bool,
    model_ready: bool,
    uptime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[instrument(skip(state))]
pub async fn model_status(State(state): State<SharedState>) -> Json<ModelStatusReport> {
    state.metrics.record_request("/model-status");

    let status = state.model_manager.status();
    Json(ModelStatusReport {
        model_loaded: status == ModelStatus::Ready,
        model_loading: status == ModelStatus::Loading,
        model_ready: status == ModelStatus::Ready,
        uptime: format_uptime(state.model_manager.uptime()),
        error: state.model_manager.failure(),
    })
}

use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct UnloadReport {
    status: &'static str,
    message: &'static str,
}

#[instrument(skip(state))]
pub async fn unload_model(State(state): State<SharedState>) -> Json<UnloadReport> {
    state.metrics.record_request("/unload-model");

    let message = if state.model_manager.unload() {
        "Model unloaded from memory"
    } else {
        "Model was not loaded"
    };

    Json(UnloadReport {
        status: "success",
        message,
    })
}

use crate::{
    classification::Diagnosis, config::Validatable, routes::format_uptime, server::SharedState,
    state::ModelStatus,
};
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct Summary {
    status: &'static str,
    message: &'static str,
    model_status: ModelStatus,
    uptime: String,
    classes: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    message: &'static str,
    model_status: ModelStatus,
    model_file_exists: bool,
    uptime: String,
}

#[instrument(skip(state))]
pub async fn root(State(state): State<SharedState>) -> Json<Summary> {
    state.metrics.record_request("/");

    Json(Summary {
        status: "online",
        message: "Chest X-ray Classification API is running",
        model_status: state.model_manager.status(),
        uptime: format_uptime(state.model_manager.uptime()),
        classes: Diagnosis::labels(),
    })
}

/// Liveness only: always 200, never touches the model.
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<SharedState>) -> Json<Health> {
    state.metrics.record_request("/health");

    Json(Health {
        status: "healthy",
        message: "API is running",
        model_status: state.model_manager.status(),
        model_file_exists: state.model_config.get_path().exists(),
        uptime: format_uptime(state.model_manager.uptime()),
    })
}

use crate::{
    classification::Classification,
    inference_service::InferenceError,
    preprocess::PreprocessError,
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

const UPLOAD_FIELD: &str = "file";
const RETRY_AFTER_SECS: &str = "5";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No file uploaded. Expected a multipart field named `file`")]
    MissingFile,
    #[error("Invalid multipart payload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Multipart(e) => e.status(),
            PredictError::Inference(InferenceError::Preprocess(
                PreprocessError::UnsupportedContentType(_),
            )) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PredictError::Inference(InferenceError::Preprocess(PreprocessError::Decode(_))) => {
                StatusCode::BAD_REQUEST
            }
            PredictError::Inference(InferenceError::NotReady(_)) => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::Inference(InferenceError::Model(_))
            | PredictError::Inference(InferenceError::Task(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorDetail {
    detail: String,
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Prediction error: {}", self);
        } else {
            tracing::warn!("Prediction rejected: {}", self);
        }

        let body = Json(ErrorDetail {
            detail: self.to_string(),
        });
        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Classification>, PredictError> {
    state.metrics.record_request("/predict");

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_owned);
        let image_data = field.bytes().await?;

        let classification = state
            .inference_service
            .predict(content_type.as_deref(), image_data)
            .await?;

        return Ok(Json(classification));
    }

    Err(PredictError::MissingFile)
}

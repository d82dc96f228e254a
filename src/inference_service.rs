use crate::{
    classification::{classify, Classification},
    model_service::{ModelError, ModelService},
    preprocess::{check_content_type, prepare_image, PreprocessError},
    state::{ModelManager, NotReady},
    telemetry::Metrics,
};
use axum::body::Bytes;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    NotReady(#[from] NotReady),
    #[error("Error processing the request: {0}")]
    Model(#[from] ModelError),
    #[error("Error processing the request: prediction task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Clone)]
pub struct InferenceService {
    model_manager: Arc<ModelManager>,
    metrics: Arc<Metrics>,
}

impl InferenceService {
    pub fn new(model_manager: Arc<ModelManager>, metrics: Arc<Metrics>) -> Self {
        Self {
            model_manager,
            metrics,
        }
    }

    /// Content type is checked first, then readiness, then the image is
    /// decoded and classified on a blocking thread.
    pub async fn predict(
        &self,
        content_type: Option<&str>,
        image_data: Bytes,
    ) -> Result<Classification, InferenceError> {
        check_content_type(content_type)?;

        let model = self.model_manager.model()?;

        let started = Instant::now();
        let classification =
            tokio::task::spawn_blocking(move || run_prediction(model.as_ref(), &image_data))
                .await??;
        self.metrics
            .record_prediction_duration(started.elapsed(), "/predict");

        tracing::debug!(
            "Diagnosis {} with {:.1}% confidence",
            classification.diagnosis.as_str(),
            classification.confidence
        );

        Ok(classification)
    }
}

fn run_prediction(
    model: &dyn ModelService,
    image_data: &[u8],
) -> Result<Classification, InferenceError> {
    let prepared = prepare_image(image_data)?;
    tracing::info!(
        "Processing image: {}x{}px",
        prepared.width,
        prepared.height
    );

    let outputs = model.infer(&prepared.tensor)?;
    let classification = classify(&outputs, prepared.width, prepared.height)?;

    Ok(classification)
}

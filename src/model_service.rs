use ndarray::Array4;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}

/// A loaded classifier. Takes a `[1, 128, 128, 1]` batch and returns the raw
/// per-class outputs of the first (and only) batch row.
pub trait ModelService: Send + Sync + 'static {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Builds a [`ModelService`]. Called from a blocking thread, so
/// implementations may do file and native runtime work directly.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self) -> Result<Arc<dyn ModelService>, ModelError>;
}

use crate::{
    config::ModelConfig,
    model_service::{ModelError, ModelLoader, ModelService},
};
use ndarray::Array4;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Clone)]
pub struct MockModelService {
    outputs: Option<Vec<f32>>,
    calls: Arc<AtomicUsize>,
}

impl MockModelService {
    pub fn with_outputs(outputs: Vec<f32>) -> Self {
        Self {
            outputs: Some(outputs),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn confident_normal() -> Self {
        Self::with_outputs(vec![0.05, 0.9, 0.05])
    }

    pub fn broken() -> Self {
        Self {
            outputs: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn infer_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelService for MockModelService {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        assert_eq!(input.shape(), &[1, 128, 128, 1]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .clone()
            .ok_or_else(|| ModelError::InvalidOutput("mock inference failure".to_string()))
    }
}

pub struct MockLoader {
    service: Option<MockModelService>,
    error: String,
    delay: Option<Duration>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn ready(service: MockModelService) -> Self {
        Self {
            service: Some(service),
            error: String::new(),
            delay: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            service: None,
            error: error.to_string(),
            delay: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockLoader {
    fn load(&self) -> Result<Arc<dyn ModelService>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match &self.service {
            Some(service) => Ok(Arc::new(service.clone())),
            None => Err(ModelError::InvalidOutput(self.error.clone())),
        }
    }
}

pub fn missing_model_config() -> ModelConfig {
    ModelConfig {
        onnx_file: "classification_cnn.onnx".to_string(),
        model_dir: PathBuf::from("./no-such-model-dir"),
        num_instances: 1,
        intra_threads: 1,
        load_on_startup: false,
    }
}

use crate::{
    config::{ModelConfig, Validatable},
    model_service::{ModelError, ModelLoader, ModelService},
};
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Pool of ONNX Runtime sessions over the same model file, picked round-robin.
pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let model_path = model_config.get_path();
        if !model_path.exists() {
            return Err(ModelError::FileNotFound(model_path));
        }

        tracing::info!("Loading model from {:?}", model_path);
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(model_config.intra_threads)?
                    .commit_from_file(&model_path)?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
        })
    }
}

impl ModelService for OrtModelService {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        if data.is_empty() {
            return Err(ModelError::InvalidOutput("empty output tensor".to_string()));
        }

        Ok(data.to_vec())
    }
}

#[derive(Clone)]
pub struct OrtModelLoader {
    model_config: ModelConfig,
}

impl OrtModelLoader {
    pub fn new(model_config: ModelConfig) -> Self {
        Self { model_config }
    }
}

impl ModelLoader for OrtModelLoader {
    fn load(&self) -> Result<Arc<dyn ModelService>, ModelError> {
        let service = OrtModelService::new(&self.model_config)?;
        Ok(Arc::new(service))
    }
}

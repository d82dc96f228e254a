//! Classifier lifecycle.
//!
//! The model moves `Unloaded -> Loading -> Ready | Failed`, and back to
//! `Unloaded` on an explicit unload. State lives in a watch channel: every
//! transition goes through the sender's write lock, and readers take
//! snapshots. Only the loader task leaves `Loading`.

use crate::{
    model_service::{ModelError, ModelLoader, ModelService},
    preprocess::empty_input,
    telemetry::Metrics,
};
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Clone)]
enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn ModelService>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    #[serde(rename = "loaded")]
    Ready,
    Failed,
}

fn status_of(state: &ModelState) -> ModelStatus {
    match state {
        ModelState::Unloaded => ModelStatus::Unloaded,
        ModelState::Loading => ModelStatus::Loading,
        ModelState::Ready(_) => ModelStatus::Ready,
        ModelState::Failed(_) => ModelStatus::Failed,
    }
}

/// Retryable: the caller should poll again later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    #[error("Model loading has started, please try again in a few seconds")]
    LoadStarted,
    #[error("Model is still loading, please try again in a few seconds")]
    Loading,
    #[error("Model failed to load, please check logs: {0}")]
    Failed(String),
}

pub struct ModelManager {
    loader: Arc<dyn ModelLoader>,
    state: Arc<watch::Sender<ModelState>>,
    metrics: Arc<Metrics>,
    started_at: Instant,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn ModelLoader>, metrics: Arc<Metrics>) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        Self {
            loader,
            state: Arc::new(state),
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn status(&self) -> ModelStatus {
        status_of(&self.state.borrow())
    }

    pub fn failure(&self) -> Option<String> {
        match &*self.state.borrow() {
            ModelState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Starts a background load if the model is unloaded. Returns `true` only
    /// for the call that performed the transition.
    pub fn ensure_loading(&self) -> bool {
        let started = self.state.send_if_modified(|state| match state {
            ModelState::Unloaded => {
                *state = ModelState::Loading;
                true
            }
            _ => false,
        });

        if started {
            self.spawn_loader();
        }

        started
    }

    /// Returns the ready classifier, or why it cannot serve yet. An unloaded
    /// model starts loading as a side effect.
    pub fn model(&self) -> Result<Arc<dyn ModelService>, NotReady> {
        let snapshot = self.state.borrow().clone();
        match snapshot {
            ModelState::Ready(model) => Ok(model),
            ModelState::Loading => Err(NotReady::Loading),
            ModelState::Failed(message) => Err(NotReady::Failed(message)),
            ModelState::Unloaded => {
                if self.ensure_loading() {
                    Err(NotReady::LoadStarted)
                } else {
                    Err(NotReady::Loading)
                }
            }
        }
    }

    /// Drops the classifier. A failed load is also cleared so the next request
    /// retries it. Returns `true` if a ready model was released.
    pub fn unload(&self) -> bool {
        let mut released = None;
        self.state.send_if_modified(|state| match state {
            ModelState::Ready(_) | ModelState::Failed(_) => {
                released = Some(std::mem::replace(state, ModelState::Unloaded));
                true
            }
            _ => false,
        });

        match released {
            Some(ModelState::Ready(model)) => {
                drop(model);
                self.metrics.set_model_ready(false);
                tracing::info!("Model unloaded from memory");
                true
            }
            Some(_) => {
                tracing::info!("Cleared failed model load");
                false
            }
            None => false,
        }
    }

    /// Resolves once no load is in flight.
    pub async fn wait_until_settled(&self) -> ModelStatus {
        let mut receiver = self.state.subscribe();
        let status = match receiver
            .wait_for(|state| !matches!(state, ModelState::Loading))
            .await
        {
            Ok(state) => status_of(&state),
            Err(_) => self.status(),
        };
        status
    }

    fn spawn_loader(&self) {
        let loader = self.loader.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let uptime = self.uptime();

        tokio::spawn(async move {
            tracing::info!(
                "Starting model loading in background at {:.2}s after startup",
                uptime.as_secs_f64()
            );
            let started = Instant::now();

            let outcome =
                tokio::task::spawn_blocking(move || load_and_warm_up(loader.as_ref())).await;

            let next = match outcome {
                Ok(Ok(model)) => {
                    let elapsed = started.elapsed();
                    metrics.record_model_load_duration(elapsed);
                    metrics.set_model_ready(true);
                    tracing::info!(
                        "Model loaded and warmed up in {:.2}s, ready for predictions",
                        elapsed.as_secs_f64()
                    );
                    ModelState::Ready(model)
                }
                Ok(Err(e)) => {
                    tracing::error!("Error loading model in background: {}", e);
                    ModelState::Failed(e.to_string())
                }
                Err(e) => {
                    tracing::error!("Model loading task did not complete: {}", e);
                    ModelState::Failed(format!("loading task did not complete: {}", e))
                }
            };

            state.send_replace(next);
        });
    }
}

fn load_and_warm_up(loader: &dyn ModelLoader) -> Result<Arc<dyn ModelService>, ModelError> {
    let model = loader.load()?;

    tracing::info!("Running warmup prediction");
    model.infer(&empty_input())?;

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockLoader, MockModelService};
    use std::time::Duration;

    fn manager(loader: &Arc<MockLoader>) -> ModelManager {
        ModelManager::new(loader.clone(), Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_first_request_starts_loading() {
        let loader = Arc::new(
            MockLoader::ready(MockModelService::confident_normal())
                .with_delay(Duration::from_millis(200)),
        );
        let manager = manager(&loader);

        assert_eq!(manager.status(), ModelStatus::Unloaded);
        assert_eq!(manager.model().err(), Some(NotReady::LoadStarted));
        assert_eq!(manager.status(), ModelStatus::Loading);
        assert_eq!(manager.model().err(), Some(NotReady::Loading));

        assert_eq!(manager.wait_until_settled().await, ModelStatus::Ready);
        assert!(manager.model().is_ok());
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_load_once() {
        let loader = Arc::new(
            MockLoader::ready(MockModelService::confident_normal())
                .with_delay(Duration::from_millis(100)),
        );
        let manager = Arc::new(manager(&loader));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.ensure_loading() })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(manager.wait_until_settled().await, ModelStatus::Ready);
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_warmup_runs_before_ready() {
        let service = MockModelService::confident_normal();
        let loader = Arc::new(MockLoader::ready(service.clone()));
        let manager = manager(&loader);

        manager.ensure_loading();
        manager.wait_until_settled().await;

        assert_eq!(service.infer_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_until_unloaded() {
        let loader = Arc::new(MockLoader::failing("model file is corrupt"));
        let manager = manager(&loader);

        manager.ensure_loading();
        assert_eq!(manager.wait_until_settled().await, ModelStatus::Failed);
        assert!(manager.failure().unwrap().contains("corrupt"));
        assert!(matches!(manager.model(), Err(NotReady::Failed(_))));
        assert!(!manager.ensure_loading());

        assert!(!manager.unload());
        assert_eq!(manager.status(), ModelStatus::Unloaded);
        assert_eq!(manager.model().err(), Some(NotReady::LoadStarted));
        manager.wait_until_settled().await;
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_warmup_marks_failed() {
        let loader = Arc::new(MockLoader::ready(MockModelService::broken()));
        let manager = manager(&loader);

        manager.ensure_loading();
        assert_eq!(manager.wait_until_settled().await, ModelStatus::Failed);
    }

    #[tokio::test]
    async fn test_unload_then_predict_reloads() {
        let loader = Arc::new(MockLoader::ready(MockModelService::confident_normal()));
        let manager = manager(&loader);

        assert!(!manager.unload());

        manager.ensure_loading();
        manager.wait_until_settled().await;
        let in_flight = manager.model().unwrap();

        assert!(manager.unload());
        assert_eq!(manager.status(), ModelStatus::Unloaded);
        // A handle taken before the unload keeps working.
        assert!(in_flight.infer(&empty_input()).is_ok());

        assert_eq!(manager.model().err(), Some(NotReady::LoadStarted));
        assert_eq!(manager.wait_until_settled().await, ModelStatus::Ready);
        assert_eq!(loader.load_count(), 2);
    }
}

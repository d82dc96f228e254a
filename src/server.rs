use crate::{
    config::{Config, ModelConfig},
    inference_service::InferenceService,
    routes::api_routes,
    state::ModelManager,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct SharedState {
    pub inference_service: InferenceService,
    pub model_manager: Arc<ModelManager>,
    pub model_config: ModelConfig,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn new(
        model_manager: Arc<ModelManager>,
        model_config: ModelConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inference_service: InferenceService::new(model_manager.clone(), metrics.clone()),
            model_manager,
            model_config,
            metrics,
        }
    }
}

pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let router = build_router(state, config.server.max_upload_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}

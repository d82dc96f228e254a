use crate::{
    config::{Config, Validatable},
    ort_service::OrtModelLoader,
    server::{HttpServer, SharedState},
    state::ModelManager,
    telemetry::Metrics,
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            tracing::error!("Failed to initialize metrics: {:?}", e);
            return Err(e.into());
        }
    };

    // Not fatal: /health reports it and a load attempt ends in `Failed`.
    if let Err(e) = config.model.validate() {
        tracing::warn!("Configuration validation failed: {}", e);
    }

    let loader = Arc::new(OrtModelLoader::new(config.model.clone()));
    let model_manager = Arc::new(ModelManager::new(loader, metrics.clone()));

    if config.model.load_on_startup {
        tracing::info!("Application startup: initializing model loading");
        model_manager.ensure_loading();
    } else {
        tracing::info!("Model will be loaded on the first prediction request");
    }

    let state = SharedState::new(model_manager, config.model.clone(), metrics);
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use crate::assets::{self, AssetResolver, HttpAssetLoader};
use crate::config::Config;
use crate::detection::{DetectionClient, DetectionRequest};
use crate::orchestrator::UploadOrchestrator;
use crate::report::DetectionReport;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;

use anyhow::{anyhow, Context};
use std::{path::Path, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let client = match DetectionClient::new(&config.detection_service) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize detection client: {:?}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Detection endpoint: {}", client.endpoint());

    let orchestrator = Arc::new(UploadOrchestrator::new(
        Arc::new(client),
        config.uploads.overlap,
    ));
    let state = SharedState {
        orchestrator,
        asset_loader: Arc::new(HttpAssetLoader::new(config.assets.get_timeout())),
        resolver: AssetResolver::new(&config.assets),
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

/// Analyzes one image file and resolves its rendered asset.
pub async fn run_once(config: &Config, image: &Path) -> anyhow::Result<DetectionReport> {
    let request = DetectionRequest::from_path(image)?;
    let client = DetectionClient::new(&config.detection_service)?;
    let orchestrator = UploadOrchestrator::new(Arc::new(client), config.uploads.overlap);

    let pending = orchestrator.begin_upload(request)?;
    pending.wait().await;

    let outcome = orchestrator
        .snapshot()
        .outcome
        .ok_or_else(|| anyhow!("upload finished without a stored result"))?;

    let loader = HttpAssetLoader::new(config.assets.get_timeout());
    let resolver = AssetResolver::new(&config.assets);
    let asset = assets::resolve(&loader, &resolver, outcome.asset_locator()).await;

    Ok(DetectionReport { outcome, asset })
}

pub fn save_asset(report: &DetectionReport, path: &Path) -> anyhow::Result<bool> {
    match &report.asset {
        assets::AssetStatus::Loaded(asset) => {
            std::fs::write(path, &asset.bytes)
                .with_context(|| format!("failed to write image to {}", path.display()))?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {:?}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {:?}", e);
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

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use engine_host::{
    ConfigStore, CrashRecoveryCoordinator, EngineLifecycleController, EventBus, PluginSession,
    ProcessTransport, StreamHealthMonitor, spawn_notification_router,
};

#[derive(Parser, Debug)]
#[command(name = "engine-hostd")]
struct Args {
    /// Path to the audio engine binary to supervise
    #[arg(long)]
    engine: PathBuf,

    /// Audio configuration file (TOML); defaults to engine-host.toml next to
    /// the executable
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,engine_host=info,engine=info")),
        )
        .init();

    let config_path = match args.config {
        Some(path) => path,
        None => std::env::current_exe()?
            .parent()
            .map(|dir| dir.join("engine-host.toml"))
            .ok_or_else(|| anyhow::anyhow!("cannot determine default config path"))?,
    };
    tracing::info!(
        engine = %args.engine.display(),
        config = %config_path.display(),
        "starting engine-hostd"
    );

    let transport = Arc::new(ProcessTransport::new(args.engine));
    let controller = EngineLifecycleController::new(
        transport.clone(),
        ConfigStore::new(config_path),
        EventBus::new(),
        PluginSession::new(),
    );
    let health = StreamHealthMonitor::new(controller.clone());
    let recovery = CrashRecoveryCoordinator::new(controller.clone());

    let token = CancellationToken::new();
    let router = spawn_notification_router(
        transport.clone(),
        controller.clone(),
        health,
        recovery,
        token.clone(),
    );

    // Prefer adopting an engine that is already running over a cold start.
    match controller.adopt_if_running().await {
        Ok(Some(negotiated)) => {
            tracing::info!(
                sample_rate = negotiated.sample_rate,
                buffer_size = negotiated.buffer_size,
                "adopted running engine"
            );
        }
        Ok(None) => match controller.persisted_config() {
            Some(cfg) if cfg.is_startable() => {
                if let Err(e) = controller.start(cfg).await {
                    tracing::error!(error = %e, "initial engine start failed");
                }
            }
            _ => tracing::info!("no startable configuration; waiting"),
        },
        Err(e) => tracing::error!(error = %e, "could not query engine state"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    token.cancel();
    if let Err(e) = controller.stop().await {
        tracing::warn!(error = %e, "engine stop failed during shutdown");
    }
    router.await?;

    Ok(())
}

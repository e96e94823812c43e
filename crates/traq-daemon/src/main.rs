use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traq_core::config::DaemonConfig;
use traq_core::platform::default_platform;
use traq_core::{Daemon, Storage};

mod config_loader;
mod ipc;

use ipc::IpcServer;

const SOCKET_NAME: &str = "traq.sock";
const DB_NAME: &str = "traq.db";
const CONFIG_NAME: &str = "traq.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "traq_daemon=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting traq daemon");

    let platform = default_platform();
    let data_dir = platform.data_dir();
    let config_dir = platform.config_dir();
    std::fs::create_dir_all(&data_dir).context("creating data directory")?;
    std::fs::create_dir_all(&config_dir).context("creating config directory")?;

    let config = config_loader::load(&config_dir.join(CONFIG_NAME))
        .unwrap_or_else(|e| {
            warn!("failed to load {CONFIG_NAME}, using defaults: {e}");
            DaemonConfig::default()
        });

    let storage = Arc::new(Storage::open(&data_dir.join(DB_NAME)).context("opening storage")?);
    let daemon = Arc::new(Daemon::new(platform, storage, data_dir.clone(), config)?);
    daemon.start().context("daemon start sequence")?;
    info!("daemon started, data dir: {}", data_dir.display());

    let shutdown = CancellationToken::new();

    let socket_path = data_dir.join(SOCKET_NAME);
    let ipc_server = IpcServer::new(socket_path, Arc::clone(&daemon), shutdown.clone());
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.start().await {
            error!("ipc server failed: {e}");
        }
    });

    let tick_daemon = Arc::clone(&daemon);
    let tick_shutdown = shutdown.clone();
    let tick_interval = tick_daemon.config_snapshot().interval;
    let tick_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                _ = tick_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // A panic inside tick() is caught so the task never dies
                    // (§4.1 "Failure handling").
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| tick_daemon.tick()));
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("tick failed: {e}"),
                        Err(_) => error!("tick panicked and was recovered"),
                    }
                }
            }
        }
    });

    let flush_daemon = Arc::clone(&daemon);
    let flush_shutdown = shutdown.clone();
    let flush_interval = flush_daemon.config_snapshot().file_flush_interval;
    let flush_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(flush_interval);
        loop {
            tokio::select! {
                _ = flush_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = flush_daemon.flush_file_events() {
                        warn!("file event flush failed: {e}");
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    shutdown.cancel();
    let _ = tokio::join!(ipc_handle, tick_handle, flush_handle);
    daemon.stop().context("daemon stop sequence")?;
    Ok(())
}

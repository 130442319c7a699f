//! `notifyhub-worker`: the notification pipeline's consumer process.
//!
//! CLI surface (spec §6): no arguments. Exits 0 if another instance holds
//! the singleton lock, 1 on fatal startup error. Shuts down cleanly on
//! SIGINT/SIGTERM, mirroring the teacher's `ProjectionWorker`/`JobExecutor`
//! shutdown-channel pattern, extended here to a process-wide signal listener.

use notifyhub_worker::{start, WorkerConfig};

#[tokio::main]
async fn main() {
    notifyhub_observability::init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let worker = match start(&config).await {
        Ok(Some(worker)) => worker,
        Ok(None) => {
            tracing::info!("singleton lock held by another instance, exiting");
            std::process::exit(0);
        }
        Err(err) => {
            tracing::error!(%err, "failed to start notification worker");
            std::process::exit(1);
        }
    };

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping drain loops");
    worker.shutdown();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

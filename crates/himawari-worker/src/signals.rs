//! Termination signal handling.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, only Ctrl+C will stop the worker");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

/// Cancel `cancel` on the first termination signal.
///
/// A second Ctrl+C after that aborts the process with status 1 without
/// waiting for in-flight tasks.
pub fn spawn_signal_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, draining in-flight tasks");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received second Ctrl+C, aborting immediately");
            std::process::exit(1);
        }
    })
}

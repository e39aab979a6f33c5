use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Graceful shutdown (stop live feeds, drain connections)
    Graceful,
}

/// Create the shutdown channel shared by the server and every live feed
pub fn shutdown_channel() -> broadcast::Sender<ShutdownSignal> {
    let (shutdown_tx, _) = broadcast::channel(16);
    shutdown_tx
}

/// Setup signal handlers for the server
///
/// SIGTERM and SIGINT broadcast a graceful shutdown on `shutdown_tx`.
#[cfg(unix)]
pub fn setup_signal_handlers(
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown");
            }
        }

        let _ = shutdown_tx.send(ShutdownSignal::Graceful);
    })
}

/// Non-unix platforms only support Ctrl+C
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = shutdown_tx.send(ShutdownSignal::Graceful);
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
    })
}

//! Graceful shutdown utilities
//!
//! Provides unified shutdown signal handling for the service.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
///
/// - On Unix: Ctrl+C (SIGINT) or SIGTERM
/// - On Windows: Ctrl+C only
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Spawn a task that cancels `token` on the first shutdown signal
///
/// Pollers check the token between units of work, so in-flight bus
/// transactions complete before the service stops.
pub fn cancel_on_shutdown(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            },
            _ = token.cancelled() => {},
        }
    })
}

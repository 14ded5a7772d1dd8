//! Shutdown signal handling.

use std::future::Future;

/// Install the SIGTERM/SIGINT handlers now and return a future that resolves
/// once either signal arrives (Ctrl-C off Unix).
///
/// Handlers are registered before this function returns, so a signal that
/// arrives while the caller is still busy (writing the proxy config, spawning
/// workers) is buffered instead of killing the process with the default
/// action.
///
/// If the Unix handlers cannot be installed, falls back to Ctrl-C. If no
/// handler can be installed at all, the future never resolves and the
/// supervisor keeps running until killed.
///
/// Must be called from within a Tokio runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let handlers = {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => Some((sigterm, sigint)),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers, using Ctrl-C only");
                None
            },
        }
    };

    async move {
        #[cfg(unix)]
        if let Some((mut sigterm, mut sigint)) = handlers {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
            return;
        }

        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            },
        }
    }
}

//! Signal handling for graceful server shutdown.

use crate::shutdown::ShutdownState;
use tokio::signal;
use tracing::info;

/// Resolves at the first SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Waits for a termination signal, then initiates shutdown on `state`.
pub async fn shutdown_on_signal(state: &ShutdownState) -> std::io::Result<()> {
    termination_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    state.initiate_shutdown();
    Ok(())
}

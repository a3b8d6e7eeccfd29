use log::{info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("run has been cancelled")]
pub struct Cancelled;

// Sleep for the given duration, returns early if the run is cancelled
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!("Couldn't listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// Cancel the run on the first termination signal,
// exit the process right away on the second one
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        termination_signal().await;
        warn!("Termination signal received, stopping all workers");
        cancel.cancel();

        termination_signal().await;
        info!("Second termination signal received, exiting now");
        std::process::exit(130);
    })
}

use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancels `token` on SIGINT or SIGTERM. The listener exits quietly once the
/// token is cancelled by anyone else.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => return,
            () = wait_for_signal() => {}
        }
        token.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            warn!("Failed to create SIGTERM handler, listening for Ctrl+C only: {}", err);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        () = ctrl_c() => {}
        _ = sigterm.recv() => {
            info!("Received SIGTERM, cancelling in-flight sends");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C), cancelling in-flight sends"),
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            // Without a signal source the listener must not cancel anything.
            std::future::pending::<()>().await;
        }
    }
}

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use dirdav_proto::{DavConfig, Server};

/// Serve until CTRL+C or SIGTERM, then let the listener drain
pub async fn run(config: DavConfig) -> Result<()> {
    let server = Server::new(&config)?;
    tracing::info!("Starting dirdav...");

    let (exit_signal, _provoke_exit) = watch_exit_signals();
    server.run(exit_signal).await?;

    tracing::info!("Server exited");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(err=?e, "unable to listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    futures::future::pending::<()>().await;
}

pub fn watch_exit_signals() -> (watch::Receiver<bool>, Arc<watch::Sender<bool>>) {
    let (send_cancel, watch_cancel) = watch::channel(false);
    let send_cancel = Arc::new(send_cancel);
    let send_cancel_2 = send_cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::info!("Received CTRL+C, shutting down."),
                Err(e) => {
                    tracing::error!(err=?e, "failed to install CTRL+C signal handler");
                    return;
                }
            },
            _ = terminate() => tracing::info!("Received SIGTERM, shutting down."),
        }
        let _ = send_cancel.send(true);
    });
    (watch_cancel, send_cancel_2)
}

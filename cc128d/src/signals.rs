use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on SIGINT or SIGTERM. The run loop notices at its next
/// checkpoint and drains.
pub fn spawn_termination_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(signal) => tracing::info!(signal, "received termination signal"),
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for termination signals");
                return;
            }
        }
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels the session on Ctrl-C. Returns early when the session was stopped some other way.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, stopping");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}

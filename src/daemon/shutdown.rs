use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on Ctrl-C. Returns as well once anything else cancelled it, so a fatal
/// error in the poll loop doesn't leave this waiting forever.
///
/// On Windows detached processes can't detect signals sent to them, there the daemon is stopped
/// by terminating the process.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}

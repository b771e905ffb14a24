// Ctrl+C handling: the first signal cancels the pipeline token.
// Workers stop taking new versions; versions already taken finish.

use s3wipe_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("wipe pipeline has been cancelled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received. Waiting for in-flight versions to finish.");
                cancellation_token.cancel();
            }
        }
    })
}

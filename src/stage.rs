use async_channel::Receiver;

use crate::config::Config;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{S3Object, WipeStatistics};

/// Shared context handed to the lister and to each worker.
///
/// Every stage owns its own clone of the storage handle. The lister has no
/// `receiver`; workers read the work queue through it.
pub struct Stage {
    pub config: Config,
    pub target: Storage,
    pub receiver: Option<Receiver<S3Object>>,
    pub cancellation_token: PipelineCancellationToken,
}

impl Stage {
    pub fn new(
        config: Config,
        target: Storage,
        receiver: Option<Receiver<S3Object>>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            config,
            target,
            receiver,
            cancellation_token,
        }
    }

    /// Send a statistics event through the storage stats channel.
    pub async fn send_stats(&self, stats: WipeStatistics) {
        self.target.send_stats(stats).await;
    }

    /// Flag a non-fatal condition on the run.
    pub fn set_warning(&self) {
        self.target.set_warning();
    }
}

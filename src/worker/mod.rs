use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::deleter::VersionDeleter;
use crate::stage::Stage;
use crate::types::error::S3WipeError;
use crate::types::{S3Object, UnlockResult, WipeOutcome, WipeStatistics, WipeStatsReport};
use crate::unlocker::LockRemover;


/// One member of the worker pool.
///
/// Workers pull versions from the shared work queue until it is closed or the
/// run is cancelled. A version that has been taken from the queue is always
/// processed to its terminal outcome, even if cancellation arrives meanwhile.
///
/// Per-version errors never escape a worker: they become a
/// [`WipeOutcome`] in the shared report and siblings keep going.
pub struct VersionWorker {
    worker_index: u16,
    base: Stage,
    lock_remover: LockRemover,
    version_deleter: VersionDeleter,
    wipe_stats_report: Arc<WipeStatsReport>,
}

impl VersionWorker {
    pub fn new(
        base: Stage,
        worker_index: u16,
        object_lock_enabled: bool,
        wipe_stats_report: Arc<WipeStatsReport>,
    ) -> Self {
        let lock_remover = LockRemover::new(base.target.clone(), object_lock_enabled);
        let version_deleter = VersionDeleter::new(base.target.clone());

        Self {
            worker_index,
            base,
            lock_remover,
            version_deleter,
            wipe_stats_report,
        }
    }

    pub async fn run(&self) -> Result<()> {
        debug!(worker_index = self.worker_index, "wipe worker started.");

        let receiver = self
            .base
            .receiver
            .clone()
            .ok_or_else(|| anyhow!("wipe worker has no work queue."))?;

        self.receive_and_process(receiver).await;
        Ok(())
    }

    async fn receive_and_process(&self, receiver: Receiver<S3Object>) {
        loop {
            tokio::select! {
                biased;

                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "wipe worker has been cancelled.");
                    return;
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(object) => {
                            let outcome = self.process(&object).await;
                            self.record(&object, outcome).await;
                        }
                        Err(_) => {
                            debug!(worker_index = self.worker_index, "wipe worker has been completed.");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Run the per-version state machine and return its terminal outcome.
    pub async fn process(&self, object: &S3Object) -> WipeOutcome {
        let config = &self.base.config;
        let key = object.key();
        let version_id = object.version_id();

        if config.dry_run {
            info!(
                worker_index = self.worker_index,
                key = key,
                version_id = version_id,
                delete_marker = object.is_delete_marker(),
                "[dry-run] would unlock{}.",
                if config.only_unlock { "" } else { " and delete" },
            );
            return WipeOutcome::Simulated;
        }

        let unlock = match self.lock_remover.unlock(object).await {
            Ok(unlock) => unlock,
            Err(e) => {
                if let Some(S3WipeError::ImmutableRetention {
                    legal_hold_cleared, ..
                }) = e.downcast_ref::<S3WipeError>()
                {
                    warn!(
                        worker_index = self.worker_index,
                        key = key,
                        version_id = version_id,
                        legal_hold_cleared = *legal_hold_cleared,
                        "Skipped: {}",
                        e
                    );
                    self.base.set_warning();
                    return WipeOutcome::Skipped(UnlockResult::from_flags(
                        *legal_hold_cleared,
                        false,
                    ));
                }

                error!(
                    worker_index = self.worker_index,
                    key = key,
                    version_id = version_id,
                    "{}",
                    e
                );
                return WipeOutcome::UnlockFailed(e.to_string());
            }
        };

        if config.only_unlock {
            info!(
                worker_index = self.worker_index,
                key = key,
                version_id = version_id,
                "Unlocked ({}).",
                unlock
            );
            return WipeOutcome::Unlocked(unlock);
        }

        match self.version_deleter.delete(object).await {
            Ok(delete) => WipeOutcome::Deleted { unlock, delete },
            Err(e) => {
                error!(
                    worker_index = self.worker_index,
                    key = key,
                    version_id = version_id,
                    "{}",
                    e
                );
                WipeOutcome::DeleteFailed {
                    unlock,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn record(&self, object: &S3Object, outcome: WipeOutcome) {
        self.wipe_stats_report.record(object, &outcome);

        let key = object.key().to_string();
        for stats in outcome_statistics(&outcome, key) {
            self.base.send_stats(stats).await;
        }
    }
}

/// Progress events emitted for one terminal outcome.
fn outcome_statistics(outcome: &WipeOutcome, key: String) -> Vec<WipeStatistics> {
    match outcome {
        WipeOutcome::Simulated => vec![WipeStatistics::VersionSimulated { key }],
        WipeOutcome::Unlocked(_) => vec![WipeStatistics::VersionUnlocked { key }],
        WipeOutcome::Deleted { .. } => vec![
            WipeStatistics::VersionUnlocked { key: key.clone() },
            WipeStatistics::VersionDeleted { key },
        ],
        WipeOutcome::Skipped(_) => vec![WipeStatistics::VersionSkipped { key }],
        WipeOutcome::UnlockFailed(_) => vec![WipeStatistics::VersionFailed { key }],
        WipeOutcome::DeleteFailed { .. } => vec![
            WipeStatistics::VersionUnlocked { key: key.clone() },
            WipeStatistics::VersionFailed { key },
        ],
    }
}

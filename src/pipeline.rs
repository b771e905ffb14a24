//! Wipe pipeline orchestrator.
//!
//! The pipeline checks the bucket's Object Lock configuration, lists every
//! version (writing the CSV export on the way), then fans the enumeration out
//! through a bounded MPMC work queue to `worker_size` [`VersionWorker`]s.
//! Each worker records its outcomes into a shared [`WipeStatsReport`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::lister::VersionLister;
use crate::stage::Stage;
use crate::storage::{self, Storage};
use crate::types::error::S3WipeError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{FailedVersion, S3Object, WipeStatistics, WipeStatsReport, WipeSummary};
use crate::worker::VersionWorker;

/// The wipe pipeline.
///
/// ```text
/// Prerequisites → VersionLister (+ CSV export) → work queue → VersionWorker × N
/// ```
///
/// ## Usage
///
/// ```no_run
/// # async fn example() {
/// use s3wipe_rs::{WipePipeline, build_config_from_args, create_pipeline_cancellation_token};
///
/// let config = build_config_from_args(["s3wipe", "my-locked-bucket"]).unwrap();
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = WipePipeline::new(config, cancellation_token).await;
/// pipeline.close_stats_sender();
/// pipeline.run().await;
///
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
/// println!("{:?}", pipeline.get_summary());
/// # }
/// ```
pub struct WipePipeline {
    config: Config,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_receiver: Receiver<WipeStatistics>,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    ready: bool,
    prerequisites_checked: bool,
    object_lock_enabled: bool,
    wipe_stats_report: Arc<WipeStatsReport>,
}

impl WipePipeline {
    /// Create a new pipeline with an S3 storage built from `config`.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let has_warning = Arc::new(AtomicBool::new(false));
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        let target = storage::create_storage(
            config.clone(),
            cancellation_token.clone(),
            stats_sender,
            has_warning.clone(),
        )
        .await;

        Self::from_parts(
            config,
            cancellation_token,
            target,
            stats_receiver,
            has_warning,
        )
    }

    #[cfg(test)]
    pub(crate) fn with_storage(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        target: Storage,
        stats_receiver: Receiver<WipeStatistics>,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self::from_parts(
            config,
            cancellation_token,
            target,
            stats_receiver,
            has_warning,
        )
    }

    fn from_parts(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        target: Storage,
        stats_receiver: Receiver<WipeStatistics>,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            target,
            cancellation_token,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            has_warning,
            errors: Arc::new(Mutex::new(VecDeque::new())),
            ready: true,
            prerequisites_checked: false,
            object_lock_enabled: false,
            wipe_stats_report: Arc::new(WipeStatsReport::new()),
        }
    }

    /// Run the pipeline to completion (or until cancelled).
    ///
    /// Fatal errors (prerequisites, listing, export) are recorded and can be
    /// read with [`get_errors_and_consume`](Self::get_errors_and_consume).
    /// Per-version failures are not errors; see [`has_failure`](Self::has_failure).
    pub async fn run(&mut self) {
        assert!(self.ready, "WipePipeline::run() called more than once");
        self.ready = false;

        if !self.prerequisites_checked {
            if let Err(e) = self.check_prerequisites().await {
                error!("prerequisite check failed: {:#}", e);
                self.record_error(e);
                self.shutdown();
                return;
            }
        }

        self.execute_pipeline().await;

        self.shutdown();
    }

    /// Query the bucket's Object Lock configuration.
    ///
    /// If not called explicitly, [`run`](Self::run) calls it.
    pub async fn check_prerequisites(&mut self) -> Result<()> {
        self.object_lock_enabled = self
            .target
            .is_object_lock_enabled()
            .await
            .with_context(|| {
                format!(
                    "failed to get the Object Lock configuration of bucket '{}'",
                    self.config.bucket
                )
            })?;

        if self.object_lock_enabled {
            info!(bucket = self.config.bucket, "Object Lock is enabled.");
        } else {
            info!(
                bucket = self.config.bucket,
                "Object Lock is not enabled. No lock will be queried."
            );
        }

        self.prerequisites_checked = true;
        Ok(())
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Whether a non-fatal condition occurred, such as a COMPLIANCE skip.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Whether any version ended in `UnlockFailed` or `DeleteFailed`.
    pub fn has_failure(&self) -> bool {
        self.get_summary().failed() > 0
    }

    /// How a run without fatal errors ended.
    ///
    /// Failed versions take precedence over cancellation: a run that is
    /// cancelled after some version failed still reports
    /// [`S3WipeError::PartialFailure`]. A cancelled run with no failed
    /// version reports [`S3WipeError::Cancelled`].
    pub fn completion_status(&self) -> std::result::Result<(), S3WipeError> {
        let summary = self.get_summary();
        if summary.failed() > 0 {
            return Err(S3WipeError::PartialFailure {
                failed: summary.failed(),
                total: summary.total,
            });
        }
        if self.cancellation_token.is_cancelled() {
            return Err(S3WipeError::Cancelled);
        }
        Ok(())
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().unwrap();
        let mut errors = Vec::with_capacity(error_list.len());
        while let Some(e) = error_list.pop_front() {
            errors.push(e);
        }
        Some(errors)
    }

    /// Get error messages without consuming them.
    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        let error_list = self.errors.lock().unwrap();
        Some(error_list.iter().map(|e| format!("{e:#}")).collect())
    }

    /// Get the stats receiver for progress reporting.
    pub fn get_stats_receiver(&self) -> Receiver<WipeStatistics> {
        self.stats_receiver.clone()
    }

    pub fn get_summary(&self) -> WipeSummary {
        self.wipe_stats_report.snapshot()
    }

    pub fn get_failed_versions(&self) -> Vec<FailedVersion> {
        self.wipe_stats_report.failed_versions()
    }

    /// Close the stats sender to signal the progress reporter to finish.
    ///
    /// Call this before `run()` if you don't need progress reporting.
    pub fn close_stats_sender(&self) {
        self.target.get_stats_sender().close();
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    async fn execute_pipeline(&self) {
        let versions = match self.list_versions().await {
            Ok(versions) => versions,
            Err(e) => {
                error!("{:#}", e);
                self.record_error(e);
                return;
            }
        };

        self.wipe_stats_report.set_total(versions.len() as u64);

        if versions.is_empty() {
            info!(bucket = self.config.bucket, "No object version found.");
            return;
        }
        if self.cancellation_token.is_cancelled() {
            info!("pipeline has been cancelled before processing.");
            return;
        }

        let (sender, receiver) =
            async_channel::bounded::<S3Object>(self.config.object_queue_size as usize);

        let feeder_handle = self.feed_work_queue(versions, sender);
        let worker_handles = self.spawn_workers(receiver);

        if let Err(e) = feeder_handle.await {
            self.has_panic.store(true, Ordering::SeqCst);
            error!("work queue feeder panicked: {}", e);
            self.record_error(anyhow::anyhow!("work queue feeder panicked: {}", e));
        }
        for handle in worker_handles {
            if let Err(e) = handle.await {
                self.has_panic.store(true, Ordering::SeqCst);
                error!("worker supervisor panicked: {}", e);
                self.record_error(anyhow::anyhow!("worker supervisor panicked: {}", e));
            }
        }

        let summary = self.get_summary();
        info!(
            total = summary.total,
            simulated = summary.simulated,
            unlocked = summary.unlocked,
            deleted = summary.deleted,
            already_absent = summary.already_absent,
            skipped = summary.skipped,
            failed = summary.failed(),
            legal_holds_cleared = summary.legal_holds_cleared,
            retentions_cleared = summary.retentions_cleared,
            "wipe pipeline has been completed."
        );

        if self.config.dry_run {
            warn!(
                simulated = summary.simulated,
                "{}",
                dry_run_summary(&summary, self.config.only_unlock)
            );
        }
    }

    async fn list_versions(&self) -> Result<Vec<S3Object>> {
        let stage = self.create_stage(None);
        VersionLister::new(stage).list().await
    }

    /// Push every listed version into the work queue, then close it.
    fn feed_work_queue(&self, versions: Vec<S3Object>, sender: Sender<S3Object>) -> JoinHandle<()> {
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            for object in versions {
                tokio::select! {
                    biased;

                    _ = cancellation_token.cancelled() => {
                        debug!("work queue feeder has been cancelled.");
                        break;
                    }
                    send_result = sender.send(object) => {
                        if send_result.is_err() {
                            break;
                        }
                    }
                }
            }
            sender.close();
        })
    }

    /// Spawn `worker_size` workers sharing one work queue.
    ///
    /// Each worker runs inside a supervisor task so that a panic is caught
    /// and recorded instead of tearing down the runtime.
    fn spawn_workers(&self, receiver: Receiver<S3Object>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.worker_size as usize);

        for worker_index in 0..self.config.worker_size {
            let stage = self.create_stage(Some(receiver.clone()));
            let worker = VersionWorker::new(
                stage,
                worker_index,
                self.object_lock_enabled,
                self.wipe_stats_report.clone(),
            );

            let has_error = self.has_error.clone();
            let has_panic = self.has_panic.clone();
            let error_list = self.errors.clone();
            let cancellation_token = self.cancellation_token.clone();

            handles.push(tokio::spawn(async move {
                let join_result = tokio::spawn(async move { worker.run().await }).await;

                match join_result {
                    Ok(Ok(())) => {
                        debug!(worker_index, "wipe worker completed successfully.");
                    }
                    Ok(Err(e)) => {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        error!(worker_index, "wipe worker failed: {}", e);
                        error_list.lock().unwrap().push_back(e);
                    }
                    Err(e) => {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        has_panic.store(true, Ordering::SeqCst);
                        error!(worker_index, "wipe worker task panicked: {}", e);
                        error_list
                            .lock()
                            .unwrap()
                            .push_back(anyhow::anyhow!("wipe worker panicked: {}", e));
                    }
                }
            }));
        }

        handles
    }

    fn create_stage(&self, receiver: Option<Receiver<S3Object>>) -> Stage {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.target),
            receiver,
            self.cancellation_token.clone(),
        )
    }

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }

    fn shutdown(&self) {
        self.close_stats_sender();
    }
}

fn dry_run_summary(summary: &WipeSummary, only_unlock: bool) -> String {
    format!(
        "[dry-run] {} of {} versions would be unlocked{}. No unlock or delete request was sent; run with -v to list each version.",
        summary.simulated,
        summary.total,
        if only_unlock { "" } else { " and deleted" },
    )
}

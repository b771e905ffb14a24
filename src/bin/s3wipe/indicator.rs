// Progress indicator for the wipe pipeline.
//
// Reads WipeStatistics from the stats channel and keeps one live line of
// counters (and a moving average of versions per second) on the terminal.

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3wipe_rs::WipeStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals seen by [`show_indicator`] once the stats channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_listed_count: u64,
    pub total_simulated_count: u64,
    pub total_unlocked_count: u64,
    pub total_deleted_count: u64,
    pub total_skipped_count: u64,
    pub total_failed_count: u64,
}

impl IndicatorSummary {
    fn apply(&mut self, stats: &WipeStatistics) -> u64 {
        match stats {
            WipeStatistics::VersionsListed(count) => {
                self.total_listed_count += count;
                0
            }
            WipeStatistics::VersionSimulated { .. } => {
                self.total_simulated_count += 1;
                1
            }
            WipeStatistics::VersionUnlocked { .. } => {
                self.total_unlocked_count += 1;
                1
            }
            WipeStatistics::VersionDeleted { .. } => {
                self.total_deleted_count += 1;
                0
            }
            WipeStatistics::VersionSkipped { .. } => {
                self.total_skipped_count += 1;
                1
            }
            WipeStatistics::VersionFailed { .. } => {
                self.total_failed_count += 1;
                0
            }
        }
    }

    fn progress_line(&self, versions_per_sec: u64, dry_run: bool) -> String {
        if dry_run {
            return format!(
                "[dry-run] listed {:>3} versions,  simulated {:>3} versions",
                self.total_listed_count, self.total_simulated_count,
            );
        }

        format!(
            "unlocked {:>3}/{} versions | {:>3} versions/sec,  deleted {:>3},  skipped {},  failed {}",
            self.total_unlocked_count,
            self.total_listed_count,
            HumanCount(versions_per_sec),
            self.total_deleted_count,
            self.total_skipped_count,
            self.total_failed_count,
        )
    }
}

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;

/// Spawn a task that renders wipe progress until `stats_receiver` closes.
///
/// The summary is always logged at `info`; the live line and the final
/// result line are shown only when requested.
pub fn show_indicator(
    stats_receiver: Receiver<WipeStatistics>,
    show_progress: bool,
    show_result: bool,
    dry_run: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_style =
        ProgressStyle::with_template("{wide_msg}").unwrap_or_else(|_| ProgressStyle::default_bar());
    let progress_text = ProgressBar::new(0);
    progress_text.set_style(progress_style);

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_processed_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut summary = IndicatorSummary::default();

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    period_count += summary.apply(&stats);
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let processed = summary.total_unlocked_count + summary.total_skipped_count;
                    let mut versions_per_sec = (processed as f64 / elapsed_secs_f64) as u64;
                    if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        versions_per_sec = processed;
                    }

                    info!(
                        message = "wipe summary",
                        listed = summary.total_listed_count,
                        simulated = summary.total_simulated_count,
                        unlocked = summary.total_unlocked_count,
                        deleted = summary.total_deleted_count,
                        skipped = summary.total_skipped_count,
                        failed = summary.total_failed_count,
                        versions_per_sec = versions_per_sec,
                        duration_sec = elapsed_secs_f64,
                    );

                    if show_result {
                        progress_text.set_style(
                            ProgressStyle::with_template("{msg}")
                                .unwrap_or_else(|_| ProgressStyle::default_bar()),
                        );
                        progress_text.finish_with_message(format!(
                            "{},  duration {}",
                            summary.progress_line(versions_per_sec, dry_run),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return summary;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            ma_processed_count.add_sample(period_count);

            if show_progress {
                progress_text.set_message(
                    summary.progress_line(ma_processed_count.get_average(), dry_run),
                );
            }
        }
    })
}

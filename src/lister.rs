use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::export::VersionExporter;
use crate::stage::Stage;
use crate::types::error::S3WipeError;
use crate::types::{S3Object, WipeStatistics};

/// Enumerates every version and delete marker in the bucket.
///
/// Pagination lives in `StorageTrait::list_object_versions`; this stage
/// collects the stream into memory and mirrors it into the CSV export. The
/// export is flushed before [`list`](VersionLister::list) returns, which is
/// before any worker can touch a lock.
pub struct VersionLister {
    stage: Stage,
}

impl VersionLister {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }

    /// List the whole bucket.
    ///
    /// A listing failure is returned as [`S3WipeError::List`]. When the run is
    /// cancelled, the versions listed so far are returned (and exported).
    pub async fn list(&self) -> Result<Vec<S3Object>> {
        debug!("version listing has started.");

        let config = &self.stage.config;
        let mut exporter = VersionExporter::create(&config.export_file)?;
        let (sender, receiver) = async_channel::bounded::<S3Object>(config.object_queue_size as usize);

        let listing = async {
            let result = self
                .stage
                .target
                .list_object_versions(&sender, config.max_keys)
                .await;
            sender.close();
            result
        };

        let collecting = async {
            let mut versions = Vec::new();
            while let Ok(object) = receiver.recv().await {
                if let Err(e) = exporter.write(&object) {
                    receiver.close();
                    return Err(e);
                }
                versions.push(object);
            }
            Ok(versions)
        };

        let (listing_result, collecting_result) = tokio::join!(listing, collecting);

        listing_result.map_err(|e| {
            anyhow!(S3WipeError::List {
                bucket: config.bucket.clone(),
                message: format!("{e:#}"),
            })
        })?;
        let versions = collecting_result?;

        let rows = exporter.finish()?;
        info!(
            bucket = config.bucket,
            versions = versions.len(),
            export_file = %config.export_file.display(),
            "Listed {} object versions and exported {} rows.",
            versions.len(),
            rows,
        );

        self.stage
            .send_stats(WipeStatistics::VersionsListed(versions.len() as u64))
            .await;

        debug!("version listing has been completed.");
        Ok(versions)
    }
}

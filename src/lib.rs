/*!
# Overview
s3wipe-rs empties an Amazon S3 bucket that has Object Lock enabled.

For every object version and delete marker in the bucket it removes the
legal hold and any unexpired GOVERNANCE retention (using
`BypassGovernanceRetention`), then permanently deletes the version.
Versions under unexpired COMPLIANCE retention cannot be unlocked by anyone;
they are skipped and reported.

## Features
- **Full enumeration first**: every version is listed and written to a CSV
  export before any lock is touched.
- **Bounded worker pool**: versions are processed concurrently by a fixed
  number of workers sharing one work queue.
- **Safe to re-run**: clearing an absent lock is a no-op and deleting an
  absent version counts as success.
- **Dry-run and unlock-only modes**.
- **Library-First**: the s3wipe CLI is a thin wrapper over this crate.

Example usage
=============

```toml
[dependencies]
s3wipe-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3wipe_rs::config::Config;
use s3wipe_rs::config::args::parse_from_args;
use s3wipe_rs::{WipePipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() {
    let args = vec!["s3wipe", "my-locked-bucket", "--dry-run"];

    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = WipePipeline::new(config, cancellation_token).await;
    pipeline.close_stats_sender();
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
    println!("{:?}", pipeline.get_summary());
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod deleter;
pub mod export;
pub mod lister;
pub mod pipeline;
pub mod stage;
pub mod storage;
pub mod types;
pub mod unlocker;
pub mod worker;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod wipe_properties;

pub use config::Config;
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};
pub use export::read_export;
pub use pipeline::WipePipeline;
pub use types::error::S3WipeError;
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{
    DeleteResult, EnumerationRecord, FailedVersion, S3Object, UnlockResult, WipeStatistics,
    WipeSummary,
};

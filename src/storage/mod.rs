use anyhow::Result;
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::types::{ObjectLockLegalHoldStatus, ObjectLockRetention};
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::{ClientConfig, Config};
use crate::types::token::PipelineCancellationToken;
use crate::types::{DeleteResult, S3Object, WipeStatistics};

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Factory trait for creating Storage instances.
#[async_trait]
pub trait StorageFactory {
    async fn create(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<WipeStatistics>,
        client_config: Option<ClientConfig>,
        rate_limit_api_per_sec: Option<Arc<RateLimiter>>,
        has_warning: Arc<AtomicBool>,
    ) -> Storage;
}

/// The S3 operations the wipe pipeline needs, bound to a single bucket.
///
/// Keys are always full object keys and `version_id` is passed through to S3
/// unchanged (`None` addresses the null version). Mutating calls that can be
/// blocked by a GOVERNANCE retention always send `BypassGovernanceRetention`.
///
/// Lock queries return `None` when S3 answers that no lock of that kind is
/// configured, so callers never have to interpret S3 error codes themselves.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// List every object version and delete marker in the bucket and send
    /// them to the channel in listing order.
    ///
    /// Listing failures are treated as unrecoverable errors.
    async fn list_object_versions(&self, sender: &Sender<S3Object>, max_keys: i32) -> Result<()>;

    /// Whether the bucket has Object Lock enabled.
    ///
    /// A bucket without any Object Lock configuration returns `Ok(false)`.
    async fn is_object_lock_enabled(&self) -> Result<bool>;

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockLegalHoldStatus>>;

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()>;

    async fn get_object_retention(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockRetention>>;

    /// Remove the retention of a version, bypassing GOVERNANCE mode.
    async fn clear_object_retention(&self, key: &str, version_id: Option<String>) -> Result<()>;

    /// Permanently delete one version, bypassing GOVERNANCE mode.
    ///
    /// A version that no longer exists is reported as
    /// [`DeleteResult::AlreadyAbsent`] rather than as an error.
    async fn delete_object(&self, key: &str, version_id: Option<String>) -> Result<DeleteResult>;

    /// Get the statistics sender channel.
    fn get_stats_sender(&self) -> Sender<WipeStatistics>;

    /// Send a statistics event through the channel.
    async fn send_stats(&self, stats: WipeStatistics);

    /// Set the warning flag to indicate a warning occurred.
    fn set_warning(&self);
}

dyn_clone::clone_trait_object!(StorageTrait);

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

/// Create the S3 storage for the bucket named in `config`.
///
/// When `rate_limit_api` is set, every S3 request made through the storage
/// takes one token from a shared leaky bucket.
pub async fn create_storage(
    config: Config,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<WipeStatistics>,
    has_warning: Arc<AtomicBool>,
) -> Storage {
    let rate_limit_api_per_sec = config.rate_limit_api.map(build_rate_limiter);
    let client_config = config.target_client_config.clone();

    s3::S3StorageFactory::create(
        config,
        cancellation_token,
        stats_sender,
        client_config,
        rate_limit_api_per_sec,
        has_warning,
    )
    .await
}

fn build_rate_limiter(rate_limit_value: u32) -> Arc<RateLimiter> {
    let refill = if (rate_limit_value as usize) <= REFILL_PER_INTERVAL_DIVIDER {
        1
    } else {
        rate_limit_value as usize / REFILL_PER_INTERVAL_DIVIDER
    };
    Arc::new(
        RateLimiter::builder()
            .max(rate_limit_value as usize)
            .initial(rate_limit_value as usize)
            .refill(refill)
            .fair(true)
            .build(),
    )
}

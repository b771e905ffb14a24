//! Shared test utilities for the s3wipe library crate.
//!
//! Besides the usual config and object builders this module holds
//! [`MockStorage`], an in-memory bucket that behaves like S3 with Object Lock:
//! locked versions refuse deletion, COMPLIANCE retention refuses removal, and
//! every call is recorded so tests can assert on the exact request sequence.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::{
    DeleteMarkerEntry, ObjectLockLegalHoldStatus, ObjectLockRetention, ObjectLockRetentionMode,
    ObjectVersion, ObjectVersionStorageClass,
};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig};
use crate::pipeline::WipePipeline;
use crate::storage::{Storage, StorageTrait};
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    AccessKeys, ClientConfigLocation, DeleteResult, NULL_VERSION_ID, S3Credentials, S3Object,
    WipeStatistics,
};
use crate::unlocker::is_retention_active;

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// A unique export path under the system temp directory.
pub(crate) fn make_temp_export_path() -> PathBuf {
    std::env::temp_dir().join(format!("s3wipe-test-{}.csv", uuid::Uuid::new_v4()))
}

/// Create a default [`Config`] suitable for most unit / property tests.
///
/// Key defaults: `worker_size=4`, `object_queue_size=1000`,
/// bucket=`"test-bucket"`, export file in the temp directory.
pub(crate) fn make_test_config() -> Config {
    let mut config = Config::for_bucket("test-bucket");
    config.worker_size = 4;
    config.object_queue_size = 1000;
    config.export_file = make_temp_export_path();
    config
}

/// Client configuration with static credentials and a local endpoint.
///
/// Building a client from it never touches the network.
pub(crate) fn make_test_client_config() -> ClientConfig {
    ClientConfig {
        client_config_location: ClientConfigLocation {
            aws_config_file: None,
            aws_shared_credentials_file: None,
        },
        credential: S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: "test_key".to_string(),
                secret_access_key: "test_secret".to_string(),
                session_token: None,
            },
        },
        region: Some("us-east-1".to_string()),
        endpoint_url: Some("https://localhost:9000".to_string()),
        force_path_style: true,
        retry_config: RetryConfig {
            aws_max_attempts: 3,
            initial_backoff_milliseconds: 100,
        },
        cli_timeout_config: CLITimeoutConfig {
            operation_timeout_milliseconds: None,
            operation_attempt_timeout_milliseconds: None,
            connect_timeout_milliseconds: None,
            read_timeout_milliseconds: None,
        },
        disable_stalled_stream_protection: false,
        request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
    }
}

/// Create a versioned [`S3Object`] with the given key and version ID.
pub(crate) fn make_versioned_s3_object(key: &str, version_id: &str) -> S3Object {
    S3Object::Versioning(
        ObjectVersion::builder()
            .key(key)
            .version_id(version_id)
            .size(1024)
            .is_latest(true)
            .storage_class(ObjectVersionStorageClass::Standard)
            .last_modified(DateTime::from_secs(1000))
            .build(),
    )
}

/// Create a delete marker [`S3Object`] with the given key and version ID.
pub(crate) fn make_delete_marker(key: &str, version_id: &str) -> S3Object {
    S3Object::DeleteMarker(
        DeleteMarkerEntry::builder()
            .key(key)
            .version_id(version_id)
            .is_latest(true)
            .last_modified(DateTime::from_secs(1000))
            .build(),
    )
}

/// A retention that expires `secs_from_now` seconds from now (negative for the past).
pub(crate) fn make_retention(mode: ObjectLockRetentionMode, secs_from_now: i64) -> ObjectLockRetention {
    let retain_until = chrono::Utc::now().timestamp() + secs_from_now;
    ObjectLockRetention::builder()
        .mode(mode)
        .retain_until_date(DateTime::from_secs(retain_until))
        .build()
}

/// Build a pipeline over a mock bucket, bypassing client creation.
pub(crate) fn make_mock_pipeline(
    config: Config,
    cancellation_token: PipelineCancellationToken,
    mock: &MockStorage,
) -> WipePipeline {
    let (stats_sender, stats_receiver) = async_channel::unbounded();
    let has_warning = Arc::new(AtomicBool::new(false));
    let storage = mock.with_stats(stats_sender, has_warning.clone());

    WipePipeline::with_storage(
        config,
        cancellation_token,
        storage,
        stats_receiver,
        has_warning,
    )
}

// ---------------------------------------------------------------------------
// MockStorage
// ---------------------------------------------------------------------------

type VersionKey = (String, String);

fn version_key(key: &str, version_id: Option<&str>) -> VersionKey {
    (
        key.to_string(),
        version_id.unwrap_or(NULL_VERSION_ID).to_string(),
    )
}

/// One S3 request observed by [`MockStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockCall {
    ListObjectVersions,
    GetObjectLockConfiguration,
    GetObjectLegalHold { key: String, version_id: String },
    PutObjectLegalHold { key: String, version_id: String },
    GetObjectRetention { key: String, version_id: String },
    ClearObjectRetention { key: String, version_id: String },
    DeleteObject { key: String, version_id: String },
}

impl MockCall {
    /// Whether the request changes bucket state.
    pub(crate) fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockCall::PutObjectLegalHold { .. }
                | MockCall::ClearObjectRetention { .. }
                | MockCall::DeleteObject { .. }
        )
    }
}

#[derive(Debug, Default)]
struct MockBucket {
    versions: Vec<S3Object>,
    deleted: HashSet<VersionKey>,
    legal_holds: HashMap<VersionKey, ObjectLockLegalHoldStatus>,
    retentions: HashMap<VersionKey, ObjectLockRetention>,
    failing_unlock_keys: HashSet<String>,
    failing_delete_keys: HashSet<String>,
    fail_listing: bool,
    fail_lock_configuration: bool,
    cancel_on_call: Option<(MockCall, PipelineCancellationToken)>,
    calls: Vec<MockCall>,
}

/// In-memory Object Lock bucket.
///
/// Clones share the same bucket state, so a test keeps one handle for
/// assertions while the pipeline works on another.
#[derive(Clone)]
pub(crate) struct MockStorage {
    bucket: Arc<Mutex<MockBucket>>,
    object_lock_enabled: bool,
    stats_sender: Sender<WipeStatistics>,
    has_warning: Arc<AtomicBool>,
}

impl MockStorage {
    pub(crate) fn new(versions: Vec<S3Object>) -> Self {
        let (stats_sender, _) = async_channel::unbounded();
        Self {
            bucket: Arc::new(Mutex::new(MockBucket {
                versions,
                ..MockBucket::default()
            })),
            object_lock_enabled: true,
            stats_sender,
            has_warning: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn without_object_lock(mut self) -> Self {
        self.object_lock_enabled = false;
        self
    }

    pub(crate) fn with_legal_hold(self, key: &str, version_id: &str) -> Self {
        self.bucket.lock().unwrap().legal_holds.insert(
            version_key(key, Some(version_id)),
            ObjectLockLegalHoldStatus::On,
        );
        self
    }

    pub(crate) fn with_retention(
        self,
        key: &str,
        version_id: &str,
        retention: ObjectLockRetention,
    ) -> Self {
        self.bucket
            .lock()
            .unwrap()
            .retentions
            .insert(version_key(key, Some(version_id)), retention);
        self
    }

    pub(crate) fn with_failing_unlock(self, key: &str) -> Self {
        self.bucket
            .lock()
            .unwrap()
            .failing_unlock_keys
            .insert(key.to_string());
        self
    }

    pub(crate) fn with_failing_delete(self, key: &str) -> Self {
        self.bucket
            .lock()
            .unwrap()
            .failing_delete_keys
            .insert(key.to_string());
        self
    }

    pub(crate) fn with_failing_listing(self) -> Self {
        self.bucket.lock().unwrap().fail_listing = true;
        self
    }

    pub(crate) fn with_failing_lock_configuration(self) -> Self {
        self.bucket.lock().unwrap().fail_lock_configuration = true;
        self
    }

    /// Cancel `cancellation_token` when `call` is received, before it is served.
    pub(crate) fn with_cancellation_on(
        self,
        call: MockCall,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        self.bucket.lock().unwrap().cancel_on_call = Some((call, cancellation_token));
        self
    }

    /// A boxed handle that reports to the given stats channel.
    pub(crate) fn with_stats(
        &self,
        stats_sender: Sender<WipeStatistics>,
        has_warning: Arc<AtomicBool>,
    ) -> Storage {
        let mut storage = self.clone();
        storage.stats_sender = stats_sender;
        storage.has_warning = has_warning;
        Box::new(storage)
    }

    pub(crate) fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    pub(crate) fn calls(&self) -> Vec<MockCall> {
        self.bucket.lock().unwrap().calls.clone()
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|call| call.is_mutation()).count()
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::DeleteObject { .. }))
            .count()
    }

    /// Versions that still exist in the bucket.
    pub(crate) fn remaining_versions(&self) -> Vec<S3Object> {
        let bucket = self.bucket.lock().unwrap();
        bucket
            .versions
            .iter()
            .filter(|object| {
                !bucket
                    .deleted
                    .contains(&version_key(object.key(), object.version_id()))
            })
            .cloned()
            .collect()
    }

    pub(crate) fn legal_hold(&self, key: &str, version_id: &str) -> Option<ObjectLockLegalHoldStatus> {
        self.bucket
            .lock()
            .unwrap()
            .legal_holds
            .get(&version_key(key, Some(version_id)))
            .cloned()
    }

    pub(crate) fn retention(&self, key: &str, version_id: &str) -> Option<ObjectLockRetention> {
        self.bucket
            .lock()
            .unwrap()
            .retentions
            .get(&version_key(key, Some(version_id)))
            .cloned()
    }

    fn record(&self, call: MockCall) {
        let mut bucket = self.bucket.lock().unwrap();
        if let Some((cancel_call, cancellation_token)) = &bucket.cancel_on_call {
            if *cancel_call == call {
                cancellation_token.cancel();
            }
        }
        bucket.calls.push(call);
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn list_object_versions(&self, sender: &Sender<S3Object>, _max_keys: i32) -> Result<()> {
        self.record(MockCall::ListObjectVersions);
        if self.bucket.lock().unwrap().fail_listing {
            return Err(anyhow!("NoSuchBucket: The specified bucket does not exist"));
        }

        for object in self.remaining_versions() {
            if sender.send(object).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn is_object_lock_enabled(&self) -> Result<bool> {
        self.record(MockCall::GetObjectLockConfiguration);
        if self.bucket.lock().unwrap().fail_lock_configuration {
            return Err(anyhow!("AccessDenied: Access Denied"));
        }
        Ok(self.object_lock_enabled)
    }

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockLegalHoldStatus>> {
        let id = version_key(key, version_id.as_deref());
        self.record(MockCall::GetObjectLegalHold {
            key: id.0.clone(),
            version_id: id.1.clone(),
        });

        let bucket = self.bucket.lock().unwrap();
        if bucket.failing_unlock_keys.contains(key) {
            return Err(anyhow!("AccessDenied: Access Denied"));
        }
        Ok(bucket.legal_holds.get(&id).cloned())
    }

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()> {
        let id = version_key(key, version_id.as_deref());
        self.record(MockCall::PutObjectLegalHold {
            key: id.0.clone(),
            version_id: id.1.clone(),
        });

        self.bucket.lock().unwrap().legal_holds.insert(id, status);
        Ok(())
    }

    async fn get_object_retention(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockRetention>> {
        let id = version_key(key, version_id.as_deref());
        self.record(MockCall::GetObjectRetention {
            key: id.0.clone(),
            version_id: id.1.clone(),
        });

        Ok(self.bucket.lock().unwrap().retentions.get(&id).cloned())
    }

    async fn clear_object_retention(&self, key: &str, version_id: Option<String>) -> Result<()> {
        let id = version_key(key, version_id.as_deref());
        self.record(MockCall::ClearObjectRetention {
            key: id.0.clone(),
            version_id: id.1.clone(),
        });

        let mut bucket = self.bucket.lock().unwrap();
        if let Some(retention) = bucket.retentions.get(&id) {
            if retention.mode() == Some(&ObjectLockRetentionMode::Compliance)
                && is_retention_active(retention, chrono::Utc::now())
            {
                return Err(anyhow!("AccessDenied: Access Denied because object protected by object lock"));
            }
        }
        bucket.retentions.remove(&id);
        Ok(())
    }

    async fn delete_object(&self, key: &str, version_id: Option<String>) -> Result<DeleteResult> {
        let id = version_key(key, version_id.as_deref());
        self.record(MockCall::DeleteObject {
            key: id.0.clone(),
            version_id: id.1.clone(),
        });

        let mut bucket = self.bucket.lock().unwrap();
        if bucket.failing_delete_keys.contains(key) {
            return Err(anyhow!("AccessDenied: Access Denied"));
        }
        if bucket.deleted.contains(&id) {
            return Ok(DeleteResult::AlreadyAbsent);
        }

        let held = bucket.legal_holds.get(&id) == Some(&ObjectLockLegalHoldStatus::On);
        let compliance_locked = bucket.retentions.get(&id).is_some_and(|retention| {
            retention.mode() == Some(&ObjectLockRetentionMode::Compliance)
                && is_retention_active(retention, chrono::Utc::now())
        });
        if held || compliance_locked {
            return Err(anyhow!("AccessDenied: Access Denied because object protected by object lock"));
        }

        bucket.deleted.insert(id.clone());
        bucket.legal_holds.remove(&id);
        bucket.retentions.remove(&id);
        Ok(DeleteResult::Deleted)
    }

    fn get_stats_sender(&self) -> Sender<WipeStatistics> {
        self.stats_sender.clone()
    }

    async fn send_stats(&self, stats: WipeStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }

    fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }
}

/// Drain every statistics event currently buffered in the channel.
pub(crate) fn drain_stats(receiver: &Receiver<WipeStatistics>) -> Vec<WipeStatistics> {
    let mut stats = Vec::new();
    while let Ok(stat) = receiver.try_recv() {
        stats.push(stat);
    }
    stats
}

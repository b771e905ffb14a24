use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use aws_sdk_s3::types::{DeleteMarkerEntry, ObjectVersion};
use serde::{Deserialize, Serialize};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// Version id S3 reports for objects written before versioning was enabled.
pub const NULL_VERSION_ID: &str = "null";

/// One entry of a `ListObjectVersions` response.
///
/// Identity is the (key, version id) pair. Delete markers never carry
/// Object Lock settings, so they only go through the delete step.
#[derive(Debug, Clone, PartialEq)]
pub enum S3Object {
    Versioning(ObjectVersion),
    DeleteMarker(DeleteMarkerEntry),
}

impl S3Object {
    pub fn key(&self) -> &str {
        match &self {
            Self::Versioning(object) => object.key().unwrap_or_default(),
            Self::DeleteMarker(marker) => marker.key().unwrap_or_default(),
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match &self {
            Self::Versioning(object) => object.version_id(),
            Self::DeleteMarker(marker) => marker.version_id(),
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker(_))
    }

    pub fn to_record(&self) -> EnumerationRecord {
        EnumerationRecord {
            key: self.key().to_string(),
            version_id: self.version_id().unwrap_or(NULL_VERSION_ID).to_string(),
            is_delete_marker: self.is_delete_marker(),
        }
    }
}

/// A row of the version export, captured before any lock is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationRecord {
    pub key: String,
    pub version_id: String,
    pub is_delete_marker: bool,
}

/// What the lock remover changed on a single version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockResult {
    NoOp,
    LegalHoldCleared,
    RetentionCleared,
    Both,
}

impl UnlockResult {
    pub fn from_flags(legal_hold_cleared: bool, retention_cleared: bool) -> Self {
        match (legal_hold_cleared, retention_cleared) {
            (false, false) => UnlockResult::NoOp,
            (true, false) => UnlockResult::LegalHoldCleared,
            (false, true) => UnlockResult::RetentionCleared,
            (true, true) => UnlockResult::Both,
        }
    }

    pub fn legal_hold_cleared(&self) -> bool {
        matches!(self, UnlockResult::LegalHoldCleared | UnlockResult::Both)
    }

    pub fn retention_cleared(&self) -> bool {
        matches!(self, UnlockResult::RetentionCleared | UnlockResult::Both)
    }
}

impl fmt::Display for UnlockResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnlockResult::NoOp => "no lock",
            UnlockResult::LegalHoldCleared => "legal hold cleared",
            UnlockResult::RetentionCleared => "retention cleared",
            UnlockResult::Both => "legal hold and retention cleared",
        };
        f.write_str(text)
    }
}

/// Result of a version-specific `DeleteObject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    /// The version was already gone. Treated as success so re-runs are safe.
    AlreadyAbsent,
}

/// Terminal state of one version after a worker has processed it.
#[derive(Debug, Clone, PartialEq)]
pub enum WipeOutcome {
    Simulated,
    Unlocked(UnlockResult),
    Deleted {
        unlock: UnlockResult,
        delete: DeleteResult,
    },
    /// Protected by an unexpired COMPLIANCE retention. Carries what was
    /// cleared before the retention was found, at most a legal hold.
    Skipped(UnlockResult),
    UnlockFailed(String),
    DeleteFailed {
        unlock: UnlockResult,
        error: String,
    },
}

/// Events sent through the stats channel to the progress indicator.
#[derive(Debug, PartialEq)]
pub enum WipeStatistics {
    VersionsListed(u64),
    VersionSimulated { key: String },
    VersionUnlocked { key: String },
    VersionDeleted { key: String },
    VersionSkipped { key: String },
    VersionFailed { key: String },
}

/// Counts per outcome category for a finished (or cancelled) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WipeSummary {
    pub total: u64,
    pub simulated: u64,
    pub unlocked: u64,
    pub deleted: u64,
    pub already_absent: u64,
    pub skipped: u64,
    pub unlock_failed: u64,
    pub delete_failed: u64,
    pub legal_holds_cleared: u64,
    pub retentions_cleared: u64,
}

impl WipeSummary {
    pub fn failed(&self) -> u64 {
        self.unlock_failed + self.delete_failed
    }

    /// Number of versions that reached a terminal state.
    ///
    /// `unlocked` already covers every version that went on to the delete
    /// step, whatever the delete result was.
    pub fn processed(&self) -> u64 {
        self.simulated + self.skipped + self.unlock_failed + self.unlocked
    }
}

/// A version whose processing ended in an error outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedVersion {
    pub key: String,
    pub version_id: String,
    pub error: String,
}

/// Concurrency-safe outcome collector shared by all workers.
#[derive(Debug, Default)]
pub struct WipeStatsReport {
    total: AtomicU64,
    simulated: AtomicU64,
    unlocked: AtomicU64,
    deleted: AtomicU64,
    already_absent: AtomicU64,
    skipped: AtomicU64,
    unlock_failed: AtomicU64,
    delete_failed: AtomicU64,
    legal_holds_cleared: AtomicU64,
    retentions_cleared: AtomicU64,
    failed_versions: Mutex<Vec<FailedVersion>>,
}

impl WipeStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn record(&self, object: &S3Object, outcome: &WipeOutcome) {
        match outcome {
            WipeOutcome::Simulated => {
                self.simulated.fetch_add(1, Ordering::SeqCst);
            }
            WipeOutcome::Unlocked(unlock) => {
                self.record_unlock(unlock);
            }
            WipeOutcome::Deleted { unlock, delete } => {
                self.record_unlock(unlock);
                match delete {
                    DeleteResult::Deleted => self.deleted.fetch_add(1, Ordering::SeqCst),
                    DeleteResult::AlreadyAbsent => {
                        self.already_absent.fetch_add(1, Ordering::SeqCst)
                    }
                };
            }
            WipeOutcome::Skipped(unlock) => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                if unlock.legal_hold_cleared() {
                    self.legal_holds_cleared.fetch_add(1, Ordering::SeqCst);
                }
            }
            WipeOutcome::UnlockFailed(error) => {
                self.unlock_failed.fetch_add(1, Ordering::SeqCst);
                self.push_failed(object, error);
            }
            WipeOutcome::DeleteFailed { unlock, error } => {
                self.record_unlock(unlock);
                self.delete_failed.fetch_add(1, Ordering::SeqCst);
                self.push_failed(object, error);
            }
        }
    }

    pub fn snapshot(&self) -> WipeSummary {
        WipeSummary {
            total: self.total.load(Ordering::SeqCst),
            simulated: self.simulated.load(Ordering::SeqCst),
            unlocked: self.unlocked.load(Ordering::SeqCst),
            deleted: self.deleted.load(Ordering::SeqCst),
            already_absent: self.already_absent.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            unlock_failed: self.unlock_failed.load(Ordering::SeqCst),
            delete_failed: self.delete_failed.load(Ordering::SeqCst),
            legal_holds_cleared: self.legal_holds_cleared.load(Ordering::SeqCst),
            retentions_cleared: self.retentions_cleared.load(Ordering::SeqCst),
        }
    }

    pub fn failed_versions(&self) -> Vec<FailedVersion> {
        self.failed_versions.lock().unwrap().clone()
    }

    fn record_unlock(&self, unlock: &UnlockResult) {
        self.unlocked.fetch_add(1, Ordering::SeqCst);
        if unlock.legal_hold_cleared() {
            self.legal_holds_cleared.fetch_add(1, Ordering::SeqCst);
        }
        if unlock.retention_cleared() {
            self.retentions_cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn push_failed(&self, object: &S3Object, error: &str) {
        self.failed_versions.lock().unwrap().push(FailedVersion {
            key: object.key().to_string(),
            version_id: object.version_id().unwrap_or(NULL_VERSION_ID).to_string(),
            error: error.to_string(),
        });
    }
}

/// AWS configuration file locations.
#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// Credential sources accepted for the target bucket.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair, cleared from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}

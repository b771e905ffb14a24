use anyhow::Error;
use thiserror::Error;

/// Application-level error types for s3wipe-rs.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Non-error conditions (Cancelled, ImmutableRetention)
/// - 1: General errors (List, UnlockFailed, DeleteFailed, Export)
/// - 3: Partial failure (some versions ended in an error outcome)
///
/// Invalid arguments exit with 2 through clap before any of these exist.
#[derive(Error, Debug, PartialEq)]
pub enum S3WipeError {
    /// Enumeration of the bucket failed. Fatal: nothing has been touched yet.
    #[error("failed to list object versions in bucket '{bucket}': {message}")]
    List { bucket: String, message: String },

    /// The version is protected by an unexpired COMPLIANCE retention.
    ///
    /// `legal_hold_cleared` records whether a legal hold was switched off on
    /// the same version before the retention was found.
    #[error("{key} (version {version_id}) is under COMPLIANCE retention until {retain_until}")]
    ImmutableRetention {
        key: String,
        version_id: String,
        retain_until: String,
        legal_hold_cleared: bool,
    },

    /// Clearing the legal hold or governance retention failed.
    #[error("failed to unlock {key} (version {version_id}): {message}")]
    UnlockFailed {
        key: String,
        version_id: String,
        message: String,
    },

    /// DeleteObject failed after a successful unlock.
    #[error("failed to delete {key} (version {version_id}): {message}")]
    DeleteFailed {
        key: String,
        version_id: String,
        message: String,
    },

    /// Writing the version export failed.
    #[error("export error: {0}")]
    Export(String),

    /// The run was cancelled before every version was processed.
    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Partial failure: {failed} of {total} versions failed")]
    PartialFailure { failed: u64, total: u64 },
}

impl S3WipeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3WipeError::Cancelled | S3WipeError::ImmutableRetention { .. } => 0,
            S3WipeError::PartialFailure { .. } => 3,
            _ => 1,
        }
    }
}

/// Check if an anyhow::Error wraps a COMPLIANCE retention refusal.
pub fn is_immutable_retention_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<S3WipeError>(),
        Some(S3WipeError::ImmutableRetention { .. })
    )
}

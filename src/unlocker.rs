use anyhow::{Result, anyhow};
use aws_sdk_s3::types::{ObjectLockLegalHoldStatus, ObjectLockRetention, ObjectLockRetentionMode};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::storage::Storage;
use crate::types::error::{S3WipeError, is_immutable_retention_error};
use crate::types::{NULL_VERSION_ID, S3Object, UnlockResult};

/// Whether a retention still protects its version at `now`.
///
/// A retention without a retain-until date protects nothing. A date that
/// cannot be represented is treated as still active.
pub(crate) fn is_retention_active(retention: &ObjectLockRetention, now: DateTime<Utc>) -> bool {
    match retention.retain_until_date() {
        Some(retain_until) => retain_until
            .to_chrono_utc()
            .map_or(true, |retain_until| retain_until > now),
        None => false,
    }
}

/// Clears Object Lock protection from single versions.
///
/// A legal hold that is `ON` is switched `OFF`; an unexpired GOVERNANCE
/// retention is removed with `BypassGovernanceRetention`. An unexpired
/// COMPLIANCE retention is never touched and yields
/// [`S3WipeError::ImmutableRetention`].
///
/// Locks that are already absent or expired cause no mutation, so unlocking
/// the same version twice is harmless.
#[derive(Clone)]
pub struct LockRemover {
    target: Storage,
    object_lock_enabled: bool,
}

impl LockRemover {
    /// `object_lock_enabled` is the bucket-level setting. Without it no
    /// version can carry a lock and no lock query is issued.
    pub fn new(target: Storage, object_lock_enabled: bool) -> Self {
        Self {
            target,
            object_lock_enabled,
        }
    }

    pub async fn unlock(&self, object: &S3Object) -> Result<UnlockResult> {
        if object.is_delete_marker() || !self.object_lock_enabled {
            return Ok(UnlockResult::NoOp);
        }

        let key = object.key();
        let version_id = object.version_id().map(String::from);

        let legal_hold_cleared = self
            .clear_legal_hold(key, version_id.clone())
            .await
            .map_err(|e| unlock_failed(object, e))?;

        let retention_cleared = self
            .clear_retention(object, version_id, legal_hold_cleared)
            .await
            .map_err(|e| {
                if is_immutable_retention_error(&e) {
                    e
                } else {
                    unlock_failed(object, e)
                }
            })?;

        Ok(UnlockResult::from_flags(legal_hold_cleared, retention_cleared))
    }

    async fn clear_legal_hold(&self, key: &str, version_id: Option<String>) -> Result<bool> {
        let status = self
            .target
            .get_object_legal_hold(key, version_id.clone())
            .await?;

        if status != Some(ObjectLockLegalHoldStatus::On) {
            return Ok(false);
        }

        self.target
            .put_object_legal_hold(key, version_id.clone(), ObjectLockLegalHoldStatus::Off)
            .await?;

        info!(key = key, version_id = version_id, "Legal hold cleared.");
        Ok(true)
    }

    async fn clear_retention(
        &self,
        object: &S3Object,
        version_id: Option<String>,
        legal_hold_cleared: bool,
    ) -> Result<bool> {
        let key = object.key();
        let Some(retention) = self
            .target
            .get_object_retention(key, version_id.clone())
            .await?
        else {
            return Ok(false);
        };

        if !is_retention_active(&retention, Utc::now()) {
            debug!(key = key, version_id = version_id, "Retention already expired.");
            return Ok(false);
        }

        if retention.mode() == Some(&ObjectLockRetentionMode::Compliance) {
            let retain_until = retention
                .retain_until_date()
                .map(|date| date.to_string())
                .unwrap_or_default();
            warn!(
                key = key,
                version_id = version_id,
                retain_until = retain_until,
                "Version is under COMPLIANCE retention and cannot be unlocked."
            );
            return Err(anyhow!(S3WipeError::ImmutableRetention {
                key: key.to_string(),
                version_id: version_id.unwrap_or_else(|| NULL_VERSION_ID.to_string()),
                retain_until,
                legal_hold_cleared,
            }));
        }

        self.target
            .clear_object_retention(key, version_id.clone())
            .await?;

        info!(key = key, version_id = version_id, "Governance retention cleared.");
        Ok(true)
    }
}

fn unlock_failed(object: &S3Object, e: anyhow::Error) -> anyhow::Error {
    anyhow!(S3WipeError::UnlockFailed {
        key: object.key().to_string(),
        version_id: object.version_id().unwrap_or(NULL_VERSION_ID).to_string(),
        message: format!("{e:#}"),
    })
}

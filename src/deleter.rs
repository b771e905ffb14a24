use anyhow::{Result, anyhow};
use tracing::info;

use crate::storage::Storage;
use crate::types::error::S3WipeError;
use crate::types::{DeleteResult, NULL_VERSION_ID, S3Object};

/// Permanently deletes single versions.
///
/// Each call is a version-specific `DeleteObject` with
/// `BypassGovernanceRetention`, so it removes the version itself rather than
/// adding a delete marker. A version that is already gone counts as success.
#[derive(Clone)]
pub struct VersionDeleter {
    target: Storage,
}

impl VersionDeleter {
    pub fn new(target: Storage) -> Self {
        Self { target }
    }

    pub async fn delete(&self, object: &S3Object) -> Result<DeleteResult> {
        let key = object.key();
        let version_id = object.version_id().map(String::from);

        let result = self
            .target
            .delete_object(key, version_id.clone())
            .await
            .map_err(|e| {
                anyhow!(S3WipeError::DeleteFailed {
                    key: key.to_string(),
                    version_id: version_id
                        .clone()
                        .unwrap_or_else(|| NULL_VERSION_ID.to_string()),
                    message: format!("{e:#}"),
                })
            })?;

        match result {
            DeleteResult::Deleted => info!(key = key, version_id = version_id, "Version deleted."),
            DeleteResult::AlreadyAbsent => {
                info!(key = key, version_id = version_id, "Version already absent.")
            }
        }

        Ok(result)
    }
}

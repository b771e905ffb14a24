pub mod client_builder;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{
    ObjectLockEnabled, ObjectLockLegalHold, ObjectLockLegalHoldStatus, ObjectLockRetention,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use leaky_bucket::RateLimiter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ClientConfig, Config};
use crate::storage::{Storage, StorageFactory, StorageTrait};
use crate::types::token::PipelineCancellationToken;
use crate::types::{DeleteResult, S3Object, WipeStatistics};

/// S3 error codes meaning "no lock of this kind exists" rather than a failure.
const NO_LOCK_CONFIGURATION_ERROR_CODES: &[&str] = &[
    "NoSuchObjectLockConfiguration",
    "ObjectLockConfigurationNotFoundError",
];
/// Message S3 attaches to `InvalidRequest` when the bucket itself has no lock configuration.
const BUCKET_MISSING_LOCK_CONFIGURATION_MESSAGE: &str = "missing Object Lock Configuration";
const NOT_FOUND_ERROR_CODES: &[&str] = &["NoSuchKey", "NoSuchVersion"];
const HTTP_STATUS_NOT_FOUND: u16 = 404;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "InternalError") and the human-readable error
/// message from the response. For other error types (network, timeout,
/// construction failure), returns "N/A" as the code and the full error
/// description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E, HttpResponse>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

fn is_no_lock_configuration(code: Option<&str>, message: Option<&str>) -> bool {
    match code {
        Some(code) if NO_LOCK_CONFIGURATION_ERROR_CODES.contains(&code) => true,
        Some("InvalidRequest") => message
            .is_some_and(|message| message.contains(BUCKET_MISSING_LOCK_CONFIGURATION_MESSAGE)),
        _ => false,
    }
}

fn is_not_found(code: Option<&str>, http_status: Option<u16>) -> bool {
    code.is_some_and(|code| NOT_FOUND_ERROR_CODES.contains(&code))
        || http_status == Some(HTTP_STATUS_NOT_FOUND)
}

fn is_no_lock_configuration_error<E: ProvideErrorMetadata>(e: &SdkError<E, HttpResponse>) -> bool {
    e.as_service_error()
        .is_some_and(|service_err| is_no_lock_configuration(service_err.code(), service_err.message()))
}

fn is_not_found_error<E: ProvideErrorMetadata>(e: &SdkError<E, HttpResponse>) -> bool {
    let code = e.as_service_error().and_then(|service_err| service_err.code());
    let http_status = e.raw_response().map(|response| response.status().as_u16());
    is_not_found(code, http_status)
}

/// Factory for creating S3 storage instances.
pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<WipeStatistics>,
        client_config: Option<ClientConfig>,
        rate_limit_api_per_sec: Option<Arc<RateLimiter>>,
        has_warning: Arc<AtomicBool>,
    ) -> Storage {
        let client = if let Some(ref client_config) = client_config {
            Some(Arc::new(client_config.create_client().await))
        } else {
            None
        };

        Box::new(S3Storage {
            bucket: config.bucket,
            cancellation_token,
            client,
            stats_sender,
            rate_limit_api_per_sec,
            has_warning,
        })
    }
}

/// Storage backed by a real S3 bucket.
#[derive(Clone)]
struct S3Storage {
    bucket: String,
    cancellation_token: PipelineCancellationToken,
    client: Option<Arc<Client>>,
    stats_sender: Sender<WipeStatistics>,
    rate_limit_api_per_sec: Option<Arc<RateLimiter>>,
    has_warning: Arc<AtomicBool>,
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_object_versions(&self, sender: &Sender<S3Object>, max_keys: i32) -> Result<()> {
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            if self.cancellation_token.is_cancelled() {
                tracing::info!("Version listing cancelled");
                break;
            }

            self.exec_rate_limit_api_per_sec().await;

            let output = self
                .client()?
                .list_object_versions()
                .bucket(&self.bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_id_marker.clone())
                .max_keys(max_keys)
                .send()
                .await
                .map_err(|e| {
                    let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                    tracing::error!(
                        bucket = self.bucket,
                        s3_error_code = s3_error_code,
                        s3_error_message = s3_error_message,
                        "S3 ListObjectVersions API call failed for s3://{}: {} ({}).",
                        self.bucket,
                        s3_error_code,
                        s3_error_message,
                    );
                    anyhow!(e).context("aws_sdk_s3::client::list_object_versions() failed.")
                })?;

            tracing::debug!(
                bucket = self.bucket,
                versions = output.versions().len(),
                delete_markers = output.delete_markers().len(),
                "ListObjectVersions page received."
            );

            let versions = output
                .versions()
                .iter()
                .cloned()
                .map(S3Object::Versioning);
            let delete_markers = output
                .delete_markers()
                .iter()
                .cloned()
                .map(S3Object::DeleteMarker);

            for s3_object in versions.chain(delete_markers) {
                if self.cancellation_token.is_cancelled() {
                    return Ok(());
                }

                if let Err(e) = sender
                    .send(s3_object)
                    .await
                    .context("async_channel::Sender::send() failed.")
                {
                    return if !sender.is_closed() { Err(e) } else { Ok(()) };
                }
            }

            if output.is_truncated() == Some(true) {
                key_marker = output.next_key_marker().map(String::from);
                version_id_marker = output.next_version_id_marker().map(String::from);
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn is_object_lock_enabled(&self) -> Result<bool> {
        self.exec_rate_limit_api_per_sec().await;

        let result = self
            .client()?
            .get_object_lock_configuration()
            .bucket(&self.bucket)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output
                .object_lock_configuration()
                .and_then(|configuration| configuration.object_lock_enabled())
                == Some(&ObjectLockEnabled::Enabled)),
            Err(e) if is_no_lock_configuration_error(&e) => Ok(false),
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectLockConfiguration API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    s3_error_code,
                    s3_error_message,
                );
                Err(anyhow!(e)
                    .context("aws_sdk_s3::client::get_object_lock_configuration() failed."))
            }
        }
    }

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockLegalHoldStatus>> {
        self.exec_rate_limit_api_per_sec().await;

        let result = self
            .client()?
            .get_object_legal_hold()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .send()
            .await;

        match result {
            Ok(output) => Ok(output
                .legal_hold()
                .and_then(|legal_hold| legal_hold.status())
                .cloned()),
            Err(e) if is_no_lock_configuration_error(&e) => Ok(None),
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectLegalHold API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                Err(anyhow!(e).context("aws_sdk_s3::client::get_object_legal_hold() failed."))
            }
        }
    }

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()> {
        self.exec_rate_limit_api_per_sec().await;

        self.client()?
            .put_object_legal_hold()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .legal_hold(ObjectLockLegalHold::builder().status(status).build())
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObjectLegalHold API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object_legal_hold() failed.")
            })?;

        Ok(())
    }

    async fn get_object_retention(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<Option<ObjectLockRetention>> {
        self.exec_rate_limit_api_per_sec().await;

        let result = self
            .client()?
            .get_object_retention()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.retention().cloned()),
            Err(e) if is_no_lock_configuration_error(&e) => Ok(None),
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectRetention API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                Err(anyhow!(e).context("aws_sdk_s3::client::get_object_retention() failed."))
            }
        }
    }

    async fn clear_object_retention(&self, key: &str, version_id: Option<String>) -> Result<()> {
        self.exec_rate_limit_api_per_sec().await;

        // An empty retention removes the setting; S3 rejects retain-until dates in the past.
        self.client()?
            .put_object_retention()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .retention(ObjectLockRetention::builder().build())
            .bypass_governance_retention(true)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObjectRetention API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object_retention() failed.")
            })?;

        Ok(())
    }

    async fn delete_object(&self, key: &str, version_id: Option<String>) -> Result<DeleteResult> {
        self.exec_rate_limit_api_per_sec().await;

        let result = self
            .client()?
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .bypass_governance_retention(true)
            .send()
            .await;

        match result {
            Ok(_) => Ok(DeleteResult::Deleted),
            Err(e) if is_not_found_error(&e) => {
                tracing::debug!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    "Version already absent."
                );
                Ok(DeleteResult::AlreadyAbsent)
            }
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                Err(anyhow!(e).context("aws_sdk_s3::client::delete_object() failed."))
            }
        }
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

impl S3Storage {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| anyhow!("S3 client is not configured for bucket '{}'.", self.bucket))
    }

    async fn exec_rate_limit_api_per_sec(&self) {
        if let Some(ref rate_limiter) = self.rate_limit_api_per_sec {
            rate_limiter.acquire_one().await;
        }
    }
}

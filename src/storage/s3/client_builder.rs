use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::retry::RetryConfig;
use aws_config::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};

use crate::config::ClientConfig;
use crate::types::S3Credentials;

const CREDENTIALS_PROVIDER_NAME: &str = "s3wipe";

impl ClientConfig {
    /// Build an S3 client from this configuration.
    ///
    /// Credentials come from the named profile, the explicit access keys, or
    /// the default provider chain. An explicit region always wins over the
    /// profile and environment.
    pub async fn create_client(&self) -> Client {
        let mut config_builder = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(self.build_retry_config())
            .timeout_config(self.build_timeout_config())
            .stalled_stream_protection(self.build_stalled_stream_protection_config());

        config_builder = self.load_credentials(config_builder);
        config_builder = self.load_region(config_builder);

        if let Some(endpoint_url) = &self.endpoint_url {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        let sdk_config = config_builder.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .request_checksum_calculation(self.request_checksum_calculation.clone());

        Client::from_conf(s3_config_builder.build())
    }

    fn load_credentials(&self, config_builder: ConfigLoader) -> ConfigLoader {
        let config_builder = match self.build_profile_files() {
            Some(profile_files) => config_builder.profile_files(profile_files),
            None => config_builder,
        };

        match &self.credential {
            S3Credentials::Profile(profile_name) => config_builder.profile_name(profile_name),
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.to_string(),
                    access_keys.secret_access_key.to_string(),
                    access_keys.session_token.clone(),
                    None,
                    CREDENTIALS_PROVIDER_NAME,
                );
                config_builder.credentials_provider(credentials)
            }
            S3Credentials::FromEnvironment => config_builder,
        }
    }

    fn load_region(&self, config_builder: ConfigLoader) -> ConfigLoader {
        match &self.region {
            Some(region) => {
                let provider = RegionProviderChain::first_try(Region::new(region.clone()))
                    .or_default_provider();
                config_builder.region(provider)
            }
            None => config_builder,
        }
    }

    fn build_profile_files(&self) -> Option<ProfileFiles> {
        let location = &self.client_config_location;
        if location.aws_config_file.is_none() && location.aws_shared_credentials_file.is_none() {
            return None;
        }

        let mut builder = ProfileFiles::builder();
        match &location.aws_config_file {
            Some(path) => builder = builder.with_file(ProfileFileKind::Config, path),
            None => builder = builder.include_default_config_file(true),
        }
        match &location.aws_shared_credentials_file {
            Some(path) => builder = builder.with_file(ProfileFileKind::Credentials, path),
            None => builder = builder.include_default_credentials_file(true),
        }
        Some(builder.build())
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> TimeoutConfig {
        let timeout = &self.cli_timeout_config;
        let mut builder = TimeoutConfig::builder();
        builder
            .set_operation_timeout(timeout.operation_timeout_milliseconds.map(Duration::from_millis))
            .set_operation_attempt_timeout(
                timeout
                    .operation_attempt_timeout_milliseconds
                    .map(Duration::from_millis),
            )
            .set_connect_timeout(timeout.connect_timeout_milliseconds.map(Duration::from_millis))
            .set_read_timeout(timeout.read_timeout_milliseconds.map(Duration::from_millis));
        builder.build()
    }

    fn build_stalled_stream_protection_config(&self) -> StalledStreamProtectionConfig {
        if self.disable_stalled_stream_protection {
            StalledStreamProtectionConfig::disabled()
        } else {
            StalledStreamProtectionConfig::enabled().build()
        }
    }
}

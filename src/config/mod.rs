pub mod args;

use std::path::PathBuf;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::{ClientConfigLocation, S3Credentials};

/// File the version enumeration is exported to when no path is given.
pub const DEFAULT_EXPORT_FILE: &str = "object_versions.csv";

/// Immutable run configuration for a [`WipePipeline`](crate::WipePipeline).
///
/// Built once (from CLI arguments or by hand) and handed to the pipeline,
/// which only reads it. `dry_run` and `only_unlock` decide what each worker
/// does with a version; everything else tunes the client, the worker pool and
/// logging.
///
/// # Quick Start
///
/// ```
/// use s3wipe_rs::Config;
///
/// let mut config = Config::for_bucket("locked-bucket");
/// config.dry_run = true;
/// config.worker_size = 32;
/// assert_eq!(config.bucket, "locked-bucket");
/// assert!(!config.only_unlock);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub dry_run: bool,
    pub only_unlock: bool,
    pub show_no_progress: bool,
    pub export_file: PathBuf,
    pub target_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub rate_limit_api: Option<u32>,
    pub object_queue_size: u32,
    pub max_keys: i32,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with CLI defaults for the given bucket.
    ///
    /// No client configuration is set; the pipeline then has no S3 client,
    /// so library users normally set `target_client_config` as well.
    pub fn for_bucket(bucket: &str) -> Self {
        Config {
            bucket: bucket.to_string(),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bucket: String::new(),
            dry_run: false,
            only_unlock: false,
            show_no_progress: false,
            export_file: PathBuf::from(DEFAULT_EXPORT_FILE),
            target_client_config: None,
            tracing_config: None,
            worker_size: 16,
            rate_limit_api: None,
            object_queue_size: 200_000,
            max_keys: 1000,
            auto_complete_shell: None,
        }
    }
}

/// AWS S3 client configuration.
///
/// Credential loading, region, endpoint, SDK retry and timeout settings.
/// The client itself is built by `create_client` in `storage::s3::client_builder`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// AWS SDK retry settings. The tool adds no retries of its own.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

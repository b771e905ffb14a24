use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, info, trace, warn};

use s3wipe_rs::config::Config;
use s3wipe_rs::{CLIArgs, S3WipeError, WipePipeline, create_pipeline_cancellation_token};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

/// s3wipe - remove Object Lock protection from every version in a bucket,
/// then delete the versions.
///
/// This binary is a thin wrapper over the s3wipe-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3wipe",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    run(config).await
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();

    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("wipe pipeline start.");

    let mut pipeline = WipePipeline::new(config.clone(), cancellation_token.clone()).await;
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
        config.dry_run,
    );

    pipeline.run().await;
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    if let Some(errors) = pipeline.get_errors_and_consume() {
        for err in &errors {
            error!("{:#}", err);
        }
        error!(duration_sec = duration_sec, "s3wipe failed.");
        return Err(anyhow::anyhow!("s3wipe failed."));
    }

    if pipeline.has_warning() {
        warn!(
            skipped = pipeline.get_summary().skipped,
            "some versions are under COMPLIANCE retention and were left in place."
        );
    }

    match pipeline.completion_status() {
        Ok(()) => {
            debug!(duration_sec = duration_sec, "s3wipe has been completed.");
            Ok(())
        }
        Err(S3WipeError::Cancelled) => {
            info!(duration_sec = duration_sec, "s3wipe has been cancelled.");
            Ok(())
        }
        Err(partial_failure) => {
            for failed in pipeline.get_failed_versions() {
                error!(
                    key = failed.key,
                    version_id = failed.version_id,
                    "{}",
                    failed.error
                );
            }

            error!(duration_sec = duration_sec, "{}", partial_failure);
            std::process::exit(partial_failure.exit_code());
        }
    }
}

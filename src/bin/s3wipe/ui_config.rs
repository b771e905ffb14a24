// Decides what the progress indicator prints, based on Config.

use s3wipe_rs::config::Config;

/// Whether to show the live-updating progress line.
///
/// Suppressed by `--show-no-progress`, by verbosity above `warn` (per-version
/// log lines take over the terminal) and by JSON logging.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    match &config.tracing_config {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

/// Whether to print the final result line.
pub fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    config
        .tracing_config
        .as_ref()
        .is_none_or(|tracing_config| !tracing_config.json_tracing)
}

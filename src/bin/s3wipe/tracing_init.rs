// Tracing subscriber setup for the s3wipe binary.

use std::env;
use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;

use s3wipe_rs::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

const AWS_SDK_TARGETS: [&str; 3] = ["aws_smithy_runtime", "aws_config", "aws_sigv4"];

/// Event filter directives for the crate and, optionally, the AWS SDK.
///
/// `RUST_LOG` wins over the verbosity flags unless SDK tracing is requested.
/// Returns the directives and whether targets should be shown.
fn event_filter(config: &TracingConfig, rust_log: Option<String>) -> (String, bool) {
    let tracing_level = config.tracing_level;
    let own_targets = format!("s3wipe_rs={tracing_level},s3wipe={tracing_level}");

    if config.aws_sdk_tracing {
        let sdk_targets = AWS_SDK_TARGETS
            .iter()
            .map(|target| format!("{target}={tracing_level}"))
            .collect::<Vec<_>>()
            .join(",");
        return (format!("{own_targets},{sdk_targets}"), true);
    }

    match rust_log {
        Some(directives) => (directives, true),
        None => (own_targets, false),
    }
}

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (event_filter, show_target) = event_filter(config, env::var(EVENT_FILTER_ENV_VAR).ok());

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .compact()
        .with_ansi(!config.disable_color_tracing && std::io::stdout().is_terminal())
        .with_span_events(fmt_span)
        .with_env_filter(event_filter)
        .with_target(show_target);

    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the `tracing` filter directives.
pub const LOG_ENV_VAR: &str = "FLAC_PULL_LOG";

/// Directives used when `FLAC_PULL_LOG` is unset or unparsable: this crate's warnings
/// (dropped frames, lost sync), errors only from everything else.
pub const DEFAULT_DIRECTIVES: &str = "error,flac_pull=warn";

/// Initialize structured JSON logging on stderr.
///
/// `FLAC_PULL_LOG` overrides `DEFAULT_DIRECTIVES`, for example
/// `FLAC_PULL_LOG=flac_pull=debug` to trace every decode step.
pub fn init() {
    let directives = std::env::var(LOG_ENV_VAR).ok();

    let _ = tracing_subscriber::registry()
        .with(filter(directives.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}

fn filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

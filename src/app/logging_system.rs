use super::config::{LogFormat, LogLevel};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Noisy dependencies held at `warn` unless RUST_LOG says otherwise.
const DEFAULT_DIRECTIVES: &[&str] = &["rustls=warn", "tokio_rustls=warn"];

/// Filter string for the given CLI level.
pub fn build_filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(DEFAULT_DIRECTIVES.len() + 1);
    parts.push(level.as_str());
    parts.extend_from_slice(DEFAULT_DIRECTIVES);
    parts.join(",")
}

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
///
/// Returns `false` if a subscriber was already installed, which makes this
/// safe to call more than once (tests do).
pub fn setup_logging(level: LogLevel, format: LogFormat) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(build_filter_string(level))
            .unwrap_or_else(|_| EnvFilter::new(level.as_str())),
    };

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).compact())
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_string() {
        assert_eq!(
            build_filter_string(LogLevel::Debug),
            "debug,rustls=warn,tokio_rustls=warn"
        );
    }

    #[test]
    fn test_filter_string_is_valid() {
        for level in [LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug, LogLevel::Trace] {
            assert!(EnvFilter::try_new(build_filter_string(level)).is_ok());
        }
    }
}

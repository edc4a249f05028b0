use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Logs go to stderr so stdout stays clean for tables and JSON.
pub fn init(log_level: &str, force_level: bool) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(log_level, force_level)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// `RUST_LOG` wins over `log_level` unless `force_level` is set.
fn build_filter(log_level: &str, force_level: bool) -> Result<EnvFilter, TelemetryError> {
    if !force_level {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(log_level).map_err(|source| TelemetryError::EnvFilter {
        value: log_level.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_level_ignores_environment() {
        let filter = build_filter("debug", true).unwrap();
        assert!(filter.to_string().eq_ignore_ascii_case("debug"));
    }

    #[test]
    fn test_invalid_level_is_reported() {
        let err = build_filter("radar=loud", true).unwrap_err();
        assert!(matches!(err, TelemetryError::EnvFilter { ref value, .. } if value == "radar=loud"));
    }
}

use thiserror::Error;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AlertingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to install global subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// `RUST_LOG` wins; otherwise the configured filter applies.
pub fn build_env_filter(config: &AlertingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_filter).map_err(|source| LoggingError::Filter {
        filter: config.log_filter.clone(),
        source,
    })
}

/// Installs the process-wide subscriber: JSON to a daily-rotated file under
/// `log_dir`, human-readable to stdout.
pub fn init_logging(config: &AlertingConfig) -> Result<(), LoggingError> {
    let file_appender = rolling::daily(&config.log_dir, "alerting.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false) // No ANSI colors in file
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(build_env_filter(config)?)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_filter_is_used() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = AlertingConfig::in_memory();
        let filter = build_env_filter(&config).unwrap();
        assert!(filter.to_string().contains("sqlx::query=warn"));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = AlertingConfig {
            log_filter: "info,alerting=loud".to_string(),
            ..AlertingConfig::in_memory()
        };
        assert!(matches!(
            build_env_filter(&config),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_init_logging_writes_to_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlertingConfig {
            log_dir: dir.path().to_str().unwrap().to_string(),
            ..AlertingConfig::in_memory()
        };
        // Another test binary may already own the global subscriber.
        match init_logging(&config) {
            Ok(()) | Err(LoggingError::Init(_)) => {}
            Err(e) => panic!("unexpected logging error: {e}"),
        }
    }
}

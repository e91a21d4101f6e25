//! Structured logging setup.
//!
//! Installs a global `tracing-subscriber` registry with an `EnvFilter` and
//! either a JSON or a pretty formatting layer. JSON lines carry:
//! - `timestamp`: RFC 3339 timestamp
//! - `level`: Log level (trace, debug, info, warn, error)
//! - `target`: Module path of the emitting code
//! - `fields`: Structured fields (`kind`, `peer`, `verdict`, ...)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{LogFormat, TelemetryConfig, TelemetryError};

/// Outcome of [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingInit {
    /// This call installed the global subscriber.
    Installed,
    /// A global subscriber was already present; nothing changed.
    AlreadyInstalled,
}

/// Initialize the global log subscriber.
///
/// Calling this more than once is harmless: the first subscriber wins and
/// later calls report [`LoggingInit::AlreadyInstalled`]. An invalid filter
/// directive is an error.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingInit, TelemetryError> {
    let directive = config.filter_directive();
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| TelemetryError::Config(format!("invalid log filter: {e}")))?;

    let installed = match (config.console_output, config.log_format) {
        (false, _) => tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .is_ok(),
        (true, LogFormat::Json) => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
        (true, LogFormat::Pretty) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
    };

    if installed {
        tracing::info!(
            service = %config.service_name,
            filter = %directive,
            format = ?config.log_format,
            "Logging initialized"
        );
        Ok(LoggingInit::Installed)
    } else {
        Ok(LoggingInit::AlreadyInstalled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_error() {
        let config = TelemetryConfig {
            pipeline_log_level: Some("notalevel".to_string()),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_second_init_is_noop() {
        let config = TelemetryConfig {
            console_output: false,
            ..TelemetryConfig::default()
        };
        let _ = init_logging(&config).unwrap();
        assert_eq!(
            init_logging(&config).unwrap(),
            LoggingInit::AlreadyInstalled
        );
    }
}

//! Telemetry configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `QC_SERVICE_NAME` | `qc-05-gossip` | Service name in the startup line |
//! | `QC_LOG_LEVEL` / `RUST_LOG` | `info` | Base `EnvFilter` directive |
//! | `QC_GOSSIP_LOG_LEVEL` | unset | Level for the pipeline crate only |
//! | `QC_LOG_FORMAT` | `pretty` | `json` or `pretty` |
//! | `QC_CONSOLE_OUTPUT` | `true` | `false`/`0` installs a filter with no output |

use std::env;

/// Log target of the pipeline crate, used for the per-crate directive.
pub const PIPELINE_TARGET: &str = "qc_05_gossip_pipeline";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, ANSI coloured.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,

    /// Base filter: a level or a full `EnvFilter` directive string
    pub log_level: String,

    /// Overrides the level for [`PIPELINE_TARGET`] on top of `log_level`,
    /// e.g. `debug` to see every verdict without debug noise from tokio
    pub pipeline_log_level: Option<String>,

    pub log_format: LogFormat,

    pub console_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "qc-05-gossip".to_string(),
            log_level: "info".to_string(),
            pipeline_log_level: None,
            log_format: LogFormat::Pretty,
            console_output: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall
    /// back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("QC_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("QC_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            pipeline_log_level: lookup("QC_GOSSIP_LOG_LEVEL").filter(|v| !v.is_empty()),
            log_format: lookup("QC_LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            console_output: lookup("QC_CONSOLE_OUTPUT")
                .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
                .unwrap_or(defaults.console_output),
        }
    }

    /// Directive string handed to `EnvFilter`.
    pub fn filter_directive(&self) -> String {
        match &self.pipeline_log_level {
            Some(level) => format!("{},{}={}", self.log_level, PIPELINE_TARGET, level),
            None => self.log_level.clone(),
        }
    }
}

//! # Logging
//!
//! `RUST_LOG` takes precedence over the configured level so a single
//! module can be turned up without touching `LOG_LEVEL`.

use crate::config::SynthConfig;
use tracing_subscriber::EnvFilter;

/// Filter directive for a configured level, scoped to this crate
fn default_directive(log_level: &str) -> String {
    format!("stack_synth={}", log_level.to_lowercase())
}

/// Build the env filter, falling back to the configured level
#[must_use]
pub fn env_filter(config: &SynthConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_e| EnvFilter::new(default_directive(&config.log_level)))
}

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Compact single-line text
    Compact { ansi: bool },
}

impl LogFormat {
    #[must_use]
    pub fn from_config(config: &SynthConfig) -> Self {
        if config.json_logs() {
            Self::Json
        } else {
            Self::Compact {
                ansi: config.log_enable_color,
            }
        }
    }
}

/// Install the global tracing subscriber
///
/// A second call is a no-op, which keeps tests that share a process from
/// failing on re-initialization.
pub fn init_logging(config: &SynthConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr);

    let result = match LogFormat::from_config(config) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact { ansi } => builder.compact().with_ansi(ansi).try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("Tracing subscriber already initialized: {}", e);
    }
}

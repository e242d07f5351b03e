//! # Synthesizer Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::constants::{DEFAULT_OUTPUT_DIR, DEFAULT_REGION};
use std::path::PathBuf;

/// Process-level configuration
///
/// Every setting has a default and can be overridden through the
/// environment, which is how the infrastructure build in CodeBuild passes
/// its account and region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE); `RUST_LOG` wins
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// Directory templates and the manifest are written to
    pub output_dir: PathBuf,
    /// Deployment description; the built-in one is used when unset
    pub config_path: Option<PathBuf>,
    /// Environment registry; the built-in one is used when unset
    pub registry_path: Option<PathBuf>,
    /// Account stacks deploy into when the deployment description has none
    pub account: Option<String>,
    /// Region stacks deploy into when the deployment description has none
    pub region: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            log_enable_color: true,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            config_path: None,
            registry_path: None,
            account: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl SynthConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            log_format: env_var_or_default_str("LOG_FORMAT", &defaults.log_format),
            log_enable_color: env_var_or_default_bool(
                "LOG_ENABLE_COLOR",
                defaults.log_enable_color,
            ),
            output_dir: env_var_or_default("SYNTH_OUTPUT_DIR", defaults.output_dir),
            config_path: env_var_opt("SYNTH_CONFIG_PATH").map(PathBuf::from),
            registry_path: env_var_opt("SYNTH_REGISTRY_PATH").map(PathBuf::from),
            account: env_var_opt("AWS_ACCOUNT_ID"),
            region: env_var_or_default_str("AWS_REGION", &defaults.region),
        }
    }

    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_e| default.to_string())
}

/// Read a non-empty environment variable
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_write_to_cdk_out() {
        let config = SynthConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("cdk.out"));
        assert!(!config.json_logs());
        assert!(config.account.is_none());
    }

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(env_var_or_default_str("STACK_SYNTH_TEST_UNSET_VAR", "x"), "x");
        assert!(env_var_or_default_bool("STACK_SYNTH_TEST_UNSET_VAR", true));
        assert_eq!(env_var_or_default("STACK_SYNTH_TEST_UNSET_VAR", 7u32), 7);
        assert!(env_var_opt("STACK_SYNTH_TEST_UNSET_VAR").is_none());
    }
}

//! # Environments
//!
//! The closed set of deployment environments and the registry of
//! per-environment secrets and configuration values.

mod registry;

pub use registry::{
    ConfigBundle, EnvironmentBundle, EnvironmentRegistry, SecretRef, SecretsBundle,
};

use crate::error::SynthError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment
///
/// Chosen once per deployment; every secret and config lookup is keyed by it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Dev, Environment::Prod];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    /// Git branch the pipelines of this environment track
    #[must_use]
    pub fn branch(&self) -> &'static str {
        match self {
            Environment::Dev => "master",
            Environment::Prod => "prod",
        }
    }

    /// Cloud Map namespace services register into
    #[must_use]
    pub fn namespace(&self) -> String {
        format!("local-{}", self.as_str())
    }

    /// Value of `NODE_ENV`-style runtime mode flags
    #[must_use]
    pub fn runtime_mode(&self) -> &'static str {
        match self {
            Environment::Dev => "development",
            Environment::Prod => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(SynthError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_environments_case_insensitively() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!(" PROD ".parse::<Environment>().unwrap(), Environment::Prod);
    }

    #[test]
    fn rejects_unknown_environment() {
        let err = "staging".parse::<Environment>().unwrap_err();
        assert!(matches!(err, SynthError::UnknownEnvironment(ref e) if e == "staging"));
    }

    #[test]
    fn namespace_and_branch_follow_environment() {
        assert_eq!(Environment::Dev.namespace(), "local-dev");
        assert_eq!(Environment::Prod.namespace(), "local-prod");
        assert_eq!(Environment::Dev.branch(), "master");
        assert_eq!(Environment::Prod.branch(), "prod");
    }
}

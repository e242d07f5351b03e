//! # Errors
//!
//! Error type shared by every descriptor builder and the synthesizer.

use crate::environment::Environment;
use thiserror::Error;

/// Failure while assembling or synthesizing the descriptor graph
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("unknown environment '{0}' (expected one of: dev, prod)")]
    UnknownEnvironment(String),

    #[error("invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("invalid logical id '{0}': must be 1-255 ASCII alphanumeric characters")]
    InvalidLogicalId(String),

    #[error("duplicate resource '{logical_id}' in stack '{stack}'")]
    DuplicateResource { stack: String, logical_id: String },

    #[error("duplicate stack '{0}'")]
    DuplicateStack(String),

    #[error("network topology for environment '{0}' is already defined")]
    DuplicateNetwork(Environment),

    #[error("no network topology defined for environment '{0}'")]
    MissingNetwork(Environment),

    #[error(
        "invalid autoscaling bounds: desired={desired} min={min} max={max} \
         (require desired <= min <= max and max >= 1)"
    )]
    InvalidScalingBounds { desired: u32, min: u32, max: u32 },

    #[error("parameter '{0}' has no bound value and no default")]
    UnboundParameter(String),

    #[error("image locator '{0}' is malformed")]
    MalformedLocator(String),

    #[error("unknown {kind} key '{key}' for environment '{environment}'")]
    UnknownRegistryKey {
        kind: &'static str,
        key: String,
        environment: Environment,
    },

    #[error("stack '{stack}' imports '{export}' which none of its dependencies export")]
    DanglingImport { stack: String, export: String },

    #[error("stack '{stack}' depends on unknown stack '{dependency}'")]
    UnknownDependency { stack: String, dependency: String },

    #[error("dependency cycle among stacks: {0}")]
    DependencyCycle(String),

    #[error("pipeline stages out of order: {0}")]
    StageOrder(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T, E = SynthError> = std::result::Result<T, E>;

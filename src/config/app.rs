//! # Deployment Description
//!
//! The environments to deploy, their networks and the services in each,
//! loaded from YAML:
//!
//! ```yaml
//! account: "123456789012"
//! region: us-east-1
//! environments:
//!   - environment: dev
//!     network:
//!       cidr: 10.1.0.0/20
//!       maxAzs: 2
//!     services:
//!       - name: api
//!         desiredCount: 1
//!         source:
//!           connectionArn: arn:aws:codestar-connections:us-east-1:123456789012:connection/...
//!           owner: example-org
//!           repo: api
//!         secrets:
//!           DB_URL: DB_URL
//!         config: [NODE_ENV, REDIS_URL]
//! ```

use crate::constants::{
    DEFAULT_APP_NAME, DEFAULT_MAX_AZS, DEFAULT_MAX_CAPACITY, DEFAULT_TASK_CPU,
    DEFAULT_TASK_MEMORY_MIB, DEFAULT_VPC_CIDR, LOAD_BALANCER_IDLE_TIMEOUT_SECS,
};
use crate::environment::Environment;
use crate::error::{Result, SynthError};
use crate::network::{DomainConfig, IngressPolicy};
use crate::pipeline::{SourceConfig, SynthSourceConfig};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

static SERVICE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]{0,31}$")
        .expect("Failed to compile SERVICE_NAME_REGEX - this should never happen")
});

static SOURCE_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-][A-Za-z0-9._/-]*$")
        .expect("Failed to compile SOURCE_PATH_REGEX - this should never happen")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Log stream prefix (`<appName>-<env>/<service>`)
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Falls back to `AWS_ACCOUNT_ID`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Falls back to `AWS_REGION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// What the pipelines' infrastructure builds synthesize from
    #[serde(default)]
    pub synth_source: SynthSourceConfig,
    pub environments: Vec<EnvironmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub environment: Environment,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default = "default_cidr")]
    pub cidr: String,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    /// Inbound rule of the shared service security group
    #[serde(default)]
    pub ingress: IngressPolicy,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u32,
    /// Serve the load balancer over HTTPS on this domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            ingress: IngressPolicy::default(),
            idle_timeout_secs: default_idle_timeout(),
            domain: None,
        }
    }
}

/// How the pipeline rolls out a new image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DeployMode {
    /// Redeploy the service stack with the new tag as a parameter
    #[default]
    CloudFormation,
    /// Update the ECS service from `imagedefinitions.json`
    Ecs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory")]
    pub memory_mib: u32,
    pub source: SourceConfig,
    /// Repository holding this tool's deployment description; defaults to
    /// `source`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_source: Option<SourceConfig>,
    #[serde(default)]
    pub deploy: DeployMode,
    /// Container variable -> registry secret key
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    /// Registry config keys exposed under their own names
    #[serde(default)]
    pub config: Vec<String>,
    /// Literal container variables
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub public_read: bool,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_cidr() -> String {
    DEFAULT_VPC_CIDR.to_string()
}

fn default_max_azs() -> u8 {
    DEFAULT_MAX_AZS
}

fn default_idle_timeout() -> u32 {
    LOAD_BALANCER_IDLE_TIMEOUT_SECS
}

fn default_desired_count() -> u32 {
    1
}

fn default_max_capacity() -> u32 {
    DEFAULT_MAX_CAPACITY
}

fn default_cpu() -> u32 {
    DEFAULT_TASK_CPU
}

fn default_memory() -> u32 {
    DEFAULT_TASK_MEMORY_MIB
}

impl AppConfig {
    /// One `dev` environment with a single `api` service
    #[must_use]
    pub fn builtin() -> Self {
        let connection_arn =
            "arn:aws:codestar-connections:us-east-1:123456789012:connection/00000000-0000-0000-0000-000000000000";
        let mut secrets = BTreeMap::new();
        for key in [
            "MQ_USERNAME",
            "MQ_PASSWORD",
            "APOLLO_KEY",
            "DB_URL",
            "AUTH_PRIVATE_KEY",
            "SYSTEM_USER_TOKEN",
        ] {
            secrets.insert(key.to_string(), key.to_string());
        }
        Self {
            app_name: default_app_name(),
            account: None,
            region: None,
            synth_source: SynthSourceConfig::default(),
            environments: vec![EnvironmentConfig {
                environment: Environment::Dev,
                network: NetworkConfig::default(),
                services: vec![ServiceConfig {
                    name: "api".to_string(),
                    desired_count: 1,
                    max_capacity: DEFAULT_MAX_CAPACITY,
                    cpu: DEFAULT_TASK_CPU,
                    memory_mib: DEFAULT_TASK_MEMORY_MIB,
                    source: SourceConfig {
                        connection_arn: connection_arn.to_string(),
                        owner: "example-org".to_string(),
                        repo: "api".to_string(),
                        branch: None,
                    },
                    infra_source: Some(SourceConfig {
                        connection_arn: connection_arn.to_string(),
                        owner: "example-org".to_string(),
                        repo: "api-infrastructure".to_string(),
                        branch: Some("main".to_string()),
                    }),
                    deploy: DeployMode::CloudFormation,
                    secrets,
                    config: ["NODE_ENV", "MQ_ENDPOINT", "REDIS_URL", "PUBLIC_API_URL"]
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    environment: BTreeMap::new(),
                    storage: None,
                }],
            }],
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML deployment description from disk
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading deployment description");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Fill account and region from process settings where unset
    #[must_use]
    pub fn with_defaults(mut self, account: Option<&str>, region: &str) -> Self {
        if self.account.is_none() {
            self.account = account.map(str::to_string);
        }
        if self.region.is_none() {
            self.region = Some(region.to_string());
        }
        self
    }

    /// Record the files this description was loaded from as the ones the
    /// infrastructure builds synthesize from, where not set explicitly
    ///
    /// Only relative paths carry over into a checkout; others are skipped
    /// with a warning.
    #[must_use]
    pub fn with_synth_source(mut self, config_path: Option<&Path>, registry_path: Option<&Path>) -> Self {
        if self.synth_source.config_path.is_none() {
            self.synth_source.config_path = config_path.and_then(|p| checkout_path(p, "deployment description"));
        }
        if self.synth_source.registry_path.is_none() {
            self.synth_source.registry_path = registry_path.and_then(|p| checkout_path(p, "registry"));
        }
        self
    }

    /// Structural checks; cross-environment and registry checks happen
    /// during composition
    pub fn validate(&self) -> Result<()> {
        if let Some(account) = &self.account {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(SynthError::InvalidConfig(format!(
                    "account '{account}' must be 12 digits"
                )));
            }
        }
        for path in [&self.synth_source.config_path, &self.synth_source.registry_path]
            .into_iter()
            .flatten()
        {
            if !SOURCE_PATH_REGEX.is_match(path) {
                return Err(SynthError::InvalidConfig(format!(
                    "synth source path '{path}' must be relative to the infrastructure checkout"
                )));
            }
        }
        for environment in &self.environments {
            if let Some(domain) = &environment.network.domain {
                if domain.name.is_empty() || !domain.name.contains('.') || domain.name.ends_with('.') {
                    return Err(SynthError::InvalidConfig(format!(
                        "domain '{}' of '{}' must be a fully qualified name without a trailing dot",
                        domain.name, environment.environment
                    )));
                }
            }
            let mut seen = BTreeSet::new();
            for service in &environment.services {
                if !SERVICE_NAME_REGEX.is_match(&service.name) {
                    return Err(SynthError::InvalidConfig(format!(
                        "service name '{}' must be lowercase alphanumeric, starting with a letter",
                        service.name
                    )));
                }
                if !seen.insert(service.name.as_str()) {
                    return Err(SynthError::InvalidConfig(format!(
                        "service '{}' is declared twice in '{}'",
                        service.name, environment.environment
                    )));
                }
            }
        }
        Ok(())
    }

    /// JSON Schema of the deployment description
    pub fn json_schema() -> Result<serde_json::Value> {
        Ok(serde_json::to_value(schemars::schema_for!(AppConfig))?)
    }
}

/// `path` as it would appear inside the infrastructure checkout
fn checkout_path(path: &Path, what: &str) -> Option<String> {
    let lossy = path.to_string_lossy();
    let relative = lossy.strip_prefix("./").unwrap_or(&*lossy);
    if SOURCE_PATH_REGEX.is_match(relative) {
        Some(relative.to_string())
    } else {
        warn!(
            path = %lossy,
            "Infrastructure builds cannot read the {what} from this path; set synthSource explicitly"
        );
        None
    }
}

//! # Environment Registry
//!
//! Static mapping from environment to its secrets and configuration bundle.
//!
//! Secrets are references to Secrets Manager entries; their values are only
//! ever resolved by ECS at container start. Config values are literals that
//! end up in the container environment as-is.

use super::Environment;
use crate::error::{Result, SynthError};
use crate::template::Expr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reference to a Secrets Manager secret by its complete name (including
/// the random suffix Secrets Manager appends)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef {
    id: String,
}

impl SecretRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// ARN of the secret in the deploying stack's account and region
    #[must_use]
    pub fn arn_expr(&self) -> Expr {
        Expr::sub(format!(
            "arn:${{AWS::Partition}}:secretsmanager:${{AWS::Region}}:${{AWS::AccountId}}:secret:{}",
            self.id
        ))
    }
}

/// Logical name -> external secret reference
pub type SecretsBundle = BTreeMap<String, SecretRef>;

/// Logical name -> literal configuration value
pub type ConfigBundle = BTreeMap<String, String>;

/// Everything one environment contributes to a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentBundle {
    pub secrets: SecretsBundle,
    pub config: ConfigBundle,
}

impl EnvironmentBundle {
    /// Map container variable names onto registry secret keys
    ///
    /// `selection` pairs are `(variable name, registry key)`.
    pub fn select_secrets<'a, I>(
        &self,
        environment: Environment,
        selection: I,
    ) -> Result<BTreeMap<String, SecretRef>>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        selection
            .into_iter()
            .map(|(var, key)| {
                self.secrets
                    .get(key)
                    .map(|secret| (var.clone(), secret.clone()))
                    .ok_or_else(|| SynthError::UnknownRegistryKey {
                        kind: "secret",
                        key: key.clone(),
                        environment,
                    })
            })
            .collect()
    }

    /// Pick config keys; the variable name equals the registry key
    pub fn select_config<'a, I>(
        &self,
        environment: Environment,
        keys: I,
    ) -> Result<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .map(|key| {
                self.config
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
                    .ok_or_else(|| SynthError::UnknownRegistryKey {
                        kind: "config",
                        key: key.clone(),
                        environment,
                    })
            })
            .collect()
    }
}

/// Registry of bundles for the closed set of environments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRegistry {
    bundles: BTreeMap<Environment, EnvironmentBundle>,
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EnvironmentRegistry {
    /// Bundles compiled into the binary
    #[must_use]
    pub fn builtin() -> Self {
        let mut bundles = BTreeMap::new();
        bundles.insert(Environment::Dev, dev_bundle());
        bundles.insert(Environment::Prod, prod_bundle());
        Self { bundles }
    }

    /// Load a registry from YAML (same shape as the serialized registry)
    pub fn from_yaml(content: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(content)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Bundle for an environment
    ///
    /// Every `Environment` has a bundle once the registry is validated, so
    /// this can only fail for hand-built registries.
    pub fn lookup(&self, environment: Environment) -> Result<&EnvironmentBundle> {
        self.bundles
            .get(&environment)
            .ok_or_else(|| SynthError::UnknownEnvironment(environment.to_string()))
    }

    /// Bundle for an environment given by name
    pub fn lookup_name(&self, name: &str) -> Result<&EnvironmentBundle> {
        let environment: Environment = name.parse()?;
        self.lookup(environment)
    }

    /// Every environment must be present and expose the same key sets
    pub fn validate(&self) -> Result<()> {
        let mut reference: Option<(Environment, BTreeSet<&String>, BTreeSet<&String>)> = None;
        for environment in Environment::ALL {
            let bundle = self.lookup(environment)?;
            let secret_keys: BTreeSet<_> = bundle.secrets.keys().collect();
            let config_keys: BTreeSet<_> = bundle.config.keys().collect();
            match &reference {
                None => reference = Some((environment, secret_keys, config_keys)),
                Some((first, secrets, config)) => {
                    if *secrets != secret_keys || *config != config_keys {
                        return Err(SynthError::InvalidConfig(format!(
                            "environments '{first}' and '{environment}' expose different registry keys"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn bundle(secrets: &[(&str, &str)], config: &[(&str, &str)]) -> EnvironmentBundle {
    EnvironmentBundle {
        secrets: secrets
            .iter()
            .map(|(k, v)| ((*k).to_string(), SecretRef::new(*v)))
            .collect(),
        config: config
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    }
}

fn dev_bundle() -> EnvironmentBundle {
    bundle(
        &[
            ("MQ_USERNAME", "dev/mq/username-8bpNSb"),
            ("MQ_PASSWORD", "dev/mq/secret-ZCMRkf"),
            ("APOLLO_KEY", "dev/apollo/key-Bcqn5d"),
            ("AWS_ACCESS_KEY_ID", "dev/iam/microservice/key-id-kcRHpQ"),
            ("AWS_SECRET_ACCESS_KEY", "dev/iam/microservice/key-secret-IQiT0e"),
            ("TWITTER_KEY", "dev/twitter/key-hXILQQ"),
            ("TWITTER_SECRET", "dev/twitter/secret-w5WMOV"),
            ("DB_URL", "dev/db/postgres-url-plnbxA"),
            ("APPLE_PRIVATE_KEY", "dev/apple/private-key-A5WArN"),
            ("SYSTEM_USER_TOKEN", "dev/auth/system-token-vld24Y"),
            ("AUTH_PRIVATE_KEY", "dev/auth/private-key-1PYS7f"),
            ("BRANCH_KEY", "dev/branch/key-Q2xk9a"),
            ("HUBSPOT_API_KEY", "dev/hubspot/api-key-Lm3pTe"),
            ("DOCKERHUB_CREDENTIALS", "dev/dockerhub/credentials-Xw81Zc"),
        ],
        &[
            (
                "APPLE_REDIRECT_URI",
                "https://dev.example.com/#/callbacks/sign_in_with_apple",
            ),
            ("APPLE_APP_CLIENT_ID", "com.example.app.dev"),
            ("APPLE_KEY_ID", "4HJRW398T2"),
            ("MQ_ENDPOINT", "amqps://mq-dev.example.internal:5671"),
            ("REDIS_URL", "redis://cache-dev.example.internal:6379"),
            ("NODE_ENV", Environment::Dev.runtime_mode()),
            ("APP_ID", "com.example.app.dev"),
            ("PUBLIC_API_URL", "https://gw-dev.example.com"),
            ("LOGO_FILE_ID", "19e51760-8da0-11eb-9daf-d17b8a47fb92.png"),
        ],
    )
}

fn prod_bundle() -> EnvironmentBundle {
    bundle(
        &[
            ("MQ_USERNAME", "prod/mq/username-6Vvqj0"),
            ("MQ_PASSWORD", "prod/mq/secret-yC1GMP"),
            ("APOLLO_KEY", "prod/apollo/key-1sQ9ww"),
            ("AWS_ACCESS_KEY_ID", "prod/iam/microservice/key-id-EVBxDI"),
            ("AWS_SECRET_ACCESS_KEY", "prod/iam/microservice/key-secret-1bPPDa"),
            ("TWITTER_KEY", "prod/twitter/key-gkFoJu"),
            ("TWITTER_SECRET", "prod/twitter/secret-SkcS2x"),
            ("DB_URL", "prod/db/postgres-url-h98cG2"),
            ("APPLE_PRIVATE_KEY", "prod/apple/private-key-TtNsPT"),
            ("SYSTEM_USER_TOKEN", "prod/auth/system-token-kPKNuJ"),
            ("AUTH_PRIVATE_KEY", "prod/auth/private-key-ZGYJgs"),
            ("BRANCH_KEY", "prod/branch/key-Vb72Rd"),
            ("HUBSPOT_API_KEY", "prod/hubspot/api-key-Hc55Jq"),
            ("DOCKERHUB_CREDENTIALS", "prod/dockerhub/credentials-Tn03Ke"),
        ],
        &[
            (
                "APPLE_REDIRECT_URI",
                "https://example.com/#/callbacks/sign_in_with_apple",
            ),
            ("APPLE_APP_CLIENT_ID", "com.example.app"),
            ("APPLE_KEY_ID", "4HJRW398T2"),
            ("MQ_ENDPOINT", "amqps://mq-prod.example.internal:5671"),
            ("REDIS_URL", "redis://cache-prod.example.internal:6379"),
            ("NODE_ENV", Environment::Prod.runtime_mode()),
            ("APP_ID", "com.example.app"),
            ("PUBLIC_API_URL", "https://gw.example.com"),
            ("LOGO_FILE_ID", "60d6dd70-8da0-11eb-a4ab-51844c540bc2.png"),
        ],
    )
}

//! Shared fixtures for the integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use stack_synth::composition::{compose, App};
use stack_synth::config::{AppConfig, EnvironmentConfig, NetworkConfig, StorageConfig};
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::template::Stack;

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-east-1";

/// Built-in description extended with a prod environment and a storage
/// backed `files` service in each environment
pub fn two_environment_config() -> AppConfig {
    let mut config = AppConfig::builtin().with_defaults(Some(ACCOUNT), REGION);
    let mut files = config.environments[0].services[0].clone();
    files.name = "files".to_string();
    files.source.repo = "files".to_string();
    files.storage = Some(StorageConfig { public_read: false });
    config.environments[0].services.push(files);

    let mut prod = EnvironmentConfig {
        environment: Environment::Prod,
        network: NetworkConfig {
            cidr: "10.2.0.0/20".to_string(),
            ..NetworkConfig::default()
        },
        services: config.environments[0].services.clone(),
    };
    for service in &mut prod.services {
        service.desired_count = 2;
        service.max_capacity = 4;
    }
    config.environments.push(prod);
    config
}

pub fn compose_app(config: &AppConfig) -> App {
    compose(config, &EnvironmentRegistry::builtin()).expect("composition should succeed")
}

pub fn stack<'a>(app: &'a App, name: &str) -> &'a Stack {
    app.stack(name)
        .unwrap_or_else(|| panic!("stack {name} should exist"))
}

/// Rendered template of `name`
pub fn template_json(app: &App, name: &str) -> serde_json::Value {
    serde_json::to_value(stack(app, name).synthesize()).expect("template should serialize")
}

/// Properties of every resource of one type, rendered
pub fn properties_of_type(app: &App, stack_name: &str, resource_type: &str) -> Vec<serde_json::Value> {
    template_json(app, stack_name)["Resources"]
        .as_object()
        .map(|resources| {
            resources
                .values()
                .filter(|r| r["Type"] == resource_type)
                .map(|r| r["Properties"].clone())
                .collect()
        })
        .unwrap_or_default()
}

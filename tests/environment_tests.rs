//! # Environment Isolation Tests
//!
//! Switching the environment switches every secret and config lookup, with
//! nothing from the other environment leaking in.

mod common;

use common::{compose_app, stack, template_json, two_environment_config};
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::error::SynthError;
use stack_synth::template::Expr;

fn other(environment: Environment) -> Environment {
    match environment {
        Environment::Dev => Environment::Prod,
        Environment::Prod => Environment::Dev,
    }
}

#[test]
fn test_registry_bundles_are_scoped_to_their_environment() {
    let registry = EnvironmentRegistry::builtin();
    assert!(registry.validate().is_ok());
    for environment in Environment::ALL {
        let bundle = registry.lookup(environment).unwrap();
        for (name, secret) in &bundle.secrets {
            assert!(
                secret.id().starts_with(&format!("{environment}/")),
                "{name} in {environment} points at {}",
                secret.id()
            );
        }
        assert_eq!(bundle.config["NODE_ENV"], environment.runtime_mode());
    }
}

#[test]
fn test_unknown_environment_name_is_rejected() {
    let registry = EnvironmentRegistry::builtin();
    assert!(matches!(
        registry.lookup_name("staging"),
        Err(SynthError::UnknownEnvironment(_))
    ));
    assert!(registry.lookup_name("prod").is_ok());
}

#[test]
fn test_no_cross_environment_leakage_in_services() {
    let app = compose_app(&two_environment_config());
    let registry = EnvironmentRegistry::builtin();
    for service in app.services() {
        let environment = service.environment;
        let bundle = registry.lookup(environment).unwrap();

        for (variable, secret) in &service.secrets {
            assert!(
                bundle.secrets.values().any(|s| s == secret),
                "{variable} of {} is not from the {environment} bundle",
                service.name
            );
        }

        let rendered = template_json(&app, &format!("{environment}-{}Stack", service.name)).to_string();
        assert!(rendered.contains(&format!(":secret:{environment}/")));
        assert!(
            !rendered.contains(&format!(":secret:{}/", other(environment))),
            "{environment}-{} references a secret of {}",
            service.name,
            other(environment)
        );
        let foreign = registry.lookup(other(environment)).unwrap();
        for (key, value) in &bundle.config {
            let Some(rendered_value) = service.variables.get(key) else {
                continue;
            };
            assert_eq!(rendered_value, &Expr::Str(value.clone()));
            if foreign.config[key] != *value {
                assert_ne!(rendered_value, &Expr::Str(foreign.config[key].clone()));
            }
        }
        assert_eq!(
            service.variables.get("NODE_ENV"),
            Some(&Expr::Str(environment.runtime_mode().to_string()))
        );
    }
}

#[test]
fn test_every_stack_is_tagged_with_its_environment() {
    let app = compose_app(&two_environment_config());
    for environment in Environment::ALL {
        for name in [
            format!("{environment}-Cluster"),
            format!("{environment}-apiPipelineStack"),
            format!("{environment}-apiStack"),
        ] {
            assert_eq!(
                stack(&app, &name).tags().get("environment").map(String::as_str),
                Some(environment.as_str())
            );
        }
    }
}

#[test]
fn test_docker_login_uses_the_environment_credentials() {
    let app = compose_app(&two_environment_config());
    for pipeline in app.pipelines() {
        let yaml = pipeline.docker_buildspec.to_yaml().unwrap();
        let environment = pipeline.environment;
        assert!(yaml.contains(&format!("{environment}/dockerhub/")));
        assert!(!yaml.contains(&format!("{}/dockerhub/", other(environment))));
    }
}

//! # Deferred Image Tests
//!
//! The locator is well formed before resolution and carries the tag only
//! after the parameter is substituted.

mod common;

use common::{compose_app, template_json, two_environment_config, ACCOUNT};
use stack_synth::environment::Environment;
use stack_synth::error::SynthError;
use stack_synth::image::{
    publish_tag, resolve_from_channel, ImageLocator, InMemoryParameterChannel, ParameterBindings,
};
use stack_synth::pipeline::DeployAction;

const TAG: &str = "3f9c2e1";

#[test]
fn test_locator_is_well_formed_before_resolution() {
    let app = compose_app(&two_environment_config());
    for service in app.services() {
        let locator = &service.locator;
        assert!(locator.is_well_formed(), "{locator} is malformed");
        assert_eq!(
            locator.repository_uri(),
            format!(
                "{ACCOUNT}.dkr.ecr.us-east-1.amazonaws.com/{}-{}",
                service.environment, service.name
            )
        );
        assert!(locator.to_string().ends_with(&format!("${{{}}}", locator.parameter())));
        assert!(!locator.to_string().contains(TAG));

        let reparsed = ImageLocator::parse(&locator.to_string()).unwrap();
        assert_eq!(reparsed.parameter(), locator.parameter());
    }
}

#[test]
fn test_task_definition_image_binds_to_the_parameter() {
    let app = compose_app(&two_environment_config());
    let service = app.service(Environment::Dev, "api").unwrap();
    let template = template_json(&app, "dev-apiStack");

    let parameter = service.locator.parameter().as_str();
    assert_eq!(template["Parameters"][parameter]["Type"], "String");
    assert_eq!(template["Parameters"][parameter]["Default"], "latest");

    let image = &template["Resources"][service.task_definition.as_str()]["Properties"]
        ["ContainerDefinitions"][0]["Image"];
    assert_eq!(image["Fn::Join"][1][1]["Ref"], parameter);
    assert!(!image.to_string().contains(TAG));
}

#[test]
fn test_resolved_image_carries_the_tag() {
    let app = compose_app(&two_environment_config());
    let service = app.service(Environment::Dev, "api").unwrap();

    let mut bindings = ParameterBindings::new();
    bindings.insert(service.locator.parameter().as_str().to_string(), TAG.to_string());
    let resolved = service.locator.clone().resolve(&bindings).unwrap();
    assert_eq!(resolved.tag(), TAG);
    assert_eq!(
        resolved.to_string(),
        format!("{}:{TAG}", service.locator.repository_uri())
    );
}

#[test]
fn test_unbound_locator_without_default_fails() {
    let locator = ImageLocator::parse(
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api:${apiPipelineParam}",
    )
    .unwrap();
    let err = locator.resolve(&ParameterBindings::new()).unwrap_err();
    assert!(matches!(err, SynthError::UnboundParameter(_)));
}

#[test]
fn test_malformed_locators_are_rejected() {
    for raw in [
        "dev-api",
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api:latest",
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api:${}",
    ] {
        assert!(ImageLocator::parse(raw).is_err(), "{raw} should not parse");
    }
}

#[test]
fn test_pipeline_overrides_the_parameter_the_service_binds() {
    let app = compose_app(&two_environment_config());
    for service in app.services() {
        let pipeline = app.pipeline(service.environment, &service.name).unwrap();
        assert_eq!(&pipeline.image_param, service.locator.parameter());
        let overrides = pipeline
            .stages
            .deploy
            .actions
            .iter()
            .find_map(|action| match action {
                DeployAction::CloudFormation {
                    parameter_overrides,
                    ..
                } => Some(parameter_overrides),
                DeployAction::EcsService { .. } => None,
            })
            .expect("CloudFormation deploy action");
        assert!(overrides.contains_key(pipeline.image_param.as_str()));
    }
}

#[tokio::test]
async fn test_published_tag_flows_to_the_service_image() {
    let app = compose_app(&two_environment_config());
    let service = app.service(Environment::Prod, "api").unwrap();
    let pipeline = app.pipeline(Environment::Prod, "api").unwrap();
    assert_eq!(pipeline.tag_parameter, "/prod/api/app-imagetag");

    let channel = InMemoryParameterChannel::new();
    publish_tag(&channel, &pipeline.tag_parameter, TAG).await.unwrap();
    let resolved = resolve_from_channel(service.locator.clone(), &channel, &pipeline.tag_parameter)
        .await
        .unwrap();
    assert_eq!(resolved.tag(), TAG);
    assert!(resolved.repository_uri().ends_with("/prod-api"));
}

//! # Pipeline Tests
//!
//! Stage ordering and the build-to-deploy hand-off.

mod common;

use common::{compose_app, properties_of_type, two_environment_config, ACCOUNT, REGION};
use stack_synth::buildspec::Phase;
use stack_synth::config::{AppConfig, DeployMode};
use stack_synth::environment::Environment;
use stack_synth::error::SynthError;
use stack_synth::pipeline::{validate_stage_order, DeployAction, DeployTarget, StageKind};
use stack_synth::synth::synthesize;
use std::path::Path;

const FILES_ONLY: &str = r"
environments:
  - environment: dev
    services:
      - name: files
        source:
          connectionArn: arn:aws:codestar-connections:us-east-1:123456789012:connection/x
          owner: example-org
          repo: files
";

#[test]
fn test_stage_order_is_source_build_deploy() {
    let app = compose_app(&two_environment_config());
    assert_eq!(app.pipelines().len(), 4);
    for pipeline in app.pipelines() {
        assert_eq!(
            pipeline.stage_order(),
            vec![StageKind::Source, StageKind::Build, StageKind::Deploy]
        );
        assert!(pipeline.stages.validate().is_ok());
    }
}

#[test]
fn test_rendered_pipeline_keeps_stage_order() {
    let app = compose_app(&two_environment_config());
    let pipelines = properties_of_type(&app, "dev-apiPipelineStack", "AWS::CodePipeline::Pipeline");
    assert_eq!(pipelines.len(), 1);
    let names: Vec<&str> = pipelines[0]["Stages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|stage| stage["Name"].as_str())
        .collect();
    assert_eq!(names, vec!["Source", "Build", "Deploy"]);
}

#[test]
fn test_out_of_order_stages_are_rejected() {
    for order in [
        vec![StageKind::Source, StageKind::Deploy, StageKind::Build],
        vec![StageKind::Deploy, StageKind::Build, StageKind::Source],
        vec![StageKind::Source, StageKind::Build],
        vec![],
    ] {
        assert!(
            matches!(validate_stage_order(&order), Err(SynthError::StageOrder(_))),
            "{order:?} should be rejected"
        );
    }
    assert!(validate_stage_order(&[StageKind::Source, StageKind::Build, StageKind::Deploy]).is_ok());
}

#[test]
fn test_docker_build_publishes_tag_for_its_own_service() {
    let app = compose_app(&two_environment_config());
    let api = app.pipeline(Environment::Dev, "api").unwrap();
    let files = app.pipeline(Environment::Dev, "files").unwrap();
    assert_ne!(api.tag_parameter, files.tag_parameter);
    assert!(api.docker_allows("ssm:PutParameter"));
    assert!(api.docker_allows("ecr:PutImage"));

    let yaml = api.docker_buildspec.to_yaml().unwrap();
    assert!(yaml.contains("/dev/api/app-imagetag"));
    assert!(yaml.contains("imageTag.json"));
    assert!(yaml.contains("dev/dockerhub/credentials-Xw81Zc:username"));
}

#[test]
fn test_ecs_deploy_mode_targets_the_service() {
    let mut config = two_environment_config();
    config.environments[0].services[0].deploy = DeployMode::Ecs;
    let app = compose_app(&config);
    let pipeline = app.pipeline(Environment::Dev, "api").unwrap();
    assert!(matches!(
        &pipeline.deploy_target,
        DeployTarget::EcsService { service_name, .. } if service_name == "dev-api"
    ));
    assert!(pipeline
        .docker_buildspec
        .to_yaml()
        .unwrap()
        .contains("imagedefinitions.json"));
    assert_eq!(
        pipeline.stage_order(),
        vec![StageKind::Source, StageKind::Build, StageKind::Deploy]
    );
}

#[test]
fn test_infra_build_synthesizes_the_description_it_was_composed_from() {
    let dir = tempfile::tempdir().unwrap();
    let relative = Path::new("deploy/files.yaml");
    std::fs::create_dir_all(dir.path().join("deploy")).unwrap();
    std::fs::write(dir.path().join(relative), FILES_ONLY).unwrap();

    let config = AppConfig::load(&dir.path().join(relative))
        .unwrap()
        .with_defaults(Some(ACCOUNT), REGION)
        .with_synth_source(Some(relative), None);
    let app = compose_app(&config);
    let pipeline = app.pipeline(Environment::Dev, "files").unwrap();

    let synth_command = pipeline
        .infra_buildspec
        .phase_commands(Phase::Build)
        .iter()
        .find(|c| c.contains(" synth "))
        .unwrap();
    assert!(synth_command.contains("--config deploy/files.yaml"));

    let DeployAction::CloudFormation { template_file, .. } = &pipeline.stages.deploy.actions[0]
    else {
        panic!("expected a CloudFormation deploy");
    };
    assert_eq!(template_file, "dev-filesStack.template.json");

    // What the build would produce from the checkout
    let replayed = AppConfig::load(&dir.path().join("deploy/files.yaml"))
        .unwrap()
        .with_defaults(Some(ACCOUNT), REGION);
    let synthesis = synthesize(&compose_app(&replayed), Some(Environment::Dev)).unwrap();
    let produced: Vec<String> = synthesis.stacks().iter().map(|s| s.file_name()).collect();
    assert!(produced.contains(template_file), "{produced:?}");
}

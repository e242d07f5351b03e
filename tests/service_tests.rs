//! # Service Tests
//!
//! Autoscaling bounds and the rendered service declaration.

mod common;

use common::{compose_app, template_json, two_environment_config};
use stack_synth::composition::compose;
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::error::SynthError;
use stack_synth::service::AutoscalingBounds;

#[test]
fn test_bounds_accept_desired_within_range() {
    let bounds = AutoscalingBounds::new(1, 2).unwrap();
    assert_eq!((bounds.desired(), bounds.min(), bounds.max()), (1, 1, 2));

    let bounds = AutoscalingBounds::with_min(1, 2, 5).unwrap();
    assert!(bounds.desired() <= bounds.min() && bounds.min() <= bounds.max());
}

#[test]
fn test_bounds_reject_inverted_ranges() {
    let cases = [(3, 3, 2), (2, 1, 3), (0, 0, 0), (4, 5, 4)];
    for (desired, min, max) in cases {
        assert!(
            matches!(
                AutoscalingBounds::with_min(desired, min, max),
                Err(SynthError::InvalidScalingBounds { .. })
            ),
            "desired={desired} min={min} max={max} should be rejected"
        );
    }
}

#[test]
fn test_composition_rejects_desired_above_max() {
    let mut config = two_environment_config();
    config.environments[1].services[0].desired_count = 5;
    config.environments[1].services[0].max_capacity = 4;
    let err = compose(&config, &EnvironmentRegistry::builtin()).unwrap_err();
    assert!(matches!(
        err,
        SynthError::InvalidScalingBounds { desired: 5, max: 4, .. }
    ));
}

#[test]
fn test_rendered_scaling_matches_bounds() {
    let app = compose_app(&two_environment_config());
    for service in app.services() {
        let stack_name = format!("{}-{}Stack", service.environment, service.name);
        let template = template_json(&app, &stack_name);
        let target = &template["Resources"][service.scalable_target.as_str()]["Properties"];
        let desired = &template["Resources"][service.service.as_str()]["Properties"]["DesiredCount"];

        let desired = desired.as_u64().unwrap();
        let min = target["MinCapacity"].as_u64().unwrap();
        let max = target["MaxCapacity"].as_u64().unwrap();
        assert!(desired <= min && min <= max, "{stack_name}: {desired} <= {min} <= {max}");

        let policy = &template["Resources"][service.scaling_policy.as_str()]["Properties"]
            ["TargetTrackingScalingPolicyConfiguration"];
        assert_eq!(policy["TargetValue"], 60);
        assert_eq!(policy["ScaleInCooldown"], 300);
        assert_eq!(policy["ScaleOutCooldown"], 300);
    }
}

#[test]
fn test_task_definition_defaults() {
    let app = compose_app(&two_environment_config());
    let service = app.service(Environment::Dev, "api").unwrap();
    let template = template_json(&app, "dev-apiStack");
    let task = &template["Resources"][service.task_definition.as_str()]["Properties"];
    assert_eq!(task["Cpu"], "256");
    assert_eq!(task["Memory"], "512");
    assert_eq!(task["NetworkMode"], "awsvpc");
    assert_eq!(task["ContainerDefinitions"][0]["PortMappings"][0]["ContainerPort"], 80);
    assert_eq!(service.log_stream_prefix, "app-dev/api");
}

#[test]
fn test_storage_grants_reach_the_task_role() {
    let app = compose_app(&two_environment_config());
    let files = app.service(Environment::Dev, "files").unwrap();
    assert!(files.variables.contains_key("IMAGE_BUCKET_NAME"));
    assert!(files.variables.contains_key("VIDEO_UPLOADED_QUEUE"));
    let api = app.service(Environment::Dev, "api").unwrap();
    assert!(!api.variables.contains_key("IMAGE_BUCKET_NAME"));
}

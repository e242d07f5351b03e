//! # Synthesis Tests
//!
//! Templates and manifest written to disk, in a deploy order that respects
//! every cross-stack import.

mod common;

use common::{compose_app, two_environment_config};
use stack_synth::environment::Environment;
use stack_synth::synth::{synthesize, MANIFEST_FILE};

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} missing from deploy order"))
}

#[test]
fn test_synth_writes_every_template_and_manifest() {
    let app = compose_app(&two_environment_config());
    let dir = tempfile::tempdir().unwrap();
    let written = synthesize(&app, None).unwrap().write(dir.path()).unwrap();
    assert_eq!(written.len(), app.stacks().len() + 1);

    for stack in app.stacks() {
        let path = dir.path().join(format!("{}.template.json", stack.name()));
        let template: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(template["Resources"].as_object().is_some_and(|r| !r.is_empty()));
    }

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["environments"], serde_json::json!(["dev", "prod"]));
    assert_eq!(
        manifest["stacks"]["dev-apiStack"]["dependencies"],
        serde_json::json!(["dev-Cluster", "dev-apiPipelineStack"])
    );
    assert!(manifest["generatedAt"].as_str().is_some());
}

#[test]
fn test_deploy_order_puts_exporters_first() {
    let app = compose_app(&two_environment_config());
    let synthesis = synthesize(&app, None).unwrap();
    let order = synthesis.deploy_order();
    for environment in Environment::ALL {
        let cluster = position(&order, &format!("{environment}-Cluster"));
        for service in ["api", "files"] {
            let pipeline = position(&order, &format!("{environment}-{service}PipelineStack"));
            let stack = position(&order, &format!("{environment}-{service}Stack"));
            assert!(cluster < stack);
            assert!(pipeline < stack);
        }
    }
}

#[test]
fn test_synth_single_environment() {
    let app = compose_app(&two_environment_config());
    let synthesis = synthesize(&app, Some(Environment::Prod)).unwrap();
    assert_eq!(synthesis.stacks().len(), 5);
    assert!(synthesis
        .stacks()
        .iter()
        .all(|s| s.environment.as_deref() == Some("prod")));
    assert!(synthesis.stack("dev-Cluster").is_none());
}

#[test]
fn test_templates_are_deterministic() {
    let first = synthesize(&compose_app(&two_environment_config()), None).unwrap();
    let second = synthesize(&compose_app(&two_environment_config()), None).unwrap();
    let first = first.manifest().unwrap();
    let second = second.manifest().unwrap();
    for (name, entry) in &first.stacks {
        assert_eq!(entry.md5, second.stacks[name].md5, "{name} changed between runs");
    }
}

//! # Synthesis
//!
//! Validates the stack graph and writes templates plus a manifest.
//!
//! ## Checks
//!
//! - every dependency names a stack in the app
//! - every `Fn::ImportValue` is exported by a stack the importer
//!   (transitively) depends on, so CloudFormation deploys the exporter first
//! - no `Ref`/`Fn::GetAtt` points at an undeclared logical id
//! - the dependency graph is acyclic
//!
//! ## Output
//!
//! `<stack>.template.json` per stack and a `manifest.json` listing hashes,
//! dependencies and deploy order.

use crate::composition::App;
use crate::environment::Environment;
use crate::error::{Result, SynthError};
use crate::template::{Stack, Template};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One stack ready to be written
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub name: String,
    pub environment: Option<String>,
    pub dependencies: BTreeSet<String>,
    pub template: Template,
}

impl SynthesizedStack {
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.template.json", self.name)
    }

    pub fn render(&self) -> Result<String> {
        Ok(self.template.to_json_pretty()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub template_file: String,
    pub md5: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub dependencies: BTreeSet<String>,
    pub resource_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub generated_at: String,
    pub tool_version: String,
    pub environments: BTreeSet<String>,
    pub stacks: BTreeMap<String, ManifestEntry>,
    pub deploy_order: Vec<String>,
}

/// Validated stacks in deploy order
#[derive(Debug, Clone)]
pub struct Synthesis {
    stacks: Vec<SynthesizedStack>,
}

impl Synthesis {
    /// Stacks in deploy order
    #[must_use]
    pub fn stacks(&self) -> &[SynthesizedStack] {
        &self.stacks
    }

    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&SynthesizedStack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn deploy_order(&self) -> Vec<String> {
        self.stacks.iter().map(|s| s.name.clone()).collect()
    }

    /// Build the manifest, hashing each rendered template
    pub fn manifest(&self) -> Result<Manifest> {
        let mut stacks = BTreeMap::new();
        for stack in &self.stacks {
            let rendered = stack.render()?;
            stacks.insert(
                stack.name.clone(),
                ManifestEntry {
                    template_file: stack.file_name(),
                    md5: format!("{:x}", md5::compute(rendered.as_bytes())),
                    environment: stack.environment.clone(),
                    dependencies: stack.dependencies.clone(),
                    resource_count: stack.template.resources.len(),
                },
            );
        }
        Ok(Manifest {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            environments: self
                .stacks
                .iter()
                .filter_map(|s| s.environment.clone())
                .collect(),
            stacks,
            deploy_order: self.deploy_order(),
        })
    }

    /// Write every template and the manifest into `dir`
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            let path = dir.join(stack.file_name());
            std::fs::write(&path, stack.render()?)?;
            debug!(stack = %stack.name, path = %path.display(), "Wrote template");
            written.push(path);
        }
        let manifest_path = dir.join(MANIFEST_FILE);
        std::fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&self.manifest()?)?,
        )?;
        written.push(manifest_path);
        info!(
            dir = %dir.display(),
            stacks = self.stacks.len(),
            "Synthesis complete"
        );
        Ok(written)
    }
}

/// Validate and order every stack of `app`, optionally only one environment
pub fn synthesize(app: &App, environment: Option<Environment>) -> Result<Synthesis> {
    let selected: Vec<&Stack> = app
        .stacks()
        .iter()
        .filter(|stack| match environment {
            Some(env) => stack.tags().get("environment").map(String::as_str) == Some(env.as_str()),
            None => true,
        })
        .collect();
    synthesize_stacks(&selected)
}

/// Validate and order an explicit set of stacks
pub fn synthesize_stacks(stacks: &[&Stack]) -> Result<Synthesis> {
    let by_name: BTreeMap<&str, &Stack> = stacks.iter().map(|s| (s.name(), *s)).collect();
    if by_name.len() != stacks.len() {
        let mut seen = BTreeSet::new();
        for stack in stacks {
            if !seen.insert(stack.name()) {
                return Err(SynthError::DuplicateStack(stack.name().to_string()));
            }
        }
    }

    for stack in stacks {
        for dependency in stack.dependencies() {
            if !by_name.contains_key(dependency.as_str()) {
                return Err(SynthError::UnknownDependency {
                    stack: stack.name().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let order = deploy_order(&by_name)?;

    let mut synthesized: BTreeMap<&str, SynthesizedStack> = BTreeMap::new();
    for stack in stacks {
        let template = stack.synthesize();
        let dangling = template.dangling_references();
        if let Some(id) = dangling.into_iter().next() {
            return Err(SynthError::InvalidConfig(format!(
                "stack '{}' references undeclared logical id '{id}'",
                stack.name()
            )));
        }
        synthesized.insert(
            stack.name(),
            SynthesizedStack {
                name: stack.name().to_string(),
                environment: stack.tags().get("environment").cloned(),
                dependencies: stack.dependencies().clone(),
                template,
            },
        );
    }

    for stack in stacks {
        let ancestors = transitive_dependencies(stack.name(), &by_name);
        let available: BTreeSet<String> = ancestors
            .iter()
            .filter_map(|name| synthesized.get(name.as_str()))
            .flat_map(|s| s.template.exports())
            .collect();
        let Some(this) = synthesized.get(stack.name()) else {
            continue;
        };
        for import in this.template.imports() {
            if !available.contains(&import) {
                return Err(SynthError::DanglingImport {
                    stack: stack.name().to_string(),
                    export: import,
                });
            }
        }
    }

    let stacks = order
        .iter()
        .filter_map(|name| synthesized.remove(name.as_str()))
        .collect();
    Ok(Synthesis { stacks })
}

/// Every stack `name` depends on, directly or not
fn transitive_dependencies(name: &str, by_name: &BTreeMap<&str, &Stack>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&str> = vec![name];
    while let Some(current) = pending.pop() {
        let Some(stack) = by_name.get(current) else {
            continue;
        };
        for dependency in stack.dependencies() {
            if seen.insert(dependency.clone()) {
                pending.push(dependency.as_str());
            }
        }
    }
    seen
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependencies first; ties broken by stack name
fn deploy_order(by_name: &BTreeMap<&str, &Stack>) -> Result<Vec<String>> {
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut order = Vec::with_capacity(by_name.len());
    for name in by_name.keys() {
        let mut path = Vec::new();
        visit(*name, by_name, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    name: &'a str,
    by_name: &BTreeMap<&'a str, &'a Stack>,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<&str> = path.get(start..).map(<[&str]>::to_vec).unwrap_or_default();
            cycle.push(name);
            return Err(SynthError::DependencyCycle(cycle.join(" -> ")));
        }
        None => {}
    }
    let Some(&stack) = by_name.get(name) else {
        return Ok(());
    };
    marks.insert(name, Mark::Visiting);
    path.push(name);
    for dependency in stack.dependencies() {
        if let Some((key, _)) = by_name.get_key_value(dependency.as_str()) {
            visit(*key, by_name, marks, path, order)?;
        }
    }
    path.pop();
    marks.insert(name, Mark::Done);
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Expr, LogicalId, Resource, StackEnv};

    fn env() -> StackEnv {
        StackEnv::new("123456789012", "us-east-1")
    }

    fn stack_with_topic(name: &str) -> Stack {
        let mut stack = Stack::new(name, env());
        stack
            .add(&["Topic"], Resource::new("AWS::SNS::Topic"))
            .unwrap();
        stack
    }

    #[test]
    fn orders_dependencies_first() {
        let mut a = stack_with_topic("a");
        a.add_dependency("c");
        let mut b = stack_with_topic("b");
        b.add_dependency("a");
        let c = stack_with_topic("c");
        let synthesis = synthesize_stacks(&[&a, &b, &c]).unwrap();
        assert_eq!(synthesis.deploy_order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn cycle_is_reported_with_path() {
        let mut a = stack_with_topic("a");
        a.add_dependency("b");
        let mut b = stack_with_topic("b");
        b.add_dependency("a");
        let err = synthesize_stacks(&[&a, &b]).unwrap_err();
        match err {
            SynthError::DependencyCycle(path) => assert_eq!(path, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut a = stack_with_topic("a");
        a.add_dependency("ghost");
        assert!(matches!(
            synthesize_stacks(&[&a]),
            Err(SynthError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn import_requires_dependency_on_exporter() {
        let mut producer = stack_with_topic("producer");
        let topic = LogicalId::new("Topic").unwrap();
        let import = producer.export("TopicArn", Expr::reference(&topic)).unwrap();

        let mut consumer = Stack::new("consumer", env());
        consumer
            .add(
                &["Sub"],
                Resource::new("AWS::SNS::Subscription")
                    .property("TopicArn", import)
                    .property("Protocol", "sqs"),
            )
            .unwrap();

        let err = synthesize_stacks(&[&producer, &consumer]).unwrap_err();
        assert!(matches!(err, SynthError::DanglingImport { ref export, .. } if export == "producer:TopicArn"));

        consumer.add_dependency("producer");
        let synthesis = synthesize_stacks(&[&producer, &consumer]).unwrap();
        assert_eq!(synthesis.deploy_order(), vec!["producer", "consumer"]);
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut stack = Stack::new("a", env());
        let missing = LogicalId::new("Missing").unwrap();
        stack
            .add(
                &["Sub"],
                Resource::new("AWS::SNS::Subscription").property("TopicArn", Expr::reference(&missing)),
            )
            .unwrap();
        assert!(matches!(
            synthesize_stacks(&[&stack]),
            Err(SynthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn write_emits_templates_and_manifest() {
        let mut a = stack_with_topic("a");
        a.tag("environment", "dev");
        let dir = tempfile::tempdir().unwrap();
        let written = synthesize_stacks(&[&a]).unwrap().write(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest["deployOrder"][0], "a");
        assert_eq!(manifest["stacks"]["a"]["templateFile"], "a.template.json");
        assert_eq!(manifest["stacks"]["a"]["md5"].as_str().map(str::len), Some(32));
        assert_eq!(manifest["environments"][0], "dev");
    }
}

//! # Stacks
//!
//! A named, independently deployable template plus the metadata the
//! synthesizer needs: target account/region, tags and dependencies on
//! other stacks.

use super::{Expr, LogicalId, Output, Parameter, Resource, Template};
use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Resource types that accept a `Tags` list of `{Key, Value}` pairs
const TAGGABLE_TYPES: &[&str] = &[
    "AWS::CloudFront::Distribution",
    "AWS::CodeBuild::Project",
    "AWS::CodePipeline::Pipeline",
    "AWS::EC2::EIP",
    "AWS::EC2::InternetGateway",
    "AWS::EC2::NatGateway",
    "AWS::EC2::RouteTable",
    "AWS::EC2::SecurityGroup",
    "AWS::EC2::Subnet",
    "AWS::EC2::VPC",
    "AWS::ECR::Repository",
    "AWS::ECS::Cluster",
    "AWS::ECS::Service",
    "AWS::ECS::TaskDefinition",
    "AWS::ElasticLoadBalancingV2::LoadBalancer",
    "AWS::ElasticLoadBalancingV2::TargetGroup",
    "AWS::IAM::Role",
    "AWS::Logs::LogGroup",
    "AWS::S3::Bucket",
    "AWS::SQS::Queue",
    "AWS::ServiceDiscovery::PrivateDnsNamespace",
    "AWS::ServiceDiscovery::Service",
];

/// Account and region a stack deploys into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEnv {
    pub account: String,
    pub region: String,
}

impl StackEnv {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// `aws://<account>/<region>`, the form deployment manifests use
    #[must_use]
    pub fn uri(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: StackEnv,
    tags: BTreeMap<String, String>,
    template: Template,
    dependencies: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: StackEnv) -> Self {
        Self {
            name: name.into(),
            env,
            tags: BTreeMap::new(),
            template: Template::new(),
            dependencies: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn env(&self) -> &StackEnv {
        &self.env
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Unsynthesized template (stack tags not yet applied)
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.template.description = Some(description.into());
    }

    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Record that this stack must deploy after `stack`
    pub fn add_dependency(&mut self, stack: &str) {
        if stack != self.name {
            self.dependencies.insert(stack.to_string());
        }
    }

    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<LogicalId> {
        if self.template.resources.contains_key(&id) || self.template.parameters.contains_key(&id)
        {
            return Err(self.duplicate(&id));
        }
        debug!(stack = %self.name, logical_id = %id, resource_type = %resource.resource_type, "Adding resource");
        self.template.resources.insert(id.clone(), resource);
        Ok(id)
    }

    /// Add a resource under a construct path (see [`LogicalId::from_path`])
    pub fn add(&mut self, path: &[&str], resource: Resource) -> Result<LogicalId> {
        let id = LogicalId::from_path(path)?;
        self.add_resource(id, resource)
    }

    pub fn add_parameter(&mut self, id: LogicalId, parameter: Parameter) -> Result<LogicalId> {
        if self.template.resources.contains_key(&id) || self.template.parameters.contains_key(&id)
        {
            return Err(self.duplicate(&id));
        }
        self.template.parameters.insert(id.clone(), parameter);
        Ok(id)
    }

    pub fn add_output(&mut self, id: LogicalId, output: Output) -> Result<LogicalId> {
        if self.template.outputs.contains_key(&id) {
            return Err(self.duplicate(&id));
        }
        self.template.outputs.insert(id.clone(), output);
        Ok(id)
    }

    /// Export a value for other stacks and return the expression they use
    /// to import it
    ///
    /// Exporting the same id twice returns the existing import.
    pub fn export(&mut self, id: &str, value: Expr) -> Result<Expr> {
        let export_name = self.export_name(id);
        let output_id = LogicalId::from_path(&["Export", id])?;
        if let Some(existing) = self.template.outputs.get(&output_id) {
            if existing.value != value {
                return Err(self.duplicate(&output_id));
            }
            return Ok(Expr::import(export_name));
        }
        self.add_output(output_id, Output::new(value).exported_as(export_name.clone()))?;
        Ok(Expr::import(export_name))
    }

    /// Name under which `id` is (or would be) exported
    #[must_use]
    pub fn export_name(&self, id: &str) -> String {
        format!("{}:{id}", self.name)
    }

    #[must_use]
    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.template.resources.get(id)
    }

    /// Resources of one CloudFormation type, in logical id order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.template
            .resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Final template with stack tags applied to every taggable resource
    ///
    /// Tags already set on a resource win over stack tags with the same key.
    #[must_use]
    pub fn synthesize(&self) -> Template {
        let mut template = self.template.clone();
        if self.tags.is_empty() {
            return template;
        }
        for resource in template.resources.values_mut() {
            if !TAGGABLE_TYPES.contains(&resource.resource_type.as_str()) {
                continue;
            }
            let mut tags = match resource.properties.remove("Tags") {
                Some(Expr::List(existing)) => existing,
                _ => Vec::new(),
            };
            for (key, value) in &self.tags {
                let present = tags
                    .iter()
                    .any(|t| t.get("Key").and_then(Expr::as_str) == Some(key.as_str()));
                if !present {
                    tags.push(Expr::object([
                        ("Key", Expr::str(key)),
                        ("Value", Expr::str(value)),
                    ]));
                }
            }
            tags.sort_by(|a, b| {
                let key = |e: &Expr| e.get("Key").and_then(Expr::as_str).map(str::to_string);
                key(a).cmp(&key(b))
            });
            resource.properties.insert("Tags".to_string(), Expr::List(tags));
        }
        template
    }

    fn duplicate(&self, id: &LogicalId) -> SynthError {
        SynthError::DuplicateResource {
            stack: self.name.clone(),
            logical_id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> Stack {
        Stack::new("dev-Cluster", StackEnv::new("123456789012", "us-east-1"))
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let mut stack = stack();
        stack
            .add(&["Vpc"], Resource::new("AWS::EC2::VPC"))
            .unwrap();
        let err = stack
            .add(&["Vpc"], Resource::new("AWS::EC2::VPC"))
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateResource { .. }));
    }

    #[test]
    fn export_is_idempotent_and_named_after_stack() {
        let mut stack = stack();
        let vpc = stack
            .add(&["Vpc"], Resource::new("AWS::EC2::VPC"))
            .unwrap();
        let first = stack.export("VpcId", Expr::reference(&vpc)).unwrap();
        let second = stack.export("VpcId", Expr::reference(&vpc)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Expr::import("dev-Cluster:VpcId"));
        assert_eq!(stack.template().outputs.len(), 1);
        assert!(stack.template().exports().contains("dev-Cluster:VpcId"));
    }

    #[test]
    fn tags_apply_only_to_taggable_resources() {
        let mut stack = stack();
        stack.tag("environment", "dev");
        stack
            .add(&["Vpc"], Resource::new("AWS::EC2::VPC"))
            .unwrap();
        stack
            .add(&["Listener"], Resource::new("AWS::ElasticLoadBalancingV2::Listener"))
            .unwrap();
        let template = stack.synthesize();
        let vpc = &template.resources[&LogicalId::new("Vpc").unwrap()];
        assert_eq!(
            vpc.get("Tags").unwrap().to_json(),
            serde_json::json!([{ "Key": "environment", "Value": "dev" }])
        );
        let listener = &template.resources[&LogicalId::new("Listener").unwrap()];
        assert!(listener.get("Tags").is_none());
    }

    #[test]
    fn stack_does_not_depend_on_itself() {
        let mut stack = stack();
        stack.add_dependency("dev-Cluster");
        assert!(stack.dependencies().is_empty());
    }
}

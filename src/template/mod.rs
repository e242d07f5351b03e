//! # CloudFormation Model
//!
//! Typed CloudFormation templates and the stacks that own them.
//!
//! Every descriptor builder in this crate writes into a [`Stack`]; the
//! synthesizer turns stacks into template files.

mod expr;
mod logical_id;
mod resource;
mod stack;

pub use expr::Expr;
pub use logical_id::LogicalId;
pub use resource::{DeletionPolicy, Export, Output, Parameter, Resource};
pub use stack::{Stack, StackEnv};

use crate::constants::TEMPLATE_FORMAT_VERSION;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A CloudFormation template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<LogicalId, Parameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    #[must_use]
    pub fn new() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Every expression in the template, for reference analysis
    fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.resources
            .values()
            .flat_map(|r| r.properties.values())
            .chain(self.outputs.values().map(|o| &o.value))
    }

    /// Export names this template imports
    #[must_use]
    pub fn imports(&self) -> BTreeSet<String> {
        let mut imports = BTreeSet::new();
        for expr in self.expressions() {
            expr.collect_imports(&mut imports);
        }
        imports
    }

    /// Export names this template declares
    #[must_use]
    pub fn exports(&self) -> BTreeSet<String> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.clone()))
            .collect()
    }

    /// Logical ids referenced but declared neither as resource nor parameter
    #[must_use]
    pub fn dangling_references(&self) -> BTreeSet<String> {
        let mut referenced = BTreeSet::new();
        for expr in self.expressions() {
            expr.collect_references(&mut referenced);
        }
        for resource in self.resources.values() {
            referenced.extend(resource.depends_on.iter().map(|id| id.as_str().to_string()));
        }
        referenced
            .into_iter()
            .filter(|id| {
                !self.resources.keys().any(|k| k.as_str() == id)
                    && !self.parameters.keys().any(|k| k.as_str() == id)
            })
            .collect()
    }

    /// Render as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

//! # Template Entries
//!
//! Resources, parameters and outputs as they appear in a template.

use super::{Expr, LogicalId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What CloudFormation does with the physical resource on delete/replace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// A resource declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Expr>,
    #[serde(rename = "DependsOn", skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<LogicalId>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    #[must_use]
    pub fn property(mut self, key: &str, value: impl Into<Expr>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Set a property only when a value is present
    #[must_use]
    pub fn optional_property(self, key: &str, value: Option<impl Into<Expr>>) -> Self {
        match value {
            Some(value) => self.property(key, value),
            None => self,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        self.depends_on.insert(id.clone());
        self
    }

    /// Apply the same policy on delete and on replacement
    #[must_use]
    pub fn removal_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.properties.get(key)
    }
}

/// A template parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn string(default: Option<impl Into<String>>) -> Self {
        Self {
            parameter_type: "String".to_string(),
            default: default.map(Into::into),
            description: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: String,
}

/// A template output, optionally exported for other stacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Value")]
    pub value: Expr,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Export", skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    #[must_use]
    pub fn new(value: Expr) -> Self {
        Self {
            value,
            description: None,
            export: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn exported_as(mut self, name: impl Into<String>) -> Self {
        self.export = Some(Export { name: name.into() });
        self
    }
}

//! # Template Expressions
//!
//! Values that appear inside CloudFormation resource properties: literals,
//! nested objects and the intrinsic functions the descriptors rely on.

use super::LogicalId;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A CloudFormation value
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Expr>),
    Map(BTreeMap<String, Expr>),
    /// `{"Ref": id}` - resource, parameter or pseudo parameter
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::Sub": template}`
    Sub(String),
    /// `{"Fn::Join": [separator, parts]}`
    Join(String, Vec<Expr>),
    /// `{"Fn::Select": [index, list]}`
    Select(u32, Box<Expr>),
    /// `{"Fn::GetAZs": ""}` - zones of the deploying region
    GetAzs,
    /// `{"Fn::ImportValue": export}`
    ImportValue(String),
    /// `{"Fn::GetParam": [artifact, file, key]}` - only valid inside
    /// CodePipeline CloudFormation action parameter overrides
    GetParam {
        artifact: String,
        file: String,
        key: String,
    },
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    #[must_use]
    pub fn reference(id: &LogicalId) -> Self {
        Expr::Ref(id.as_str().to_string())
    }

    /// Reference to a pseudo parameter such as `AWS::Region`
    pub fn pseudo(name: &str) -> Self {
        Expr::Ref(format!("AWS::{name}"))
    }

    pub fn get_att(id: &LogicalId, attribute: impl Into<String>) -> Self {
        Expr::GetAtt(id.as_str().to_string(), attribute.into())
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Expr::Sub(template.into())
    }

    pub fn join(separator: impl Into<String>, parts: Vec<Expr>) -> Self {
        Expr::Join(separator.into(), parts)
    }

    pub fn import(export_name: impl Into<String>) -> Self {
        Expr::ImportValue(export_name.into())
    }

    #[must_use]
    pub fn select_az(index: u32) -> Self {
        Expr::Select(index, Box::new(Expr::GetAzs))
    }

    /// Object from key/value pairs
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        Expr::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        Expr::List(items.into_iter().collect())
    }

    /// Field of a `Map` expression
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Expr> {
        match self {
            Expr::Map(map) => map.get(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render to CloudFormation JSON
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Expr::Str(s) => Value::String(s.clone()),
            Expr::Int(n) => json!(n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::List(items) => Value::Array(items.iter().map(Expr::to_json).collect()),
            Expr::Map(map) => {
                let mut object = Map::new();
                for (k, v) in map {
                    object.insert(k.clone(), v.to_json());
                }
                Value::Object(object)
            }
            Expr::Ref(id) => json!({ "Ref": id }),
            Expr::GetAtt(id, attribute) => json!({ "Fn::GetAtt": [id, attribute] }),
            Expr::Sub(template) => json!({ "Fn::Sub": template }),
            Expr::Join(separator, parts) => json!({
                "Fn::Join": [separator, parts.iter().map(Expr::to_json).collect::<Vec<_>>()]
            }),
            Expr::Select(index, list) => json!({ "Fn::Select": [index, list.to_json()] }),
            Expr::GetAzs => json!({ "Fn::GetAZs": "" }),
            Expr::ImportValue(name) => json!({ "Fn::ImportValue": name }),
            Expr::GetParam {
                artifact,
                file,
                key,
            } => json!({ "Fn::GetParam": [artifact, file, key] }),
        }
    }

    /// Export names consumed through `Fn::ImportValue`
    pub fn collect_imports(&self, out: &mut BTreeSet<String>) {
        self.walk(&mut |expr| {
            if let Expr::ImportValue(name) = expr {
                out.insert(name.clone());
            }
        });
    }

    /// Logical ids referenced through `Ref`, `Fn::GetAtt` and `Fn::Sub`
    /// placeholders; pseudo parameters are excluded
    pub fn collect_references(&self, out: &mut BTreeSet<String>) {
        self.walk(&mut |expr| match expr {
            Expr::Ref(id) | Expr::GetAtt(id, _) if !id.starts_with("AWS::") => {
                out.insert(id.clone());
            }
            Expr::Sub(template) => {
                for id in sub_placeholders(template) {
                    if !id.starts_with("AWS::") {
                        out.insert(id.to_string());
                    }
                }
            }
            _ => {}
        });
    }

    fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::List(items) | Expr::Join(_, items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Map(map) => {
                for value in map.values() {
                    value.walk(visit);
                }
            }
            Expr::Select(_, list) => list.walk(visit),
            _ => {}
        }
    }
}

// `${Name}` or `${Name.Attribute}`; `${!Literal}` is an escape
fn sub_placeholders(template: &str) -> impl Iterator<Item = &str> {
    template.split("${").skip(1).filter_map(|rest| {
        if rest.starts_with('!') {
            return None;
        }
        let name = &rest[..rest.find('}')?];
        Some(name.split_once('.').map_or(name, |(head, _)| head))
    })
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Str(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Str(value)
    }
}

impl From<&String> for Expr {
    fn from(value: &String) -> Self {
        Expr::Str(value.clone())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::Int(i64::from(value))
    }
}

impl From<u16> for Expr {
    fn from(value: u16) -> Self {
        Expr::Int(i64::from(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

impl From<Vec<Expr>> for Expr {
    fn from(value: Vec<Expr>) -> Self {
        Expr::List(value)
    }
}

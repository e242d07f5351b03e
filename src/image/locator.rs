//! # Image Locators
//!
//! Unresolved and resolved forms of a container image reference.

use crate::error::{Result, SynthError};
use crate::template::{Expr, LogicalId};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static LOCATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]*(:[0-9]+)?/[a-z0-9]+([._/-][a-z0-9]+)*:\$\{[A-Za-z0-9]+\}$")
        .expect("Failed to compile LOCATOR_REGEX - this should never happen")
});

/// Values supplied for template parameters at deploy time
pub type ParameterBindings = BTreeMap<String, String>;

/// `<repository uri>:${<parameter>}`; the tag is not known yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocator {
    repository_uri: String,
    parameter: LogicalId,
    default: Option<String>,
}

impl ImageLocator {
    pub fn new(repository_uri: impl Into<String>, parameter: LogicalId, default: Option<String>) -> Self {
        Self {
            repository_uri: repository_uri.into(),
            parameter,
            default,
        }
    }

    /// Parse the `Display` form back into a locator (without a default)
    pub fn parse(locator: &str) -> Result<Self> {
        let malformed = || SynthError::MalformedLocator(locator.to_string());
        let (uri, placeholder) = locator.rsplit_once(':').ok_or_else(malformed)?;
        let name = placeholder
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(malformed)?;
        let parsed = Self::new(uri, LogicalId::new(name).map_err(|_e| malformed())?, None);
        if !parsed.is_well_formed() {
            return Err(malformed());
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn repository_uri(&self) -> &str {
        &self.repository_uri
    }

    #[must_use]
    pub fn parameter(&self) -> &LogicalId {
        &self.parameter
    }

    /// Registry host, repository path and a `${Param}` placeholder
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        LOCATOR_REGEX.is_match(&self.to_string())
    }

    /// Template value a task definition's `Image` property binds to
    #[must_use]
    pub fn to_expr(&self) -> Expr {
        Expr::join(
            "",
            vec![
                Expr::str(format!("{}:", self.repository_uri)),
                Expr::reference(&self.parameter),
            ],
        )
    }

    /// Substitute the parameter, consuming the locator
    ///
    /// An explicit binding wins over the parameter default.
    pub fn resolve(self, bindings: &ParameterBindings) -> Result<ResolvedImage> {
        let tag = bindings
            .get(self.parameter.as_str())
            .cloned()
            .or(self.default)
            .ok_or_else(|| SynthError::UnboundParameter(self.parameter.to_string()))?;
        if tag.trim().is_empty() {
            return Err(SynthError::UnboundParameter(self.parameter.to_string()));
        }
        Ok(ResolvedImage {
            repository_uri: self.repository_uri,
            tag,
        })
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:${{{}}}", self.repository_uri, self.parameter)
    }
}

/// Concrete image reference produced by [`ImageLocator::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    repository_uri: String,
    tag: String,
}

impl ResolvedImage {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn repository_uri(&self) -> &str {
        &self.repository_uri
    }
}

impl fmt::Display for ResolvedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_uri, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api";

    fn locator(default: Option<&str>) -> ImageLocator {
        ImageLocator::new(
            URI,
            LogicalId::new("apiPipelineParamAB12CD34").unwrap(),
            default.map(str::to_string),
        )
    }

    #[test]
    fn unresolved_locator_is_well_formed_placeholder() {
        let locator = locator(Some("latest"));
        assert!(locator.is_well_formed());
        assert_eq!(locator.to_string(), format!("{URI}:${{apiPipelineParamAB12CD34}}"));
        assert!(!locator.to_string().contains("latest"));
    }

    #[test]
    fn binding_overrides_default() {
        let mut bindings = ParameterBindings::new();
        bindings.insert("apiPipelineParamAB12CD34".to_string(), "3f2a9c1".to_string());
        let resolved = locator(Some("latest")).resolve(&bindings).unwrap();
        assert_eq!(resolved.to_string(), format!("{URI}:3f2a9c1"));
    }

    #[test]
    fn default_used_without_binding() {
        let resolved = locator(Some("latest")).resolve(&ParameterBindings::new()).unwrap();
        assert_eq!(resolved.tag(), "latest");
    }

    #[test]
    fn missing_binding_and_default_fails() {
        let err = locator(None).resolve(&ParameterBindings::new()).unwrap_err();
        assert!(matches!(err, SynthError::UnboundParameter(p) if p == "apiPipelineParamAB12CD34"));
    }

    #[test]
    fn to_expr_joins_uri_and_parameter_ref() {
        assert_eq!(
            locator(None).to_expr().to_json(),
            serde_json::json!({
                "Fn::Join": ["", [format!("{URI}:"), { "Ref": "apiPipelineParamAB12CD34" }]]
            })
        );
    }

    #[test]
    fn parse_round_trips_display_form() {
        let original = locator(None);
        let parsed = ImageLocator::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
        assert!(ImageLocator::parse("not a locator").is_err());
        assert!(ImageLocator::parse(&format!("{URI}:latest")).is_err());
    }
}

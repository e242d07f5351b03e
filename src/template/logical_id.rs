//! # Logical Ids
//!
//! CloudFormation logical ids, derived from construct paths.

use crate::error::{Result, SynthError};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static LOGICAL_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{1,255}$")
        .expect("Failed to compile LOGICAL_ID_REGEX - this should never happen")
});

const MAX_LOGICAL_ID_LEN: usize = 255;
const HASH_LEN: usize = 8;

/// Validated CloudFormation logical id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Accept an id as-is after validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !LOGICAL_ID_REGEX.is_match(&id) {
            return Err(SynthError::InvalidLogicalId(id));
        }
        Ok(Self(id))
    }

    /// Derive an id from a construct path
    ///
    /// A single component is used verbatim (minus non-alphanumerics). Deeper
    /// paths concatenate their components and append the first 8 hex digits
    /// of the md5 of the `/`-joined path, so sibling constructs with the same
    /// local name never collide.
    pub fn from_path(path: &[&str]) -> Result<Self> {
        let human: String = path
            .iter()
            .flat_map(|component| component.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect();

        if path.len() == 1 {
            return Self::new(human);
        }

        let digest = format!("{:x}", md5::compute(path.join("/").as_bytes()));
        let hash = digest[..HASH_LEN].to_ascii_uppercase();
        let keep = human.len().min(MAX_LOGICAL_ID_LEN - HASH_LEN);
        Self::new(format!("{}{hash}", &human[..keep]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

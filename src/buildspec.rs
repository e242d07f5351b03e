//! # Build Specifications
//!
//! CodeBuild buildspec (version 0.2) documents, rendered to YAML and
//! embedded in the project's `Source.BuildSpec`.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Build phases in the order CodeBuild runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Install,
    PreBuild,
    Build,
    PostBuild,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseCommands {
    #[serde(rename = "runtime-versions", skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime_versions: BTreeMap<String, String>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Phases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<PhaseCommands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<PhaseCommands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<PhaseCommands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_build: Option<PhaseCommands>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildEnv {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Variable name to `<secret-id>:<json-key>`
    #[serde(rename = "secrets-manager", skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets_manager: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Artifacts {
    pub files: Vec<String>,
    #[serde(rename = "base-directory", skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSpec {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BuildEnv>,
    pub phases: Phases,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSpec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: "0.2".to_string(),
            env: None,
            phases: Phases::default(),
            artifacts: None,
        }
    }

    #[must_use]
    pub fn variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BuildEnv::default)
            .variables
            .insert(name.to_string(), value.into());
        self
    }

    /// Expose a JSON key of a Secrets Manager secret as `name`
    #[must_use]
    pub fn secret(mut self, name: &str, secret_id: &str, json_key: &str) -> Self {
        self.env
            .get_or_insert_with(BuildEnv::default)
            .secrets_manager
            .insert(name.to_string(), format!("{secret_id}:{json_key}"));
        self
    }

    #[must_use]
    pub fn runtime(mut self, runtime: &str, version: &str) -> Self {
        self.phase_mut(Phase::Install)
            .runtime_versions
            .insert(runtime.to_string(), version.to_string());
        self
    }

    /// Append commands to a phase
    #[must_use]
    pub fn commands<I, S>(mut self, phase: Phase, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phase_mut(phase)
            .commands
            .extend(commands.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn artifact_files<I, S>(mut self, files: I, base_directory: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts = Some(Artifacts {
            files: files.into_iter().map(Into::into).collect(),
            base_directory: base_directory.map(str::to_string),
        });
        self
    }

    /// Commands of one phase, empty when the phase is absent
    #[must_use]
    pub fn phase_commands(&self, phase: Phase) -> &[String] {
        let slot = match phase {
            Phase::Install => &self.phases.install,
            Phase::PreBuild => &self.phases.pre_build,
            Phase::Build => &self.phases.build,
            Phase::PostBuild => &self.phases.post_build,
        };
        slot.as_ref().map_or(&[], |p| p.commands.as_slice())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut PhaseCommands {
        let slot = match phase {
            Phase::Install => &mut self.phases.install,
            Phase::PreBuild => &mut self.phases.pre_build,
            Phase::Build => &mut self.phases.build,
            Phase::PostBuild => &mut self.phases.post_build,
        };
        slot.get_or_insert_with(PhaseCommands::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_phases_in_execution_order() {
        let yaml = BuildSpec::new()
            .commands(Phase::PostBuild, ["docker push repo"])
            .commands(Phase::Build, ["docker build ."])
            .commands(Phase::PreBuild, ["docker login"])
            .runtime("nodejs", "16")
            .to_yaml()
            .unwrap();
        let install = yaml.find("install:").unwrap();
        let pre = yaml.find("pre_build:").unwrap();
        let build = yaml.find("\n  build:").unwrap();
        let post = yaml.find("post_build:").unwrap();
        assert!(install < pre && pre < build && build < post, "{yaml}");
    }

    #[test]
    fn secrets_render_under_secrets_manager() {
        let spec = BuildSpec::new().secret("DOCKERHUB_USERNAME", "dev/dockerhub", "username");
        let value: serde_yaml::Value = serde_yaml::from_str(&spec.to_yaml().unwrap()).unwrap();
        assert_eq!(
            value["env"]["secrets-manager"]["DOCKERHUB_USERNAME"].as_str(),
            Some("dev/dockerhub:username")
        );
        assert_eq!(value["version"].as_str(), Some("0.2"));
    }

    #[test]
    fn absent_phase_has_no_commands() {
        let spec = BuildSpec::new().commands(Phase::Build, ["make"]);
        assert!(spec.phase_commands(Phase::Install).is_empty());
        assert_eq!(spec.phase_commands(Phase::Build), ["make".to_string()]);
    }
}

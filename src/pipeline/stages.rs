//! # Pipeline Stages
//!
//! Typed Source, Build and Deploy stages. The pipeline holds exactly one of
//! each in a fixed struct, so Deploy can never be declared ahead of Build.

use crate::error::{Result, SynthError};
use crate::template::{Expr, LogicalId};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Source,
    Build,
    Deploy,
}

impl StageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Source => "Source",
            StageKind::Build => "Build",
            StageKind::Deploy => "Deploy",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that stages run Source, then Build, then Deploy, each exactly once
pub fn validate_stage_order(stages: &[StageKind]) -> Result<()> {
    let expected = [StageKind::Source, StageKind::Build, StageKind::Deploy];
    if stages == expected {
        return Ok(());
    }
    let rendered: Vec<&str> = stages.iter().map(StageKind::as_str).collect();
    Err(SynthError::StageOrder(format!(
        "expected Source -> Build -> Deploy, got {}",
        if rendered.is_empty() {
            "no stages".to_string()
        } else {
            rendered.join(" -> ")
        }
    )))
}

/// Checkout of one repository branch through a CodeStar connection
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAction {
    pub name: String,
    pub connection_arn: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub output: String,
}

/// A CodeBuild project run
#[derive(Debug, Clone, PartialEq)]
pub struct BuildAction {
    pub name: String,
    pub project: LogicalId,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployAction {
    /// Create or update a stack from a synthesized template
    CloudFormation {
        name: String,
        stack_name: String,
        template_artifact: String,
        template_file: String,
        /// Parameter name to override value, usually `Fn::GetParam`
        parameter_overrides: BTreeMap<String, Expr>,
        extra_inputs: Vec<String>,
        deployment_role: Expr,
    },
    /// Roll an ECS service onto the image in `imagedefinitions.json`
    EcsService {
        name: String,
        cluster_name: Expr,
        service_name: String,
        input: String,
        file_name: String,
    },
}

impl DeployAction {
    fn inputs(&self) -> Vec<&str> {
        match self {
            DeployAction::CloudFormation {
                template_artifact,
                extra_inputs,
                ..
            } => std::iter::once(template_artifact.as_str())
                .chain(extra_inputs.iter().map(String::as_str))
                .collect(),
            DeployAction::EcsService { input, .. } => vec![input.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceStage {
    pub actions: Vec<SourceAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildStage {
    pub actions: Vec<BuildAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployStage {
    pub actions: Vec<DeployAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStages {
    pub source: SourceStage,
    pub build: BuildStage,
    pub deploy: DeployStage,
}

impl PipelineStages {
    /// Stage kinds in declaration order
    #[must_use]
    pub fn order(&self) -> Vec<StageKind> {
        vec![StageKind::Source, StageKind::Build, StageKind::Deploy]
    }

    /// Every stage has an action and every input artifact comes from an
    /// earlier stage
    pub fn validate(&self) -> Result<()> {
        validate_stage_order(&self.order())?;
        if self.source.actions.is_empty()
            || self.build.actions.is_empty()
            || self.deploy.actions.is_empty()
        {
            return Err(SynthError::StageOrder(
                "every stage needs at least one action".to_string(),
            ));
        }

        let mut available: BTreeSet<&str> =
            self.source.actions.iter().map(|a| a.output.as_str()).collect();
        for action in &self.build.actions {
            require_artifact(&available, &action.input, StageKind::Build, &action.name)?;
        }
        available.extend(self.build.actions.iter().map(|a| a.output.as_str()));
        for action in &self.deploy.actions {
            let name = match action {
                DeployAction::CloudFormation { name, .. } | DeployAction::EcsService { name, .. } => {
                    name
                }
            };
            for input in action.inputs() {
                require_artifact(&available, input, StageKind::Deploy, name)?;
            }
        }
        Ok(())
    }

    /// `Stages` property of an `AWS::CodePipeline::Pipeline`
    pub fn to_expr(&self) -> Result<Expr> {
        let source = self.source.actions.iter().map(|a| {
            action(
                &a.name,
                ("Source", "CodeStarSourceConnection"),
                vec![
                    ("ConnectionArn", Expr::str(&a.connection_arn)),
                    ("FullRepositoryId", Expr::str(format!("{}/{}", a.owner, a.repo))),
                    ("BranchName", Expr::str(&a.branch)),
                    ("DetectChanges", Expr::Bool(true)),
                ],
                &[],
                Some(a.output.as_str()),
            )
        });
        let build = self.build.actions.iter().map(|a| {
            action(
                &a.name,
                ("Build", "CodeBuild"),
                vec![("ProjectName", Expr::reference(&a.project))],
                &[a.input.as_str()],
                Some(a.output.as_str()),
            )
        });
        let deploy = self
            .deploy
            .actions
            .iter()
            .map(deploy_action)
            .collect::<Result<Vec<_>>>()?;

        Ok(Expr::list([
            stage(StageKind::Source, source.collect()),
            stage(StageKind::Build, build.collect()),
            stage(StageKind::Deploy, deploy),
        ]))
    }
}

fn require_artifact(
    available: &BTreeSet<&str>,
    artifact: &str,
    stage: StageKind,
    action: &str,
) -> Result<()> {
    if available.contains(artifact) {
        Ok(())
    } else {
        Err(SynthError::StageOrder(format!(
            "{stage} action '{action}' consumes artifact '{artifact}' that no earlier stage produces"
        )))
    }
}

fn stage(kind: StageKind, actions: Vec<Expr>) -> Expr {
    Expr::object([("Name", Expr::str(kind.as_str())), ("Actions", Expr::List(actions))])
}

fn action(
    name: &str,
    (category, provider): (&str, &str),
    configuration: Vec<(&str, Expr)>,
    inputs: &[&str],
    output: Option<&str>,
) -> Expr {
    let mut entries = vec![
        ("Name", Expr::str(name)),
        (
            "ActionTypeId",
            Expr::object([
                ("Category", Expr::str(category)),
                ("Owner", Expr::str("AWS")),
                ("Provider", Expr::str(provider)),
                ("Version", Expr::str("1")),
            ]),
        ),
        ("Configuration", Expr::object(configuration)),
        ("RunOrder", Expr::Int(1)),
    ];
    if !inputs.is_empty() {
        entries.push(("InputArtifacts", artifact_list(inputs.iter().copied())));
    }
    if let Some(output) = output {
        entries.push(("OutputArtifacts", artifact_list([output])));
    }
    Expr::object(entries)
}

fn artifact_list<'a>(names: impl IntoIterator<Item = &'a str>) -> Expr {
    Expr::list(names.into_iter().map(|n| Expr::object([("Name", Expr::str(n))])))
}

fn deploy_action(deploy: &DeployAction) -> Result<Expr> {
    Ok(match deploy {
        DeployAction::CloudFormation {
            name,
            stack_name,
            template_artifact,
            template_file,
            parameter_overrides,
            deployment_role,
            ..
        } => {
            // CodePipeline expects the overrides as a JSON document in a string
            let overrides: Map<String, Value> = parameter_overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            action(
                name,
                ("Deploy", "CloudFormation"),
                vec![
                    ("ActionMode", Expr::str("CREATE_UPDATE")),
                    ("StackName", Expr::str(stack_name)),
                    ("Capabilities", Expr::str("CAPABILITY_NAMED_IAM,CAPABILITY_AUTO_EXPAND")),
                    ("RoleArn", deployment_role.clone()),
                    (
                        "TemplatePath",
                        Expr::str(format!("{template_artifact}::{template_file}")),
                    ),
                    (
                        "ParameterOverrides",
                        Expr::str(serde_json::to_string(&Value::Object(overrides))?),
                    ),
                ],
                &deploy.inputs(),
                None,
            )
        }
        DeployAction::EcsService {
            name,
            cluster_name,
            service_name,
            input,
            file_name,
        } => action(
            name,
            ("Deploy", "ECS"),
            vec![
                ("ClusterName", cluster_name.clone()),
                ("ServiceName", Expr::str(service_name)),
                ("FileName", Expr::str(file_name)),
            ],
            &[input.as_str()],
            None,
        ),
    })
}

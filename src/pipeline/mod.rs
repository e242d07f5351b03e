//! # Pipeline Descriptor
//!
//! One build-and-deploy pipeline per service:
//!
//! ```text
//! Source ──> Build ─┬─ DockerBuild: build, push to ECR, publish tag (imageTag.json + SSM)
//!                   └─ InfraBuild:  synthesize the service stack template
//!        ──> Deploy:  CloudFormation CREATE_UPDATE with the image tag parameter
//!                     (or an ECS rolling deploy of imagedefinitions.json)
//! ```
//!
//! The pipeline stack owns the ECR repository the service's deferred image
//! points at.

mod stages;

pub use stages::{
    validate_stage_order, BuildAction, BuildStage, DeployAction, DeployStage, PipelineStages,
    SourceAction, SourceStage, StageKind,
};

use crate::buildspec::{BuildSpec, Phase};
use crate::constants::{
    BUILD_TIMEOUT_MINUTES, CODEBUILD_IMAGE, DEFAULT_OUTPUT_DIR, IMAGE_DEFINITIONS_FILE,
    IMAGE_TAG_FILE, IMAGE_TAG_KEY, SSM_IMAGE_TAG_PARAM_NAME,
};
use crate::environment::{Environment, SecretRef};
use crate::error::Result;
use crate::iam::{
    codebuild_logs, codebuild_start, codestar_use_connection, ecr_auth_token, ecr_pull_push,
    pass_role, s3_read_write, secret_read, ssm_put_parameter, PolicyStatement, Role,
};
use crate::image::{DeferredImage, ImageRepository};
use crate::template::{DeletionPolicy, Expr, LogicalId, Output, Resource, Stack};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const SOURCE_OUTPUT: &str = "SourceOutput";
const INFRA_SOURCE_OUTPUT: &str = "InfraSourceOutput";
const DOCKER_BUILD_OUTPUT: &str = "DockerBuildOutput";
const INFRA_BUILD_OUTPUT: &str = "InfraBuildOutput";

/// Repository branch checked out through a CodeStar connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub connection_arn: String,
    pub owner: String,
    pub repo: String,
    /// Defaults to the environment's branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Files the infrastructure build synthesizes from, relative to the root
/// of the infrastructure checkout
///
/// Unset paths make the build fall back to the built-in description and
/// registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SynthSourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<String>,
}

impl SynthSourceConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.config_path.is_none() && self.registry_path.is_none()
    }

    /// Global flags passed to the synthesizer in the infrastructure build
    #[must_use]
    pub fn cli_args(&self) -> String {
        let mut args = String::new();
        if let Some(path) = &self.config_path {
            args.push_str(" --config ");
            args.push_str(path);
        }
        if let Some(path) = &self.registry_path {
            args.push_str(" --registry ");
            args.push_str(path);
        }
        args
    }
}

/// Where the Deploy stage puts the new image
#[derive(Debug, Clone, PartialEq)]
pub enum DeployTarget {
    /// Update the service stack, passing the tag as a template parameter
    CloudFormation { stack_name: String },
    /// Point an existing ECS service at the new image
    EcsService {
        cluster_name: Expr,
        service_name: String,
    },
}

/// SSM parameter the docker build publishes the image tag to
#[must_use]
pub fn tag_parameter_name(environment: Environment, service: &str) -> String {
    format!("/{environment}/{service}/{SSM_IMAGE_TAG_PARAM_NAME}")
}

#[derive(Debug, Clone)]
pub struct PipelineDescriptorBuilder {
    environment: Environment,
    service: String,
    service_stack_name: String,
    source: SourceConfig,
    infra_source: Option<SourceConfig>,
    deploy_target: Option<DeployTarget>,
    dockerhub_credentials: Option<SecretRef>,
    tag_parameter: Option<String>,
    synth_source: SynthSourceConfig,
    synth_env: BTreeMap<String, String>,
}

impl PipelineDescriptorBuilder {
    pub fn new(
        environment: Environment,
        service: impl Into<String>,
        service_stack_name: impl Into<String>,
        source: SourceConfig,
    ) -> Self {
        Self {
            environment,
            service: service.into(),
            service_stack_name: service_stack_name.into(),
            source,
            infra_source: None,
            deploy_target: None,
            dockerhub_credentials: None,
            tag_parameter: None,
            synth_source: SynthSourceConfig::default(),
            synth_env: BTreeMap::new(),
        }
    }

    /// Separate repository holding the infrastructure definition
    #[must_use]
    pub fn infra_source(mut self, source: Option<SourceConfig>) -> Self {
        self.infra_source = source;
        self
    }

    #[must_use]
    pub fn deploy_target(mut self, target: DeployTarget) -> Self {
        self.deploy_target = Some(target);
        self
    }

    /// Secret with `username` and `token` keys used for `docker login`
    #[must_use]
    pub fn dockerhub_credentials(mut self, secret: Option<SecretRef>) -> Self {
        self.dockerhub_credentials = secret;
        self
    }

    #[must_use]
    pub fn tag_parameter(mut self, name: impl Into<String>) -> Self {
        self.tag_parameter = Some(name.into());
        self
    }

    /// Deployment description and registry the infrastructure build reads
    #[must_use]
    pub fn synth_source(mut self, source: SynthSourceConfig) -> Self {
        self.synth_source = source;
        self
    }

    /// Environment variables passed to the template synthesis build
    #[must_use]
    pub fn synth_variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.synth_env.insert(name.to_string(), value.into());
        self
    }

    /// Declare the pipeline and everything it owns in `stack`
    #[allow(clippy::too_many_lines, reason = "stages reference every resource declared before them")]
    pub fn build(self, stack: &mut Stack) -> Result<PipelineDescriptor> {
        let env = self.environment;
        let service = self.service.clone();
        info!(stack = %stack.name(), environment = %env, service = %service, "Building pipeline");

        let repository = ImageRepository::for_service(env, &service, stack.env());
        let tag_parameter = self
            .tag_parameter
            .clone()
            .unwrap_or_else(|| tag_parameter_name(env, &service));
        let image = DeferredImage::new(repository.clone());
        let image_param = DeferredImage::param_name(&service)?;
        let deploy_target = self
            .deploy_target
            .clone()
            .unwrap_or_else(|| DeployTarget::CloudFormation {
                stack_name: self.service_stack_name.clone(),
            });

        let repository_path = format!("{service}Repo");
        let repository_id = stack.add(
            &[repository_path.as_str()],
            Resource::new("AWS::ECR::Repository")
                .property("RepositoryName", Expr::str(repository.name()))
                .removal_policy(DeletionPolicy::Delete),
        )?;

        let bucket = stack.add(
            &["Pipeline", "ArtifactsBucket"],
            Resource::new("AWS::S3::Bucket")
                .property(
                    "BucketEncryption",
                    Expr::object([(
                        "ServerSideEncryptionConfiguration",
                        Expr::list([Expr::object([(
                            "ServerSideEncryptionByDefault",
                            Expr::object([("SSEAlgorithm", Expr::str("AES256"))]),
                        )])]),
                    )]),
                )
                .property("PublicAccessBlockConfiguration", block_public_access())
                .removal_policy(DeletionPolicy::Retain),
        )?;
        let bucket_arn = Expr::get_att(&bucket, "Arn");

        // Docker build
        let docker_project_name = format!("{env}-{service}DockerBuild");
        let docker_buildspec = self.docker_buildspec(&deploy_target, &tag_parameter);
        let mut docker_role = Role::new(&[docker_project_name.as_str(), "Role"], "codebuild.amazonaws.com");
        if let Some(secret) = &self.dockerhub_credentials {
            docker_role.add_to_policy(secret_read(secret.arn_expr()));
        }
        docker_role.add_to_policy(ecr_auth_token());
        docker_role.add_to_policy(ecr_pull_push(Expr::get_att(&repository_id, "Arn")));
        docker_role.add_to_policy(ssm_put_parameter(&tag_parameter));
        docker_role.add_to_policy(codebuild_logs(&docker_project_name));
        docker_role.add_to_policy(s3_read_write(bucket_arn.clone()));
        let docker_project = codebuild_project(
            stack,
            &docker_project_name,
            &docker_role,
            &docker_buildspec,
            true,
            vec![(
                "SERVICE_REPOSITORY_URI",
                Expr::get_att(&repository_id, "RepositoryUri"),
            )],
        )?;

        // Infrastructure build
        let infra_project_name = format!("{env}-{service}InfraBuild");
        let infra_buildspec = self.infra_buildspec();
        let mut infra_role = Role::new(&[infra_project_name.as_str(), "Role"], "codebuild.amazonaws.com");
        infra_role.add_to_policy(PolicyStatement::allow(
            ["ec2:DescribeAvailabilityZones"],
            vec![Expr::str("*")],
        ));
        infra_role.add_to_policy(codebuild_logs(&infra_project_name));
        infra_role.add_to_policy(s3_read_write(bucket_arn.clone()));
        let infra_project = codebuild_project(
            stack,
            &infra_project_name,
            &infra_role,
            &infra_buildspec,
            false,
            Vec::new(),
        )?;

        // Stages
        let mut source_actions = vec![SourceAction {
            name: "TriggerOnGitPush".to_string(),
            connection_arn: self.source.connection_arn.clone(),
            owner: self.source.owner.clone(),
            repo: self.source.repo.clone(),
            branch: self.branch(&self.source),
            output: SOURCE_OUTPUT.to_string(),
        }];
        let infra_input = match &self.infra_source {
            Some(infra) => {
                source_actions.push(SourceAction {
                    name: "InfrastructureGitPush".to_string(),
                    connection_arn: infra.connection_arn.clone(),
                    owner: infra.owner.clone(),
                    repo: infra.repo.clone(),
                    branch: self.branch(infra),
                    output: INFRA_SOURCE_OUTPUT.to_string(),
                });
                INFRA_SOURCE_OUTPUT
            }
            None => SOURCE_OUTPUT,
        };

        let mut pipeline_role = Role::new(
            &["Pipeline", "Role"],
            "codepipeline.amazonaws.com",
        );
        pipeline_role.add_to_policy(s3_read_write(bucket_arn));
        pipeline_role.add_to_policy(codebuild_start(vec![
            Expr::get_att(&docker_project, "Arn"),
            Expr::get_att(&infra_project, "Arn"),
        ]));
        for action in &source_actions {
            pipeline_role.add_to_policy(codestar_use_connection(&action.connection_arn));
        }

        let deploy_action = match &deploy_target {
            DeployTarget::CloudFormation { stack_name } => {
                let deploy_role = Role::new(
                    &["Pipeline", "Deploy", "CFNDeployRole"],
                    "cloudformation.amazonaws.com",
                )
                .with_managed_policy(Expr::sub(
                    "arn:${AWS::Partition}:iam::aws:policy/AdministratorAccess",
                ));
                deploy_role.attach(stack)?;
                pipeline_role.add_to_policy(PolicyStatement::allow(
                    [
                        "cloudformation:CreateStack",
                        "cloudformation:DeleteStack",
                        "cloudformation:DescribeStack*",
                        "cloudformation:GetStackPolicy",
                        "cloudformation:GetTemplate*",
                        "cloudformation:SetStackPolicy",
                        "cloudformation:UpdateStack",
                        "cloudformation:ValidateTemplate",
                    ],
                    vec![Expr::sub(format!(
                        "arn:${{AWS::Partition}}:cloudformation:${{AWS::Region}}:${{AWS::AccountId}}:stack/{stack_name}/*"
                    ))],
                ));
                pipeline_role.add_to_policy(pass_role(deploy_role.arn()?));

                let mut overrides = BTreeMap::new();
                overrides.insert(
                    image_param.as_str().to_string(),
                    Expr::GetParam {
                        artifact: DOCKER_BUILD_OUTPUT.to_string(),
                        file: IMAGE_TAG_FILE.to_string(),
                        key: IMAGE_TAG_KEY.to_string(),
                    },
                );
                DeployAction::CloudFormation {
                    name: "CFN_Deploy".to_string(),
                    stack_name: stack_name.clone(),
                    template_artifact: INFRA_BUILD_OUTPUT.to_string(),
                    template_file: template_file(stack_name),
                    parameter_overrides: overrides,
                    extra_inputs: vec![DOCKER_BUILD_OUTPUT.to_string()],
                    deployment_role: deploy_role.arn()?,
                }
            }
            DeployTarget::EcsService {
                cluster_name,
                service_name,
            } => {
                pipeline_role.add_to_policy(PolicyStatement::allow(
                    [
                        "ecs:DescribeServices",
                        "ecs:DescribeTaskDefinition",
                        "ecs:DescribeTasks",
                        "ecs:ListTasks",
                        "ecs:RegisterTaskDefinition",
                        "ecs:TagResource",
                        "ecs:UpdateService",
                    ],
                    vec![Expr::str("*")],
                ));
                pipeline_role.add_to_policy(pass_role(Expr::str("*")));
                DeployAction::EcsService {
                    name: "ECS_Deploy".to_string(),
                    cluster_name: cluster_name.clone(),
                    service_name: service_name.clone(),
                    input: DOCKER_BUILD_OUTPUT.to_string(),
                    file_name: IMAGE_DEFINITIONS_FILE.to_string(),
                }
            }
        };

        let stages = PipelineStages {
            source: SourceStage {
                actions: source_actions,
            },
            build: BuildStage {
                actions: vec![
                    BuildAction {
                        name: "DockerBuild".to_string(),
                        project: docker_project.clone(),
                        input: SOURCE_OUTPUT.to_string(),
                        output: DOCKER_BUILD_OUTPUT.to_string(),
                    },
                    BuildAction {
                        name: "InfraBuild".to_string(),
                        project: infra_project.clone(),
                        input: infra_input.to_string(),
                        output: INFRA_BUILD_OUTPUT.to_string(),
                    },
                ],
            },
            deploy: DeployStage {
                actions: vec![deploy_action],
            },
        };
        stages.validate()?;

        let (pipeline_role_id, pipeline_policy) = pipeline_role.attach(stack)?;
        let pipeline_name = format!("{env}-{service}Pipeline");
        let mut pipeline = Resource::new("AWS::CodePipeline::Pipeline")
            .property("Name", Expr::str(&pipeline_name))
            .property("RoleArn", Expr::get_att(&pipeline_role_id, "Arn"))
            .property(
                "ArtifactStore",
                Expr::object([
                    ("Type", Expr::str("S3")),
                    ("Location", Expr::reference(&bucket)),
                ]),
            )
            .property("Stages", stages.to_expr()?)
            .property("RestartExecutionOnUpdate", true);
        if let Some(policy) = &pipeline_policy {
            pipeline = pipeline.depends_on(policy);
        }
        let pipeline = stack.add(&[pipeline_name.as_str()], pipeline)?;

        stack.add_output(
            LogicalId::new("RepositoryUri")?,
            Output::new(Expr::get_att(&repository_id, "RepositoryUri"))
                .description("Image repository the pipeline pushes to"),
        )?;

        info!(
            stack = %stack.name(),
            pipeline = %pipeline_name,
            repository = %repository.name(),
            tag_parameter = %tag_parameter,
            "Pipeline declared"
        );

        Ok(PipelineDescriptor {
            environment: env,
            service,
            service_stack_name: self.service_stack_name,
            repository,
            image,
            image_param,
            tag_parameter,
            pipeline,
            docker_project,
            infra_project,
            docker_grants: docker_role.statements().to_vec(),
            infra_grants: infra_role.statements().to_vec(),
            docker_buildspec,
            infra_buildspec,
            stages,
            deploy_target,
        })
    }

    fn branch(&self, source: &SourceConfig) -> String {
        source
            .branch
            .clone()
            .unwrap_or_else(|| self.environment.branch().to_string())
    }

    fn docker_buildspec(&self, target: &DeployTarget, tag_parameter: &str) -> BuildSpec {
        let image = "$SERVICE_REPOSITORY_URI:$CODEBUILD_RESOLVED_SOURCE_VERSION";
        let registry = "${SERVICE_REPOSITORY_URI%%/*}";
        let mut spec = BuildSpec::new();
        if let Some(secret) = &self.dockerhub_credentials {
            spec = spec
                .secret("DOCKERHUB_USERNAME", secret.id(), "username")
                .secret("DOCKERHUB_TOKEN", secret.id(), "token")
                .commands(
                    Phase::PreBuild,
                    ["echo \"$DOCKERHUB_TOKEN\" | docker login --username \"$DOCKERHUB_USERNAME\" --password-stdin"],
                );
        }
        spec = spec
            .commands(
                Phase::Build,
                [
                    format!("echo Build {image}"),
                    format!("docker build -t {image} ."),
                ],
            )
            .commands(
                Phase::PostBuild,
                [
                    "echo Logging in to Amazon ECR...".to_string(),
                    format!(
                        "aws ecr get-login-password --region $AWS_DEFAULT_REGION | docker login --username AWS --password-stdin {registry}"
                    ),
                    format!("docker push {image}"),
                    format!(
                        "printf '{{ \"{IMAGE_TAG_KEY}\": \"'$CODEBUILD_RESOLVED_SOURCE_VERSION'\" }}' > {IMAGE_TAG_FILE}"
                    ),
                    format!(
                        "aws ssm put-parameter --name \"{tag_parameter}\" --value $CODEBUILD_RESOLVED_SOURCE_VERSION --type String --overwrite"
                    ),
                ],
            );
        let mut artifacts = vec![IMAGE_TAG_FILE.to_string()];
        if let DeployTarget::EcsService { .. } = target {
            spec = spec.commands(
                Phase::PostBuild,
                [format!(
                    "printf '[{{\"name\":\"{}\",\"imageUri\":\"%s\"}}]' {image} > {IMAGE_DEFINITIONS_FILE}",
                    self.service
                )],
            );
            artifacts.push(IMAGE_DEFINITIONS_FILE.to_string());
        }
        spec.artifact_files(artifacts, None)
    }

    fn infra_buildspec(&self) -> BuildSpec {
        if self.synth_source.is_empty() {
            warn!(
                environment = %self.environment,
                service = %self.service,
                "Infrastructure build synthesizes the built-in deployment description"
            );
        }
        let mut spec = BuildSpec::new();
        for (name, value) in &self.synth_env {
            spec = spec.variable(name, value.clone());
        }
        spec.commands(
            Phase::Install,
            [
                "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y --profile minimal",
                ". \"$HOME/.cargo/env\"",
            ],
        )
        .commands(
            Phase::Build,
            [
                "cargo build --release".to_string(),
                format!(
                    "./target/release/stack-synth{} synth --output-dir {DEFAULT_OUTPUT_DIR} --environment {}",
                    self.synth_source.cli_args(),
                    self.environment
                ),
            ],
        )
        .artifact_files(
            [template_file(&self.service_stack_name)],
            Some(DEFAULT_OUTPUT_DIR),
        )
    }
}

/// Artifact file name of a synthesized stack template
#[must_use]
pub fn template_file(stack_name: &str) -> String {
    format!("{stack_name}.template.json")
}

fn codebuild_project(
    stack: &mut Stack,
    name: &str,
    role: &Role,
    buildspec: &BuildSpec,
    privileged: bool,
    variables: Vec<(&str, Expr)>,
) -> Result<LogicalId> {
    let (role_id, policy_id) = role.attach(stack)?;
    let mut environment = vec![
        ("Type", Expr::str("LINUX_CONTAINER")),
        ("ComputeType", Expr::str("BUILD_GENERAL1_SMALL")),
        ("Image", Expr::str(CODEBUILD_IMAGE)),
        ("ImagePullCredentialsType", Expr::str("CODEBUILD")),
        ("PrivilegedMode", Expr::Bool(privileged)),
    ];
    if !variables.is_empty() {
        environment.push((
            "EnvironmentVariables",
            Expr::list(variables.into_iter().map(|(name, value)| {
                Expr::object([
                    ("Name", Expr::str(name)),
                    ("Type", Expr::str("PLAINTEXT")),
                    ("Value", value),
                ])
            })),
        ));
    }
    let mut project = Resource::new("AWS::CodeBuild::Project")
        .property("Name", Expr::str(name))
        .property("ServiceRole", Expr::get_att(&role_id, "Arn"))
        .property("Artifacts", Expr::object([("Type", Expr::str("CODEPIPELINE"))]))
        .property(
            "Source",
            Expr::object([
                ("Type", Expr::str("CODEPIPELINE")),
                ("BuildSpec", Expr::str(buildspec.to_yaml()?)),
            ]),
        )
        .property("Environment", Expr::object(environment))
        .property("TimeoutInMinutes", BUILD_TIMEOUT_MINUTES);
    if let Some(policy) = &policy_id {
        project = project.depends_on(policy);
    }
    stack.add(&[name], project)
}

fn block_public_access() -> Expr {
    Expr::object([
        ("BlockPublicAcls", Expr::Bool(true)),
        ("BlockPublicPolicy", Expr::Bool(true)),
        ("IgnorePublicAcls", Expr::Bool(true)),
        ("RestrictPublicBuckets", Expr::Bool(true)),
    ])
}

/// Everything the pipeline stack declared, for composition and inspection
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub environment: Environment,
    pub service: String,
    pub service_stack_name: String,
    pub repository: ImageRepository,
    pub image: DeferredImage,
    /// Template parameter of the service stack that receives the image tag
    pub image_param: LogicalId,
    /// SSM parameter the docker build publishes the tag to
    pub tag_parameter: String,
    pub pipeline: LogicalId,
    pub docker_project: LogicalId,
    pub infra_project: LogicalId,
    pub docker_grants: Vec<PolicyStatement>,
    pub infra_grants: Vec<PolicyStatement>,
    pub docker_buildspec: BuildSpec,
    pub infra_buildspec: BuildSpec,
    pub stages: PipelineStages,
    pub deploy_target: DeployTarget,
}

impl PipelineDescriptor {
    #[must_use]
    pub fn stage_order(&self) -> Vec<StageKind> {
        self.stages.order()
    }

    #[must_use]
    pub fn docker_allows(&self, action: &str) -> bool {
        self.docker_grants.iter().any(|s| s.allows(action))
    }
}

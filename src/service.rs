//! # Service Descriptor
//!
//! A Fargate service: task definition, Cloud Map registration, ECS service
//! attached to the environment's target group and CPU-based autoscaling.
//!
//! The service borrows the network topology of its environment through an
//! `Arc`; it never owns or copies cluster, security group or target group.

use crate::constants::{
    DEFAULT_APP_NAME, DEFAULT_CPU_TARGET_PERCENT, DEFAULT_MAX_CAPACITY, DEFAULT_TASK_CPU,
    DEFAULT_TASK_MEMORY_MIB, LOG_RETENTION_DAYS, SCALING_COOLDOWN_SECS,
};
use crate::environment::{Environment, SecretRef};
use crate::error::{Result, SynthError};
use crate::iam::{ecr_auth_token, logs_write, secret_read, PolicyStatement, Role};
use crate::image::{DeferredImage, ImageLocator};
use crate::network::NetworkTopology;
use crate::template::{DeletionPolicy, Expr, LogicalId, Resource, Stack};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Task count limits; `desired <= min <= max` and `max >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoscalingBounds {
    desired: u32,
    min: u32,
    max: u32,
}

impl AutoscalingBounds {
    /// Scale between the desired count and `max`
    pub fn new(desired: u32, max: u32) -> Result<Self> {
        Self::with_min(desired, desired, max)
    }

    pub fn with_min(desired: u32, min: u32, max: u32) -> Result<Self> {
        if desired > min || min > max || max == 0 {
            return Err(SynthError::InvalidScalingBounds { desired, min, max });
        }
        Ok(Self { desired, min, max })
    }

    #[must_use]
    pub fn desired(&self) -> u32 {
        self.desired
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }
}

#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
    name: String,
    environment: Environment,
    topology: Arc<NetworkTopology>,
    image: DeferredImage,
    desired_count: u32,
    max_capacity: u32,
    cpu: u32,
    memory_mib: u32,
    app_name: String,
    secrets: BTreeMap<String, SecretRef>,
    variables: BTreeMap<String, Expr>,
    task_grants: Vec<PolicyStatement>,
}

impl ServiceDescriptorBuilder {
    pub fn new(
        name: impl Into<String>,
        environment: Environment,
        topology: Arc<NetworkTopology>,
        image: DeferredImage,
    ) -> Self {
        Self {
            name: name.into(),
            environment,
            topology,
            image,
            desired_count: 1,
            max_capacity: DEFAULT_MAX_CAPACITY,
            cpu: DEFAULT_TASK_CPU,
            memory_mib: DEFAULT_TASK_MEMORY_MIB,
            app_name: DEFAULT_APP_NAME.to_string(),
            secrets: BTreeMap::new(),
            variables: BTreeMap::new(),
            task_grants: Vec::new(),
        }
    }

    #[must_use]
    pub fn desired_count(mut self, count: u32) -> Self {
        self.desired_count = count;
        self
    }

    #[must_use]
    pub fn max_capacity(mut self, max: u32) -> Self {
        self.max_capacity = max;
        self
    }

    #[must_use]
    pub fn task_size(mut self, cpu: u32, memory_mib: u32) -> Self {
        self.cpu = cpu;
        self.memory_mib = memory_mib;
        self
    }

    /// Prefix of the log stream (`<app>-<env>/<service>`)
    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Secrets injected by ECS at container start
    #[must_use]
    pub fn secrets(mut self, secrets: BTreeMap<String, SecretRef>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    /// Literal container environment values
    #[must_use]
    pub fn config(mut self, config: BTreeMap<String, String>) -> Self {
        self.variables
            .extend(config.into_iter().map(|(k, v)| (k, Expr::Str(v))));
        self
    }

    #[must_use]
    pub fn variable(mut self, name: &str, value: impl Into<Expr>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    /// Permission the running task needs (e.g. access to a bucket)
    #[must_use]
    pub fn task_grant(mut self, statement: PolicyStatement) -> Self {
        self.task_grants.push(statement);
        self
    }

    /// Declare the service in `stack`
    #[allow(clippy::too_many_lines, reason = "one linear declaration of the service")]
    pub fn build(self, stack: &mut Stack) -> Result<ServiceDescriptor> {
        let bounds = AutoscalingBounds::new(self.desired_count, self.max_capacity)?;
        if self.topology.environment != self.environment {
            return Err(SynthError::InvalidConfig(format!(
                "service '{}' in '{}' cannot join the '{}' network",
                self.name, self.environment, self.topology.environment
            )));
        }
        let name = self.name.as_str();
        let env = self.environment;
        let topology = &self.topology;
        info!(
            stack = %stack.name(),
            environment = %env,
            service = %name,
            desired = bounds.desired(),
            max = bounds.max(),
            "Building service"
        );

        let log_group = stack.add(
            &["TaskDef", name, "LogGroup"],
            Resource::new("AWS::Logs::LogGroup")
                .property("RetentionInDays", LOG_RETENTION_DAYS)
                .removal_policy(DeletionPolicy::Retain),
        )?;

        let mut execution_role = Role::new(&["TaskDef", "ExecutionRole"], "ecs-tasks.amazonaws.com");
        execution_role.add_to_policy(ecr_auth_token());
        execution_role.add_to_policy(logs_write(Expr::get_att(&log_group, "Arn")));
        let locator = self.image.bind(stack, name, &mut execution_role)?;
        for secret in self.secrets.values() {
            execution_role.add_to_policy(secret_read(secret.arn_expr()));
        }
        let (execution_role_id, execution_policy) = execution_role.attach(stack)?;

        let mut task_role = Role::new(&["TaskDef", "TaskRole"], "ecs-tasks.amazonaws.com");
        for grant in &self.task_grants {
            task_role.add_to_policy(grant.clone());
        }
        let (task_role_id, task_policy) = task_role.attach(stack)?;

        let mut variables = self.variables.clone();
        variables.insert("APP_ENV".to_string(), Expr::str(env.as_str()));
        variables.insert("AWS_REGION".to_string(), Expr::pseudo("Region"));
        variables.insert(
            "SERVICE_URL".to_string(),
            Expr::str(format!(
                "http://{name}.{}:{}",
                topology.namespace_name, topology.service_port
            )),
        );

        let log_stream_prefix = format!("{}-{env}/{name}", self.app_name);
        let container = Expr::object([
            ("Name", Expr::str(name)),
            ("Image", locator.to_expr()),
            ("Essential", Expr::Bool(true)),
            (
                "PortMappings",
                Expr::list([Expr::object([
                    ("ContainerPort", Expr::from(topology.service_port)),
                    ("Protocol", Expr::str("tcp")),
                ])]),
            ),
            (
                "Environment",
                Expr::list(variables.iter().map(|(k, v)| {
                    Expr::object([("Name", Expr::str(k)), ("Value", v.clone())])
                })),
            ),
            (
                "Secrets",
                Expr::list(self.secrets.iter().map(|(k, secret)| {
                    Expr::object([("Name", Expr::str(k)), ("ValueFrom", secret.arn_expr())])
                })),
            ),
            (
                "LogConfiguration",
                Expr::object([
                    ("LogDriver", Expr::str("awslogs")),
                    (
                        "Options",
                        Expr::object([
                            ("awslogs-group", Expr::reference(&log_group)),
                            ("awslogs-stream-prefix", Expr::str(&log_stream_prefix)),
                            ("awslogs-region", Expr::pseudo("Region")),
                        ]),
                    ),
                ]),
            ),
        ]);

        let mut task_definition = Resource::new("AWS::ECS::TaskDefinition")
            .property("Family", Expr::str(format!("{}{name}TaskDef", stack.name())))
            .property("Cpu", Expr::str(self.cpu.to_string()))
            .property("Memory", Expr::str(self.memory_mib.to_string()))
            .property("NetworkMode", "awsvpc")
            .property("RequiresCompatibilities", Expr::list([Expr::str("FARGATE")]))
            .property("ExecutionRoleArn", Expr::get_att(&execution_role_id, "Arn"))
            .property("TaskRoleArn", Expr::get_att(&task_role_id, "Arn"))
            .property("ContainerDefinitions", Expr::list([container]));
        if let Some(policy) = &execution_policy {
            task_definition = task_definition.depends_on(policy);
        }
        if let Some(policy) = &task_policy {
            task_definition = task_definition.depends_on(policy);
        }
        let task_definition = stack.add(&["TaskDef"], task_definition)?;

        let discovery = stack.add(
            &["Service", "CloudmapService"],
            Resource::new("AWS::ServiceDiscovery::Service")
                .property("Name", Expr::str(name))
                .property("NamespaceId", topology.namespace_id.clone())
                .property(
                    "DnsConfig",
                    Expr::object([
                        (
                            "DnsRecords",
                            Expr::list([Expr::object([
                                ("TTL", Expr::Int(60)),
                                ("Type", Expr::str("A")),
                            ])]),
                        ),
                        ("RoutingPolicy", Expr::str("MULTIVALUE")),
                    ]),
                )
                .property(
                    "HealthCheckCustomConfig",
                    Expr::object([("FailureThreshold", Expr::Int(1))]),
                ),
        )?;

        let service_name = format!("{env}-{name}");
        let service = stack.add(
            &["Service", "Service"],
            Resource::new("AWS::ECS::Service")
                .property("ServiceName", Expr::str(&service_name))
                .property("Cluster", topology.cluster_name.clone())
                .property("LaunchType", "FARGATE")
                .property("DesiredCount", bounds.desired())
                .property("TaskDefinition", Expr::reference(&task_definition))
                .property("HealthCheckGracePeriodSeconds", 60u32)
                .property(
                    "DeploymentConfiguration",
                    Expr::object([
                        ("MaximumPercent", Expr::Int(200)),
                        ("MinimumHealthyPercent", Expr::Int(50)),
                    ]),
                )
                .property(
                    "NetworkConfiguration",
                    Expr::object([(
                        "AwsvpcConfiguration",
                        Expr::object([
                            ("AssignPublicIp", Expr::str("DISABLED")),
                            ("SecurityGroups", Expr::list([topology.security_group_id.clone()])),
                            ("Subnets", Expr::List(topology.private_subnet_ids.clone())),
                        ]),
                    )]),
                )
                .property(
                    "LoadBalancers",
                    Expr::list([Expr::object([
                        ("ContainerName", Expr::str(name)),
                        ("ContainerPort", Expr::from(topology.service_port)),
                        ("TargetGroupArn", topology.target_group_arn.clone()),
                    ])]),
                )
                .property(
                    "ServiceRegistries",
                    Expr::list([Expr::object([(
                        "RegistryArn",
                        Expr::get_att(&discovery, "Arn"),
                    )])]),
                ),
        )?;

        let scalable_target = stack.add(
            &["Service", "TaskCount", "Target"],
            Resource::new("AWS::ApplicationAutoScaling::ScalableTarget")
                .property("MinCapacity", bounds.min())
                .property("MaxCapacity", bounds.max())
                .property(
                    "ResourceId",
                    Expr::join(
                        "/",
                        vec![
                            Expr::str("service"),
                            topology.cluster_name.clone(),
                            Expr::get_att(&service, "Name"),
                        ],
                    ),
                )
                .property(
                    "RoleARN",
                    Expr::sub(
                        "arn:${AWS::Partition}:iam::${AWS::AccountId}:role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService",
                    ),
                )
                .property("ScalableDimension", "ecs:service:DesiredCount")
                .property("ServiceNamespace", "ecs"),
        )?;

        let scaling_policy = stack.add(
            &["Service", "TaskCount", "Target", "CpuScaling"],
            Resource::new("AWS::ApplicationAutoScaling::ScalingPolicy")
                .property("PolicyName", Expr::str(format!("{}{name}CpuScaling", stack.name())))
                .property("PolicyType", "TargetTrackingScaling")
                .property("ScalingTargetId", Expr::reference(&scalable_target))
                .property(
                    "TargetTrackingScalingPolicyConfiguration",
                    Expr::object([
                        (
                            "PredefinedMetricSpecification",
                            Expr::object([(
                                "PredefinedMetricType",
                                Expr::str("ECSServiceAverageCPUUtilization"),
                            )]),
                        ),
                        ("TargetValue", Expr::from(DEFAULT_CPU_TARGET_PERCENT)),
                        ("ScaleInCooldown", Expr::from(SCALING_COOLDOWN_SECS)),
                        ("ScaleOutCooldown", Expr::from(SCALING_COOLDOWN_SECS)),
                    ]),
                ),
        )?;
        debug!(stack = %stack.name(), service = %name, logical_id = %service, "Service declared");

        Ok(ServiceDescriptor {
            name: self.name.clone(),
            environment: env,
            stack_name: stack.name().to_string(),
            topology: Arc::clone(&self.topology),
            locator,
            bounds,
            log_stream_prefix,
            variables,
            secrets: self.secrets,
            task_definition,
            service,
            scalable_target,
            scaling_policy,
        })
    }
}

/// Handles of a declared service
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub environment: Environment,
    pub stack_name: String,
    pub topology: Arc<NetworkTopology>,
    /// Unresolved image the task definition binds to
    pub locator: ImageLocator,
    pub bounds: AutoscalingBounds,
    pub log_stream_prefix: String,
    pub variables: BTreeMap<String, Expr>,
    pub secrets: BTreeMap<String, SecretRef>,
    pub task_definition: LogicalId,
    pub service: LogicalId,
    pub scalable_target: LogicalId,
    pub scaling_policy: LogicalId,
}

impl ServiceDescriptor {
    /// Whether this service references `topology` itself, not a copy
    #[must_use]
    pub fn uses_topology(&self, topology: &Arc<NetworkTopology>) -> bool {
        Arc::ptr_eq(&self.topology, topology)
    }
}

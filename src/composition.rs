//! # Composition Root
//!
//! Turns the deployment description into a set of stacks:
//!
//! - `<env>-Cluster`: the single network topology of the environment
//! - `<env>-<svc>PipelineStack`: image repository and delivery pipeline
//! - `<env>-<svc>Stack`: the running service, sharing the cluster's topology
//!
//! Every stack is tagged `environment=<env>`.

use crate::config::{AppConfig, DeployMode, EnvironmentConfig, ServiceConfig};
use crate::constants::DEFAULT_REGION;
use crate::environment::{Environment, EnvironmentRegistry};
use crate::error::{Result, SynthError};
use crate::network::{NetworkTopology, NetworkTopologyBuilder};
use crate::pipeline::{
    DeployTarget, PipelineDescriptor, PipelineDescriptorBuilder, SynthSourceConfig,
};
use crate::service::{ServiceDescriptor, ServiceDescriptorBuilder};
use crate::storage::MediaStorageBuilder;
use crate::template::{Stack, StackEnv};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry key of the Docker Hub login used by image builds
pub const DOCKERHUB_CREDENTIALS_KEY: &str = "DOCKERHUB_CREDENTIALS";

/// Stack holding the environment's network
#[must_use]
pub fn cluster_stack_name(environment: Environment) -> String {
    format!("{environment}-Cluster")
}

#[must_use]
pub fn pipeline_stack_name(environment: Environment, service: &str) -> String {
    format!("{environment}-{service}PipelineStack")
}

#[must_use]
pub fn service_stack_name(environment: Environment, service: &str) -> String {
    format!("{environment}-{service}Stack")
}

/// Fully assembled set of stacks and the descriptors behind them
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
    topologies: BTreeMap<Environment, Arc<NetworkTopology>>,
    services: Vec<ServiceDescriptor>,
    pipelines: Vec<PipelineDescriptor>,
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack; names are unique across the app
    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        if self.stack(stack.name()).is_some() {
            return Err(SynthError::DuplicateStack(stack.name().to_string()));
        }
        debug!(stack = %stack.name(), "Adding stack");
        self.stacks.push(stack);
        Ok(())
    }

    /// Record the topology of an environment; there is exactly one
    pub fn register_topology(
        &mut self,
        topology: NetworkTopology,
    ) -> Result<Arc<NetworkTopology>> {
        let environment = topology.environment;
        if self.topologies.contains_key(&environment) {
            return Err(SynthError::DuplicateNetwork(environment));
        }
        let shared = Arc::new(topology);
        self.topologies.insert(environment, Arc::clone(&shared));
        Ok(shared)
    }

    pub fn topology(&self, environment: Environment) -> Result<&Arc<NetworkTopology>> {
        self.topologies
            .get(&environment)
            .ok_or(SynthError::MissingNetwork(environment))
    }

    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    #[must_use]
    pub fn topologies(&self) -> &BTreeMap<Environment, Arc<NetworkTopology>> {
        &self.topologies
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    #[must_use]
    pub fn pipelines(&self) -> &[PipelineDescriptor] {
        &self.pipelines
    }

    #[must_use]
    pub fn service(&self, environment: Environment, name: &str) -> Option<&ServiceDescriptor> {
        self.services
            .iter()
            .find(|s| s.environment == environment && s.name == name)
    }

    #[must_use]
    pub fn pipeline(&self, environment: Environment, service: &str) -> Option<&PipelineDescriptor> {
        self.pipelines
            .iter()
            .find(|p| p.environment == environment && p.service == service)
    }

    /// Environments that have a topology, in order
    pub fn environments(&self) -> impl Iterator<Item = Environment> + '_ {
        self.topologies.keys().copied()
    }
}

/// Assemble every stack of the deployment description
pub fn compose(config: &AppConfig, registry: &EnvironmentRegistry) -> Result<App> {
    config.validate()?;
    let account = config.account.clone().ok_or_else(|| {
        SynthError::InvalidConfig(
            "no account configured (set `account` or AWS_ACCOUNT_ID)".to_string(),
        )
    })?;
    let region = config
        .region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let stack_env = StackEnv::new(account, region);

    info!(
        environments = config.environments.len(),
        env = %stack_env.uri(),
        "Composing app"
    );

    let mut app = App::new();
    for environment_config in &config.environments {
        compose_environment(&mut app, config, environment_config, registry, &stack_env)?;
    }
    Ok(app)
}

fn compose_environment(
    app: &mut App,
    config: &AppConfig,
    environment_config: &EnvironmentConfig,
    registry: &EnvironmentRegistry,
    stack_env: &StackEnv,
) -> Result<()> {
    let environment = environment_config.environment;
    let bundle = registry.lookup(environment)?;
    let network = &environment_config.network;

    let mut cluster_stack = Stack::new(cluster_stack_name(environment), stack_env.clone());
    cluster_stack.set_description(format!("Shared network and cluster for {environment}"));
    cluster_stack.tag("environment", environment.as_str());
    let topology = NetworkTopologyBuilder::new(&network.cidr, network.max_azs, environment)?
        .ingress_policy(network.ingress)
        .idle_timeout_secs(network.idle_timeout_secs)
        .domain(network.domain.clone())
        .build(&mut cluster_stack)?;
    let topology = app.register_topology(topology)?;
    app.add_stack(cluster_stack)?;

    let dockerhub = bundle.secrets.get(DOCKERHUB_CREDENTIALS_KEY).cloned();

    for service_config in &environment_config.services {
        info!(environment = %environment, service = %service_config.name, "Composing service");
        let pipeline = compose_pipeline(
            app,
            environment,
            service_config,
            &config.synth_source,
            dockerhub.clone(),
            &topology,
            stack_env,
        )?;

        let mut service_stack = Stack::new(
            service_stack_name(environment, &service_config.name),
            stack_env.clone(),
        );
        service_stack.set_description(format!(
            "Service {} for {environment}",
            service_config.name
        ));
        service_stack.tag("environment", environment.as_str());
        service_stack.add_dependency(&topology.stack_name);
        service_stack.add_dependency(&pipeline_stack_name(environment, &service_config.name));

        let secrets = bundle.select_secrets(environment, &service_config.secrets)?;
        let registry_config = bundle.select_config(environment, &service_config.config)?;

        let mut builder = ServiceDescriptorBuilder::new(
            service_config.name.clone(),
            environment,
            Arc::clone(&topology),
            pipeline.image.clone(),
        )
        .desired_count(service_config.desired_count)
        .max_capacity(service_config.max_capacity)
        .task_size(service_config.cpu, service_config.memory_mib)
        .app_name(config.app_name.clone())
        .secrets(secrets)
        .config(registry_config);

        for (name, value) in &service_config.environment {
            builder = builder.variable(name, value.as_str());
        }

        if let Some(storage_config) = service_config.storage {
            let storage = MediaStorageBuilder::new(environment)
                .public_read(storage_config.public_read)
                .build(&mut service_stack)?;
            for (name, value) in storage.variables {
                builder = builder.variable(&name, value);
            }
            for grant in storage.grants {
                builder = builder.task_grant(grant);
            }
        }

        let service = builder.build(&mut service_stack)?;
        app.pipelines.push(pipeline);
        app.services.push(service);
        app.add_stack(service_stack)?;
    }
    Ok(())
}

fn compose_pipeline(
    app: &mut App,
    environment: Environment,
    service_config: &ServiceConfig,
    synth_source: &SynthSourceConfig,
    dockerhub: Option<crate::environment::SecretRef>,
    topology: &NetworkTopology,
    stack_env: &StackEnv,
) -> Result<PipelineDescriptor> {
    let service = &service_config.name;
    let target_stack = service_stack_name(environment, service);
    let deploy_target = match service_config.deploy {
        DeployMode::CloudFormation => DeployTarget::CloudFormation {
            stack_name: target_stack.clone(),
        },
        DeployMode::Ecs => DeployTarget::EcsService {
            cluster_name: topology.cluster_name.clone(),
            service_name: format!("{environment}-{service}"),
        },
    };

    let mut stack = Stack::new(pipeline_stack_name(environment, service), stack_env.clone());
    stack.set_description(format!("Delivery pipeline for {service} in {environment}"));
    stack.tag("environment", environment.as_str());
    if service_config.deploy == DeployMode::Ecs {
        stack.add_dependency(&topology.stack_name);
    }

    let pipeline = PipelineDescriptorBuilder::new(
        environment,
        service.clone(),
        target_stack,
        service_config.source.clone(),
    )
    .infra_source(service_config.infra_source.clone())
    .deploy_target(deploy_target)
    .dockerhub_credentials(dockerhub)
    .synth_source(synth_source.clone())
    .synth_variable("AWS_ACCOUNT_ID", stack_env.account.clone())
    .synth_variable("AWS_REGION", stack_env.region.clone())
    .build(&mut stack)?;

    app.add_stack(stack)?;
    Ok(pipeline)
}

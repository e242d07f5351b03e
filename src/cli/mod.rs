//! # stack-synth CLI
//!
//! ```bash
//! # Write every template plus manifest.json into cdk.out
//! stack-synth synth
//!
//! # Only the prod stacks, from a deployment description
//! stack-synth --config deploy.yaml synth --environment prod --output-dir out
//!
//! # Stacks in deploy order
//! stack-synth list
//!
//! # Secrets (identifiers only) and config of an environment
//! stack-synth env dev
//!
//! # JSON Schema of the deployment description
//! stack-synth schema
//!
//! # What the docker build does after pushing
//! stack-synth publish-image-tag dev api 3f9c2e1
//!
//! # Image a service would run with
//! stack-synth resolve-image dev api
//! ```

mod env;
mod image;
mod list;
mod schema;
mod synth;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stack_synth::config::{AppConfig, SynthConfig};
use stack_synth::environment::{Environment, EnvironmentRegistry};
use std::path::PathBuf;
use tracing::debug;

/// Synthesizes CloudFormation templates for Fargate services and their
/// pipelines
#[derive(Debug, Parser)]
#[command(name = "stack-synth", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment description (YAML); overrides SYNTH_CONFIG_PATH
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment registry (YAML); overrides SYNTH_REGISTRY_PATH
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Log level; overrides LOG_LEVEL
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write templates and manifest.json
    Synth {
        /// Output directory; overrides SYNTH_OUTPUT_DIR
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only synthesize the stacks of one environment
        #[arg(short, long, value_enum)]
        environment: Option<Environment>,
    },
    /// List stacks in deploy order
    List {
        #[arg(short, long, value_enum)]
        environment: Option<Environment>,
    },
    /// Show the secrets and config bundle of an environment
    Env {
        #[arg(value_enum)]
        environment: Environment,
    },
    /// Print the JSON Schema of the deployment description
    Schema,
    /// Write an image tag to the service's parameter in SSM
    PublishImageTag {
        #[arg(value_enum)]
        environment: Environment,
        service: String,
        tag: String,
        /// Parameter name; defaults to /<env>/<service>/app-imagetag
        #[arg(long)]
        parameter: Option<String>,
    },
    /// Resolve a service's deferred image against a tag or SSM
    ResolveImage {
        #[arg(value_enum)]
        environment: Environment,
        service: String,
        /// Tag to bind; read from SSM when unset
        #[arg(long)]
        tag: Option<String>,
    },
}

impl Cli {
    /// Fold command-line overrides into the environment configuration
    pub fn apply(&self, config: &mut SynthConfig) {
        if let Some(path) = &self.config {
            config.config_path = Some(path.clone());
        }
        if let Some(path) = &self.registry {
            config.registry_path = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Commands::Synth {
            output_dir: Some(dir),
            ..
        } = &self.command
        {
            config.output_dir.clone_from(dir);
        }
    }
}

/// Deployment description from file or the built-in default
pub fn load_app_config(config: &SynthConfig) -> Result<AppConfig> {
    let app_config = match &config.config_path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load deployment description {}", path.display()))?,
        None => {
            debug!("Using built-in deployment description");
            AppConfig::builtin()
        }
    };
    Ok(app_config
        .with_defaults(config.account.as_deref(), &config.region)
        .with_synth_source(config.config_path.as_deref(), config.registry_path.as_deref()))
}

pub fn load_registry(path: Option<&PathBuf>) -> Result<EnvironmentRegistry> {
    let Some(path) = path else {
        return Ok(EnvironmentRegistry::builtin());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry {}", path.display()))?;
    EnvironmentRegistry::from_yaml(&content)
        .with_context(|| format!("Failed to parse registry {}", path.display()))
}

pub async fn run(cli: Cli, config: &SynthConfig) -> Result<()> {
    let registry_path = config.registry_path.clone();
    match cli.command {
        Commands::Synth { environment, .. } => {
            let registry = load_registry(registry_path.as_ref())?;
            synth::synth_command(config, &registry, environment)
        }
        Commands::List { environment } => {
            let registry = load_registry(registry_path.as_ref())?;
            list::list_command(config, &registry, environment)
        }
        Commands::Env { environment } => {
            let registry = load_registry(registry_path.as_ref())?;
            env::env_command(&registry, environment)
        }
        Commands::Schema => schema::schema_command(),
        Commands::PublishImageTag {
            environment,
            service,
            tag,
            parameter,
        } => image::publish_command(config, environment, &service, &tag, parameter).await,
        Commands::ResolveImage {
            environment,
            service,
            tag,
        } => {
            let registry = load_registry(registry_path.as_ref())?;
            image::resolve_command(config, &registry, environment, &service, tag).await
        }
    }
}

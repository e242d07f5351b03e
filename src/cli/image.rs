//! # Image Commands
//!
//! The two halves of the deferred image hand-off: publishing the tag a build
//! pushed, and resolving a service's locator against it.

use super::load_app_config;
use anyhow::{Context, Result};
use stack_synth::composition::compose;
use stack_synth::config::SynthConfig;
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::image::{publish_tag, resolve_from_channel, ParameterBindings, SsmParameterChannel};
use stack_synth::pipeline::tag_parameter_name;
use tracing::info;

pub async fn publish_command(
    config: &SynthConfig,
    environment: Environment,
    service: &str,
    tag: &str,
    parameter: Option<String>,
) -> Result<()> {
    let parameter = parameter.unwrap_or_else(|| tag_parameter_name(environment, service));
    let channel = SsmParameterChannel::new(&config.region).await;
    publish_tag(&channel, &parameter, tag).await?;
    println!("{parameter} = {tag}");
    Ok(())
}

pub async fn resolve_command(
    config: &SynthConfig,
    registry: &EnvironmentRegistry,
    environment: Environment,
    service: &str,
    tag: Option<String>,
) -> Result<()> {
    let app = compose(&load_app_config(config)?, registry).context("Failed to compose stacks")?;
    let descriptor = app
        .service(environment, service)
        .with_context(|| format!("No service '{service}' in '{environment}'"))?;
    let locator = descriptor.locator.clone();
    info!(locator = %locator, "Resolving image");

    let resolved = if let Some(tag) = tag {
        let mut bindings = ParameterBindings::new();
        bindings.insert(locator.parameter().as_str().to_string(), tag);
        locator.resolve(&bindings)?
    } else {
        let pipeline = app
            .pipeline(environment, service)
            .with_context(|| format!("No pipeline for '{service}' in '{environment}'"))?;
        let channel = SsmParameterChannel::new(&config.region).await;
        resolve_from_channel(locator, &channel, &pipeline.tag_parameter).await?
    };
    println!("{resolved}");
    Ok(())
}

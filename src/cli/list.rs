//! # List Command

use super::load_app_config;
use anyhow::{Context, Result};
use stack_synth::composition::compose;
use stack_synth::config::SynthConfig;
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::synth::synthesize;

/// Print stacks in deploy order
pub fn list_command(
    config: &SynthConfig,
    registry: &EnvironmentRegistry,
    environment: Option<Environment>,
) -> Result<()> {
    let app = compose(&load_app_config(config)?, registry).context("Failed to compose stacks")?;
    let synthesis = synthesize(&app, environment).context("Failed to synthesize stacks")?;

    println!(
        "{:<32} {:<12} {:<10} DEPENDS ON",
        "STACK", "ENVIRONMENT", "RESOURCES"
    );
    println!("{}", "-".repeat(80));
    for stack in synthesis.stacks() {
        let dependencies = stack
            .dependencies
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<32} {:<12} {:<10} {}",
            stack.name,
            stack.environment.as_deref().unwrap_or("-"),
            stack.template.resources.len(),
            if dependencies.is_empty() { "-" } else { dependencies.as_str() }
        );
    }
    Ok(())
}

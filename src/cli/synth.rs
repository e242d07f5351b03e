//! # Synth Command

use super::load_app_config;
use anyhow::{Context, Result};
use stack_synth::composition::compose;
use stack_synth::config::SynthConfig;
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::synth::synthesize;

pub fn synth_command(
    config: &SynthConfig,
    registry: &EnvironmentRegistry,
    environment: Option<Environment>,
) -> Result<()> {
    let app_config = load_app_config(config)?;
    let app = compose(&app_config, registry).context("Failed to compose stacks")?;
    let synthesis = synthesize(&app, environment).context("Failed to synthesize stacks")?;
    let written = synthesis
        .write(&config.output_dir)
        .with_context(|| format!("Failed to write {}", config.output_dir.display()))?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

//! # Schema Command

use anyhow::{Context, Result};
use stack_synth::config::AppConfig;

pub fn schema_command() -> Result<()> {
    let schema = AppConfig::json_schema().context("Failed to generate schema")?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

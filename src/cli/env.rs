//! # Env Command
//!
//! Secrets print as Secrets Manager identifiers; values never leave the
//! secret store.

use anyhow::Result;
use stack_synth::environment::{Environment, EnvironmentRegistry};

pub fn env_command(registry: &EnvironmentRegistry, environment: Environment) -> Result<()> {
    let bundle = registry.lookup(environment)?;
    println!("Environment: {environment} (namespace {})", environment.namespace());
    println!("\nSecrets:");
    for (name, secret) in &bundle.secrets {
        println!("  {name:<28} {}", secret.id());
    }
    println!("\nConfig:");
    for (name, value) in &bundle.config {
        println!("  {name:<28} {value}");
    }
    Ok(())
}

//! # stack-synth
//!
//! Command-line entry point; see [`cli`] for the subcommands.

mod cli;

use anyhow::Result;
use clap::Parser;
use stack_synth::config::SynthConfig;
use stack_synth::observability::init_logging;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let mut config = SynthConfig::from_env();
    cli.apply(&mut config);
    init_logging(&config);

    debug!(
        "Build info: version={}, datetime={}, git_hash={}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    cli::run(cli, &config).await
}

//! # Configuration
//!
//! - [`SynthConfig`]: process settings from environment variables
//! - [`AppConfig`]: the deployment description (environments, networks,
//!   services), from YAML or built in

mod app;
mod synth;

pub use app::{
    AppConfig, DeployMode, EnvironmentConfig, NetworkConfig, ServiceConfig, StorageConfig,
};
pub use synth::SynthConfig;

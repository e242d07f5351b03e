//! Stack Synthesizer Library
//!
//! Builds a typed graph of AWS resources for containerized services (shared
//! network, Fargate services, build-and-deploy pipelines, media storage) and
//! synthesizes it into CloudFormation templates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stack_synth::prelude::*;
//!
//! # fn main() -> Result<(), SynthError> {
//! let config = AppConfig::builtin().with_defaults(Some("123456789012"), "us-east-1");
//! let app = compose(&config, &EnvironmentRegistry::builtin())?;
//! synthesize(&app, None)?.write(std::path::Path::new("cdk.out"))?;
//! # Ok(())
//! # }
//! ```

pub mod buildspec;
pub mod composition;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod iam;
pub mod image;
pub mod network;
pub mod observability;
pub mod pipeline;
pub mod prelude;
pub mod service;
pub mod storage;
pub mod synth;
pub mod template;

//! # Prelude
//!
//! Re-exports commonly used types for convenience.
//!
//! ```rust
//! use stack_synth::prelude::*;
//! ```

// Composition and synthesis entry points
pub use crate::composition::{compose, App};
pub use crate::synth::{synthesize, Manifest, Synthesis};

// Configuration
pub use crate::config::{AppConfig, DeployMode, ServiceConfig, SynthConfig};
pub use crate::environment::{Environment, EnvironmentRegistry, SecretRef};

// Descriptors
pub use crate::image::{DeferredImage, ImageLocator, ParameterChannel, ResolvedImage};
pub use crate::network::{DomainConfig, IngressPolicy, NetworkTopology, NetworkTopologyBuilder};
pub use crate::pipeline::{
    PipelineDescriptor, PipelineDescriptorBuilder, StageKind, SynthSourceConfig,
};
pub use crate::service::{AutoscalingBounds, ServiceDescriptor, ServiceDescriptorBuilder};

// Template model
pub use crate::template::{Expr, LogicalId, Stack, StackEnv, Template};

pub use crate::error::{Result, SynthError};

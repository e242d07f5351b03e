//! # Constants
//!
//! Shared constants used throughout the synthesizer.
//!
//! These values mirror the deployed topology and can be overridden via
//! the app configuration where applicable.

/// Port every service container listens on, and the target group port
pub const DEFAULT_SERVICE_PORT: u16 = 80;

/// SSM parameter the docker build writes the freshly pushed image tag to
pub const SSM_IMAGE_TAG_PARAM_NAME: &str = "app-imagetag";

/// Tag used by the image parameter until the first pipeline run overrides it
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Application prefix for log streams (`<prefix>-<env>/<service>`)
pub const DEFAULT_APP_NAME: &str = "app";

/// Fargate task CPU units
pub const DEFAULT_TASK_CPU: u32 = 256;

/// Fargate task memory (MiB)
pub const DEFAULT_TASK_MEMORY_MIB: u32 = 512;

/// Upper autoscaling bound when a service does not set one
pub const DEFAULT_MAX_CAPACITY: u32 = 2;

/// CPU utilization the target-tracking policy aims for (percent)
pub const DEFAULT_CPU_TARGET_PERCENT: u32 = 60;

/// Cooldown applied to both scale-in and scale-out (seconds)
pub const SCALING_COOLDOWN_SECS: u32 = 300;

/// Application load balancer idle timeout (seconds)
pub const LOAD_BALANCER_IDLE_TIMEOUT_SECS: u32 = 3600;

/// CodeBuild project timeout (minutes)
pub const BUILD_TIMEOUT_MINUTES: u32 = 10;

/// CodeBuild managed image used by both build projects
pub const CODEBUILD_IMAGE: &str = "aws/codebuild/standard:6.0";

/// Days container logs are retained
pub const LOG_RETENTION_DAYS: u32 = 30;

/// CloudFormation template format version
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Smallest subnet AWS allows inside a VPC
pub const MIN_SUBNET_PREFIX: u8 = 28;

/// Default VPC block for the built-in configuration
pub const DEFAULT_VPC_CIDR: &str = "10.1.0.0/20";

/// Default number of availability zones
pub const DEFAULT_MAX_AZS: u8 = 2;

/// File the docker build writes the image tag into
pub const IMAGE_TAG_FILE: &str = "imageTag.json";

/// Key inside [`IMAGE_TAG_FILE`]
pub const IMAGE_TAG_KEY: &str = "imageTag";

/// ECS image definitions file consumed by the ECS deploy action
pub const IMAGE_DEFINITIONS_FILE: &str = "imagedefinitions.json";

/// Managed CloudFront cache policy `CachingOptimized`
pub const CLOUDFRONT_CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// Default output directory for synthesized templates
pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";

/// Region stacks deploy into when neither the description nor `AWS_REGION`
/// names one
pub const DEFAULT_REGION: &str = "us-east-1";

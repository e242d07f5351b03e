//! # Parameter Channel
//!
//! The named parameter through which the build stage hands the image tag to
//! the deploy stage. In production this is an SSM Parameter Store entry the
//! docker build overwrites on every run.

use super::locator::{ImageLocator, ParameterBindings, ResolvedImage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ssm::Client as SsmClient;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Write-then-read store for deploy-time parameters
#[async_trait]
pub trait ParameterChannel: Send + Sync {
    /// Create or overwrite a parameter
    async fn put(&self, name: &str, value: &str) -> Result<()>;

    /// Current value, `None` when the parameter was never written
    async fn get(&self, name: &str) -> Result<Option<String>>;
}

/// Process-local channel used by tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryParameterChannel {
    values: Mutex<BTreeMap<String, String>>,
}

impl InMemoryParameterChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParameterChannel for InMemoryParameterChannel {
    async fn put(&self, name: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| anyhow::anyhow!("parameter channel lock poisoned: {e}"))?;
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| anyhow::anyhow!("parameter channel lock poisoned: {e}"))?;
        Ok(values.get(name).cloned())
    }
}

/// SSM Parameter Store channel
pub struct SsmParameterChannel {
    client: SsmClient,
    region: String,
}

impl std::fmt::Debug for SsmParameterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsmParameterChannel")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SsmParameterChannel {
    /// Client on the default credential chain for `region`
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::from_client(SsmClient::new(&sdk_config), region)
    }

    #[must_use]
    pub fn from_client(client: SsmClient, region: &str) -> Self {
        Self {
            client,
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl ParameterChannel for SsmParameterChannel {
    async fn put(&self, name: &str, value: &str) -> Result<()> {
        info!(parameter = %name, region = %self.region, "Publishing SSM parameter");
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(aws_sdk_ssm::types::ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .with_context(|| format!("Failed to put SSM parameter {name}"))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_parameter().name(name).send().await {
            Ok(response) => Ok(response
                .parameter()
                .and_then(|p| p.value())
                .map(ToString::to_string)),
            Err(e) => {
                if e.as_service_error()
                    .is_some_and(aws_sdk_ssm::operation::get_parameter::GetParameterError::is_parameter_not_found)
                {
                    debug!(parameter = %name, "SSM parameter not found");
                    Ok(None)
                } else {
                    Err(anyhow::anyhow!("Failed to get SSM parameter {name}: {e}"))
                }
            }
        }
    }
}

/// Publish a freshly pushed image tag, as the docker build does
pub async fn publish_tag(channel: &dyn ParameterChannel, parameter: &str, tag: &str) -> Result<()> {
    let tag = tag.trim();
    if tag.is_empty() {
        anyhow::bail!("refusing to publish an empty image tag to {parameter}");
    }
    channel.put(parameter, tag).await?;
    info!(parameter = %parameter, tag = %tag, "Published image tag");
    Ok(())
}

/// Resolve `locator` against the tag currently held in `parameter`
///
/// A parameter that was never written leaves the locator's default in
/// place.
pub async fn resolve_from_channel(
    locator: ImageLocator,
    channel: &dyn ParameterChannel,
    parameter: &str,
) -> Result<ResolvedImage> {
    let mut bindings = ParameterBindings::new();
    if let Some(tag) = channel.get(parameter).await? {
        bindings.insert(locator.parameter().as_str().to_string(), tag);
    }
    let resolved = locator
        .resolve(&bindings)
        .with_context(|| format!("Failed to resolve image from {parameter}"))?;
    debug!(image = %resolved, "Resolved image");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::LogicalId;

    fn locator(default: Option<&str>) -> ImageLocator {
        ImageLocator::new(
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api".to_string(),
            LogicalId::new("apiPipelineParam").unwrap(),
            default.map(ToString::to_string),
        )
    }

    #[tokio::test]
    async fn published_tag_resolves_locator() {
        let channel = InMemoryParameterChannel::new();
        publish_tag(&channel, "/dev/api/app-imagetag", "3f9c2e1").await.unwrap();
        let resolved = resolve_from_channel(locator(None), &channel, "/dev/api/app-imagetag")
            .await
            .unwrap();
        assert_eq!(resolved.tag(), "3f9c2e1");
        assert_eq!(
            resolved.to_string(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api:3f9c2e1"
        );
    }

    #[tokio::test]
    async fn unpublished_parameter_needs_a_default() {
        let channel = InMemoryParameterChannel::new();
        let resolved = resolve_from_channel(locator(Some("latest")), &channel, "/dev/api/app-imagetag")
            .await
            .unwrap();
        assert_eq!(resolved.tag(), "latest");
        assert!(resolve_from_channel(locator(None), &channel, "/dev/api/app-imagetag")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn empty_tag_is_not_published() {
        let channel = InMemoryParameterChannel::new();
        assert!(publish_tag(&channel, "/dev/api/app-imagetag", "  ").await.is_err());
        assert_eq!(channel.get("/dev/api/app-imagetag").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_channel_overwrites() {
        let channel = InMemoryParameterChannel::new();
        assert_eq!(channel.get("app-imagetag").await.unwrap(), None);
        channel.put("app-imagetag", "abc123").await.unwrap();
        channel.put("app-imagetag", "def456").await.unwrap();
        assert_eq!(
            channel.get("app-imagetag").await.unwrap().as_deref(),
            Some("def456")
        );
    }
}

//! # Deferred Image Reference
//!
//! Task definitions are declared before the build that produces their image
//! has run. Instead of a concrete image string they bind to an
//! [`ImageLocator`]: the repository URI plus a placeholder naming a template
//! parameter. The pipeline's deploy stage fills that parameter with the tag
//! the docker build published.
//!
//! ```text
//! DeferredImage ── bind ──> ImageLocator ── resolve(bindings) ──> ResolvedImage
//!                              │
//!                              └─ to_expr() -> Fn::Join [uri, ":", Ref param]
//! ```

mod channel;
mod locator;

pub use channel::{
    publish_tag, resolve_from_channel, InMemoryParameterChannel, ParameterChannel,
    SsmParameterChannel,
};
pub use locator::{ImageLocator, ParameterBindings, ResolvedImage};

use crate::constants::DEFAULT_IMAGE_TAG;
use crate::environment::Environment;
use crate::error::Result;
use crate::iam::{ecr_pull, Role};
use crate::template::{Expr, LogicalId, Parameter, Stack, StackEnv};
use tracing::debug;

/// An ECR repository, addressed without a cross-stack import
///
/// The URI and ARN are derived from the account, region and name, so a
/// service stack can reference the pipeline's repository as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRepository {
    name: String,
    account: String,
    region: String,
}

impl ImageRepository {
    pub fn new(name: impl Into<String>, env: &StackEnv) -> Self {
        Self {
            name: name.into(),
            account: env.account.clone(),
            region: env.region.clone(),
        }
    }

    /// Repository holding `service` images in `environment` (`<env>-<service>`)
    #[must_use]
    pub fn for_service(environment: Environment, service: &str, env: &StackEnv) -> Self {
        Self::new(format!("{environment}-{service}"), env)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<account>.dkr.ecr.<region>.amazonaws.com/<name>`
    #[must_use]
    pub fn uri(&self) -> String {
        format!(
            "{}.dkr.ecr.{}.amazonaws.com/{}",
            self.account, self.region, self.name
        )
    }

    #[must_use]
    pub fn uri_for_tag(&self, tag: &str) -> String {
        format!("{}:{tag}", self.uri())
    }

    #[must_use]
    pub fn arn(&self) -> Expr {
        Expr::sub(format!(
            "arn:${{AWS::Partition}}:ecr:{}:{}:repository/{}",
            self.region, self.account, self.name
        ))
    }
}

/// Image whose tag is supplied at deploy time
#[derive(Debug, Clone)]
pub struct DeferredImage {
    repository: ImageRepository,
    default_tag: String,
}

impl DeferredImage {
    #[must_use]
    pub fn new(repository: ImageRepository) -> Self {
        Self {
            repository,
            default_tag: DEFAULT_IMAGE_TAG.to_string(),
        }
    }

    /// Tag used until a deployment overrides the parameter
    #[must_use]
    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    #[must_use]
    pub fn repository(&self) -> &ImageRepository {
        &self.repository
    }

    /// Logical id of the tag parameter a container named `container` gets
    ///
    /// Known before binding so the pipeline can name it in its parameter
    /// overrides.
    pub fn param_name(container: &str) -> Result<LogicalId> {
        LogicalId::from_path(&[container, "PipelineParam"])
    }

    /// Declare the tag parameter in `stack` and grant `execution_role` pull
    /// access to the repository
    pub fn bind(
        &self,
        stack: &mut Stack,
        container: &str,
        execution_role: &mut Role,
    ) -> Result<ImageLocator> {
        let parameter = stack.add_parameter(
            Self::param_name(container)?,
            Parameter::string(Some(self.default_tag.as_str())).description(format!(
                "Image tag of {} supplied by the deploy stage",
                self.repository.name
            )),
        )?;
        execution_role.add_to_policy(ecr_pull(self.repository.arn()));
        debug!(
            stack = %stack.name(),
            repository = %self.repository.name,
            parameter = %parameter,
            "Bound deferred image"
        );
        Ok(ImageLocator::new(
            self.repository.uri(),
            parameter,
            Some(self.default_tag.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> StackEnv {
        StackEnv::new("123456789012", "us-east-1")
    }

    #[test]
    fn repository_uri_and_arn() {
        let repo = ImageRepository::for_service(Environment::Dev, "api", &env());
        assert_eq!(repo.name(), "dev-api");
        assert_eq!(
            repo.uri(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/dev-api"
        );
        assert_eq!(
            repo.arn(),
            Expr::sub("arn:${AWS::Partition}:ecr:us-east-1:123456789012:repository/dev-api")
        );
    }

    #[test]
    fn bind_declares_parameter_and_grants_pull() {
        let mut stack = Stack::new("dev-apiStack", env());
        let mut role = Role::new(&["TaskDef", "ExecutionRole"], "ecs-tasks.amazonaws.com");
        let image = DeferredImage::new(ImageRepository::for_service(Environment::Dev, "api", &env()));
        let locator = image.bind(&mut stack, "api", &mut role).unwrap();

        let param = DeferredImage::param_name("api").unwrap();
        assert_eq!(locator.parameter(), &param);
        let declared = &stack.template().parameters[&param];
        assert_eq!(declared.parameter_type, "String");
        assert_eq!(declared.default.as_deref(), Some(DEFAULT_IMAGE_TAG));
        assert!(role.is_allowed("ecr:BatchGetImage"));
    }

    #[test]
    fn binding_twice_in_one_stack_fails() {
        let mut stack = Stack::new("dev-apiStack", env());
        let mut role = Role::new(&["Exec"], "ecs-tasks.amazonaws.com");
        let image = DeferredImage::new(ImageRepository::for_service(Environment::Dev, "api", &env()));
        image.bind(&mut stack, "api", &mut role).unwrap();
        assert!(image.bind(&mut stack, "api", &mut role).is_err());
    }
}

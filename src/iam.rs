//! # IAM
//!
//! Roles, policy statements and the grant helpers the descriptors use.
//!
//! Grants are declarative permission requests: they end up in the template
//! and are evaluated by IAM, never by this crate.

use crate::error::Result;
use crate::template::{Expr, LogicalId, Resource, Stack};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One IAM policy statement
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
}

impl PolicyStatement {
    pub fn allow<I, S>(actions: I, resources: Vec<Expr>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.effect == Effect::Allow && self.actions.iter().any(|a| a == action)
    }

    #[must_use]
    pub fn to_expr(&self) -> Expr {
        let effect = match self.effect {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            many => Expr::List(many.to_vec()),
        };
        let action = match self.actions.as_slice() {
            [single] => Expr::str(single),
            many => Expr::list(many.iter().map(Expr::str)),
        };
        Expr::object([
            ("Effect", Expr::str(effect)),
            ("Action", action),
            ("Resource", resource),
        ])
    }
}

#[must_use]
pub fn policy_document(statements: &[PolicyStatement]) -> Expr {
    Expr::object([
        ("Version", Expr::str("2012-10-17")),
        (
            "Statement",
            Expr::list(statements.iter().map(PolicyStatement::to_expr)),
        ),
    ])
}

/// Read a Secrets Manager secret
#[must_use]
pub fn secret_read(secret_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(
        ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
        vec![secret_arn],
    )
}

/// Pull images from one repository
#[must_use]
pub fn ecr_pull(repository_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(
        [
            "ecr:BatchCheckLayerAvailability",
            "ecr:GetDownloadUrlForLayer",
            "ecr:BatchGetImage",
        ],
        vec![repository_arn],
    )
}

/// Pull and push images to one repository
#[must_use]
pub fn ecr_pull_push(repository_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(
        [
            "ecr:BatchCheckLayerAvailability",
            "ecr:GetDownloadUrlForLayer",
            "ecr:BatchGetImage",
            "ecr:PutImage",
            "ecr:InitiateLayerUpload",
            "ecr:UploadLayerPart",
            "ecr:CompleteLayerUpload",
        ],
        vec![repository_arn],
    )
}

/// Registry login; the token action cannot be scoped to a repository
#[must_use]
pub fn ecr_auth_token() -> PolicyStatement {
    PolicyStatement::allow(["ecr:GetAuthorizationToken"], vec![Expr::str("*")])
}

/// Overwrite a single SSM parameter
#[must_use]
pub fn ssm_put_parameter(parameter_name: &str) -> PolicyStatement {
    PolicyStatement::allow(
        ["ssm:PutParameter"],
        vec![Expr::sub(format!(
            "arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter/{}",
            parameter_name.trim_start_matches('/')
        ))],
    )
}

/// Read and write objects of one bucket
#[must_use]
pub fn s3_read_write(bucket_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(
        [
            "s3:GetObject*",
            "s3:GetBucket*",
            "s3:List*",
            "s3:PutObject",
            "s3:Abort*",
            "s3:DeleteObject*",
        ],
        vec![bucket_arn.clone(), Expr::join("", vec![bucket_arn, Expr::str("/*")])],
    )
}

/// Receive and delete messages of one queue
#[must_use]
pub fn sqs_consume(queue_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(
        [
            "sqs:ReceiveMessage",
            "sqs:ChangeMessageVisibility",
            "sqs:GetQueueUrl",
            "sqs:DeleteMessage",
            "sqs:GetQueueAttributes",
        ],
        vec![queue_arn],
    )
}

/// Log groups CodeBuild creates for a project
#[must_use]
pub fn codebuild_logs(project_name: &str) -> PolicyStatement {
    PolicyStatement::allow(
        ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
        vec![
            Expr::sub(format!(
                "arn:${{AWS::Partition}}:logs:${{AWS::Region}}:${{AWS::AccountId}}:log-group:/aws/codebuild/{project_name}"
            )),
            Expr::sub(format!(
                "arn:${{AWS::Partition}}:logs:${{AWS::Region}}:${{AWS::AccountId}}:log-group:/aws/codebuild/{project_name}:*"
            )),
        ],
    )
}

/// Start and watch builds of the given projects
#[must_use]
pub fn codebuild_start(project_arns: Vec<Expr>) -> PolicyStatement {
    PolicyStatement::allow(
        ["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"],
        project_arns,
    )
}

/// Use a CodeStar connection as a pipeline source
#[must_use]
pub fn codestar_use_connection(connection_arn: &str) -> PolicyStatement {
    PolicyStatement::allow(["codestar-connections:UseConnection"], vec![Expr::str(connection_arn)])
}

/// Hand a role to another service
#[must_use]
pub fn pass_role(role_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(["iam:PassRole"], vec![role_arn])
}

/// Write to one CloudWatch log group
#[must_use]
pub fn logs_write(log_group_arn: Expr) -> PolicyStatement {
    PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"], vec![log_group_arn])
}

/// A role under construction; rendered by [`Role::attach`]
#[derive(Debug, Clone)]
pub struct Role {
    path: Vec<String>,
    service_principal: String,
    managed_policy_arns: Vec<Expr>,
    statements: Vec<PolicyStatement>,
}

impl Role {
    /// Role assumable by an AWS service principal (e.g. `ecs-tasks.amazonaws.com`)
    pub fn new(path: &[&str], service_principal: impl Into<String>) -> Self {
        Self {
            path: path.iter().map(|s| (*s).to_string()).collect(),
            service_principal: service_principal.into(),
            managed_policy_arns: Vec::new(),
            statements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_managed_policy(mut self, arn: Expr) -> Self {
        self.managed_policy_arns.push(arn);
        self
    }

    /// Logical id the role resource will get
    pub fn logical_id(&self) -> Result<LogicalId> {
        LogicalId::from_path(&self.path_refs())
    }

    pub fn arn(&self) -> Result<Expr> {
        Ok(Expr::get_att(&self.logical_id()?, "Arn"))
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    #[must_use]
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    #[must_use]
    pub fn is_allowed(&self, action: &str) -> bool {
        self.statements.iter().any(|s| s.allows(action))
    }

    /// Add the role and its default policy to a stack
    ///
    /// Returns the role's logical id and, when the role carries inline
    /// statements, the policy's logical id (resources using the role should
    /// depend on it).
    pub fn attach(&self, stack: &mut Stack) -> Result<(LogicalId, Option<LogicalId>)> {
        let assume = Expr::object([
            ("Version", Expr::str("2012-10-17")),
            (
                "Statement",
                Expr::list([Expr::object([
                    ("Effect", Expr::str("Allow")),
                    ("Action", Expr::str("sts:AssumeRole")),
                    (
                        "Principal",
                        Expr::object([("Service", Expr::str(&self.service_principal))]),
                    ),
                ])]),
            ),
        ]);
        let mut role = Resource::new("AWS::IAM::Role").property("AssumeRolePolicyDocument", assume);
        if !self.managed_policy_arns.is_empty() {
            role = role.property("ManagedPolicyArns", Expr::List(self.managed_policy_arns.clone()));
        }
        let role_id = stack.add(&self.path_refs(), role)?;

        if self.statements.is_empty() {
            return Ok((role_id, None));
        }
        let mut policy_path = self.path_refs();
        policy_path.push("DefaultPolicy");
        let policy_id = LogicalId::from_path(&policy_path)?;
        let policy = Resource::new("AWS::IAM::Policy")
            .property("PolicyName", Expr::str(policy_id.as_str()))
            .property("PolicyDocument", policy_document(&self.statements))
            .property("Roles", Expr::list([Expr::reference(&role_id)]));
        let policy_id = stack.add_resource(policy_id, policy)?;
        Ok((role_id, Some(policy_id)))
    }

    fn path_refs(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StackEnv;

    #[test]
    fn single_action_statement_renders_scalar() {
        let statement = ecr_auth_token().to_expr().to_json();
        assert_eq!(statement["Action"], "ecr:GetAuthorizationToken");
        assert_eq!(statement["Resource"], "*");
    }

    #[test]
    fn attach_creates_role_and_default_policy() {
        let mut stack = Stack::new("s", StackEnv::new("1", "us-east-1"));
        let mut role = Role::new(&["Build", "Role"], "codebuild.amazonaws.com");
        role.add_to_policy(ecr_auth_token());
        role.add_to_policy(ecr_auth_token());
        let (role_id, policy_id) = role.attach(&mut stack).unwrap();
        let policy = stack.resource(&policy_id.unwrap()).unwrap();
        let doc = policy.get("PolicyDocument").unwrap().to_json();
        assert_eq!(doc["Statement"].as_array().unwrap().len(), 1, "deduplicated");
        assert_eq!(
            policy.get("Roles").unwrap().to_json(),
            serde_json::json!([{ "Ref": role_id.as_str() }])
        );
    }

    #[test]
    fn role_without_statements_has_no_policy() {
        let mut stack = Stack::new("s", StackEnv::new("1", "us-east-1"));
        let role = Role::new(&["Task", "Role"], "ecs-tasks.amazonaws.com");
        let (_, policy) = role.attach(&mut stack).unwrap();
        assert!(policy.is_none());
    }
}

//! # Media Storage
//!
//! Buckets for customer uploads and processed media, the upload queues fed
//! by S3 notifications, and CloudFront distributions in front of the
//! buckets that are served to clients.
//!
//! Buckets are private by default and reached through an origin access
//! identity. Public read is opt-in.

use crate::constants::CLOUDFRONT_CACHING_OPTIMIZED_POLICY_ID;
use crate::environment::Environment;
use crate::error::Result;
use crate::iam::{s3_read_write, sqs_consume, PolicyStatement};
use crate::template::{DeletionPolicy, Expr, LogicalId, Resource, Stack};
use std::collections::BTreeMap;
use tracing::{info, warn};

struct BucketLayout {
    id: &'static str,
    variable: &'static str,
    queue: Option<(&'static str, &'static str)>,
    distribution: Option<(&'static str, &'static str)>,
}

const MEDIA_BUCKETS: &[BucketLayout] = &[
    BucketLayout {
        id: "CustomerImage",
        variable: "IMAGE_BUCKET_NAME",
        queue: None,
        distribution: Some(("customerImageDist", "IMAGE_DISTRIBUTION_BASE_URL")),
    },
    BucketLayout {
        id: "CustomerVideo",
        variable: "VIDEO_BUCKET_NAME",
        queue: Some(("VideoUploaded", "VIDEO_UPLOADED_QUEUE")),
        distribution: None,
    },
    BucketLayout {
        id: "OptimizedVideo",
        variable: "OPTIMIZED_VIDEO_BUCKET_NAME",
        queue: Some(("OptimizedVideoUploaded", "OPTIMIZED_VIDEO_UPLOADED_QUEUE")),
        distribution: Some(("optimizedVideoDist", "OPTIMIZED_VIDEO_DISTRIBUTION_BASE_URL")),
    },
    BucketLayout {
        id: "VideoThumbnails",
        variable: "THUMBNAIL_BUCKET_NAME",
        queue: Some(("ThumbnailUploaded", "THUMBNAIL_UPLOADED_QUEUE")),
        distribution: None,
    },
];

#[derive(Debug, Clone)]
pub struct MediaStorageBuilder {
    environment: Environment,
    public_read: bool,
}

impl MediaStorageBuilder {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            public_read: false,
        }
    }

    /// Let anyone read bucket objects directly, bypassing CloudFront
    #[must_use]
    pub fn public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    pub fn build(self, stack: &mut Stack) -> Result<MediaStorage> {
        info!(
            stack = %stack.name(),
            environment = %self.environment,
            public_read = self.public_read,
            "Building media storage"
        );
        if self.public_read {
            warn!(stack = %stack.name(), "Media buckets allow public read access");
        }

        let mut storage = MediaStorage::default();
        for layout in MEDIA_BUCKETS {
            let path = format!("{}-{}", self.environment, layout.id);
            let mut bucket = Resource::new("AWS::S3::Bucket")
                .property(
                    "PublicAccessBlockConfiguration",
                    public_access_block(!self.public_read),
                )
                .removal_policy(DeletionPolicy::Retain);

            if let Some((queue_id, queue_variable)) = layout.queue {
                let queue = stack.add(&[queue_id], Resource::new("AWS::SQS::Queue"))?;
                let queue_policy = stack.add(
                    &[queue_id, "Policy"],
                    Resource::new("AWS::SQS::QueuePolicy")
                        .property("Queues", Expr::list([Expr::reference(&queue)]))
                        .property("PolicyDocument", s3_may_send(&queue)),
                )?;
                bucket = bucket
                    .property(
                        "NotificationConfiguration",
                        Expr::object([(
                            "QueueConfigurations",
                            Expr::list([Expr::object([
                                ("Event", Expr::str("s3:ObjectCreated:*")),
                                ("Queue", Expr::get_att(&queue, "Arn")),
                            ])]),
                        )]),
                    )
                    .depends_on(&queue_policy);
                storage
                    .variables
                    .insert(queue_variable.to_string(), Expr::get_att(&queue, "QueueName"));
                storage.grants.push(sqs_consume(Expr::get_att(&queue, "Arn")));
                storage.queues.push(queue);
            }

            let bucket = stack.add(&[path.as_str()], bucket)?;
            storage
                .variables
                .insert(layout.variable.to_string(), Expr::reference(&bucket));
            storage
                .grants
                .push(s3_read_write(Expr::get_att(&bucket, "Arn")));

            let origin_identity = match layout.distribution {
                Some((dist_id, _)) if !self.public_read => Some(stack.add(
                    &[dist_id, "Origin1", "S3Origin"],
                    Resource::new("AWS::CloudFront::CloudFrontOriginAccessIdentity").property(
                        "CloudFrontOriginAccessIdentityConfig",
                        Expr::object([(
                            "Comment",
                            Expr::str(format!("Identity for {dist_id}")),
                        )]),
                    ),
                )?),
                _ => None,
            };

            if self.public_read || origin_identity.is_some() {
                stack.add(
                    &[path.as_str(), "Policy"],
                    Resource::new("AWS::S3::BucketPolicy")
                        .property("Bucket", Expr::reference(&bucket))
                        .property(
                            "PolicyDocument",
                            bucket_read_policy(&bucket, origin_identity.as_ref()),
                        ),
                )?;
            }

            if let Some((dist_id, dist_variable)) = layout.distribution {
                let distribution = stack.add(
                    &[dist_id],
                    distribution(dist_id, &bucket, origin_identity.as_ref()),
                )?;
                storage.variables.insert(
                    dist_variable.to_string(),
                    Expr::join(
                        "",
                        vec![
                            Expr::str("https://"),
                            Expr::get_att(&distribution, "DomainName"),
                        ],
                    ),
                );
                storage.distributions.push(distribution);
            }
            storage.buckets.push(bucket);
        }
        Ok(storage)
    }
}

/// What the media storage contributes to the service consuming it
#[derive(Debug, Clone, Default)]
pub struct MediaStorage {
    /// Container variables naming buckets, queues and distribution URLs
    pub variables: BTreeMap<String, Expr>,
    /// Task role permissions on the buckets and queues
    pub grants: Vec<PolicyStatement>,
    pub buckets: Vec<LogicalId>,
    pub queues: Vec<LogicalId>,
    pub distributions: Vec<LogicalId>,
}

fn public_access_block(block: bool) -> Expr {
    Expr::object([
        ("BlockPublicAcls", Expr::Bool(block)),
        ("BlockPublicPolicy", Expr::Bool(block)),
        ("IgnorePublicAcls", Expr::Bool(block)),
        ("RestrictPublicBuckets", Expr::Bool(block)),
    ])
}

// Scoped by account: a bucket ARN condition would make bucket and policy
// depend on each other.
fn s3_may_send(queue: &LogicalId) -> Expr {
    Expr::object([
        ("Version", Expr::str("2012-10-17")),
        (
            "Statement",
            Expr::list([Expr::object([
                ("Effect", Expr::str("Allow")),
                (
                    "Principal",
                    Expr::object([("Service", Expr::str("s3.amazonaws.com"))]),
                ),
                (
                    "Action",
                    Expr::list([
                        Expr::str("sqs:SendMessage"),
                        Expr::str("sqs:GetQueueAttributes"),
                        Expr::str("sqs:GetQueueUrl"),
                    ]),
                ),
                ("Resource", Expr::get_att(queue, "Arn")),
                (
                    "Condition",
                    Expr::object([(
                        "StringEquals",
                        Expr::object([("aws:SourceAccount", Expr::pseudo("AccountId"))]),
                    )]),
                ),
            ])]),
        ),
    ])
}

fn bucket_read_policy(bucket: &LogicalId, origin_identity: Option<&LogicalId>) -> Expr {
    let principal = match origin_identity {
        Some(identity) => Expr::object([(
            "CanonicalUser",
            Expr::get_att(identity, "S3CanonicalUserId"),
        )]),
        None => Expr::str("*"),
    };
    Expr::object([
        ("Version", Expr::str("2012-10-17")),
        (
            "Statement",
            Expr::list([Expr::object([
                ("Effect", Expr::str("Allow")),
                ("Principal", principal),
                ("Action", Expr::str("s3:GetObject")),
                (
                    "Resource",
                    Expr::join("", vec![Expr::get_att(bucket, "Arn"), Expr::str("/*")]),
                ),
            ])]),
        ),
    ])
}

fn distribution(id: &str, bucket: &LogicalId, origin_identity: Option<&LogicalId>) -> Resource {
    let origin_id = format!("{id}Origin1");
    let access_identity = match origin_identity {
        Some(identity) => Expr::join(
            "",
            vec![
                Expr::str("origin-access-identity/cloudfront/"),
                Expr::reference(identity),
            ],
        ),
        None => Expr::str(""),
    };
    Resource::new("AWS::CloudFront::Distribution").property(
        "DistributionConfig",
        Expr::object([
            ("Enabled", Expr::Bool(true)),
            ("HttpVersion", Expr::str("http2")),
            (
                "Origins",
                Expr::list([Expr::object([
                    ("Id", Expr::str(&origin_id)),
                    ("DomainName", Expr::get_att(bucket, "RegionalDomainName")),
                    (
                        "S3OriginConfig",
                        Expr::object([("OriginAccessIdentity", access_identity)]),
                    ),
                ])]),
            ),
            (
                "DefaultCacheBehavior",
                Expr::object([
                    ("TargetOriginId", Expr::str(&origin_id)),
                    ("ViewerProtocolPolicy", Expr::str("allow-all")),
                    ("CachePolicyId", Expr::str(CLOUDFRONT_CACHING_OPTIMIZED_POLICY_ID)),
                    ("Compress", Expr::Bool(true)),
                ]),
            ),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StackEnv;

    fn build(public_read: bool) -> (Stack, MediaStorage) {
        let mut stack = Stack::new("dev-filesStack", StackEnv::new("123456789012", "us-east-1"));
        let storage = MediaStorageBuilder::new(Environment::Dev)
            .public_read(public_read)
            .build(&mut stack)
            .unwrap();
        (stack, storage)
    }

    #[test]
    fn declares_buckets_queues_and_distributions() {
        let (stack, storage) = build(false);
        assert_eq!(storage.buckets.len(), 4);
        assert_eq!(storage.queues.len(), 3);
        assert_eq!(storage.distributions.len(), 2);
        for variable in [
            "IMAGE_BUCKET_NAME",
            "VIDEO_BUCKET_NAME",
            "OPTIMIZED_VIDEO_BUCKET_NAME",
            "THUMBNAIL_BUCKET_NAME",
            "VIDEO_UPLOADED_QUEUE",
            "OPTIMIZED_VIDEO_UPLOADED_QUEUE",
            "THUMBNAIL_UPLOADED_QUEUE",
            "IMAGE_DISTRIBUTION_BASE_URL",
            "OPTIMIZED_VIDEO_DISTRIBUTION_BASE_URL",
        ] {
            assert!(storage.variables.contains_key(variable), "{variable}");
        }
        assert!(stack.template().dangling_references().is_empty());
    }

    #[test]
    fn private_buckets_are_read_through_origin_identity() {
        let (stack, _) = build(false);
        assert_eq!(
            stack
                .resources_of_type("AWS::CloudFront::CloudFrontOriginAccessIdentity")
                .count(),
            2
        );
        for (_, policy) in stack.resources_of_type("AWS::S3::BucketPolicy") {
            let document = policy.get("PolicyDocument").unwrap().to_json();
            assert_ne!(document["Statement"][0]["Principal"], "*");
        }
    }

    #[test]
    fn public_read_is_opt_in() {
        let (stack, _) = build(true);
        assert_eq!(stack.resources_of_type("AWS::S3::BucketPolicy").count(), 4);
        for (_, policy) in stack.resources_of_type("AWS::S3::BucketPolicy") {
            let document = policy.get("PolicyDocument").unwrap().to_json();
            assert_eq!(document["Statement"][0]["Principal"], "*");
        }
    }

    #[test]
    fn upload_notifications_wait_for_queue_policy() {
        let (stack, storage) = build(false);
        let notified = storage
            .buckets
            .iter()
            .filter_map(|id| stack.resource(id))
            .filter(|bucket| bucket.get("NotificationConfiguration").is_some())
            .collect::<Vec<_>>();
        assert_eq!(notified.len(), 3);
        assert!(notified.iter().all(|bucket| !bucket.depends_on.is_empty()));
    }
}

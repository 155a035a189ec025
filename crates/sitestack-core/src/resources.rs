//! Fixed-shape resource declarations: storage unit, edge distribution and
//! the initial content deployment.

use serde::Serialize;
use serde_json::json;
use sitestack_provider::{ResourceKind, ResourceSpec};

use crate::token::get_att;

// Logical ids. These are the stable keys the provider upserts on.
pub const SITE_BUCKET: &str = "SiteBucket";
pub const ZONE: &str = "Zone";
pub const SITE_CERTIFICATE: &str = "SiteCertificate";
pub const SITE_DISTRIBUTION: &str = "SiteDistribution";
pub const SITE_ALIAS_RECORD: &str = "SiteAliasRecord";
pub const BUILD_PROJECT: &str = "BuildProject";
pub const INVALIDATE_ROLE: &str = "InvalidateRole";
pub const INVALIDATE_PROJECT: &str = "InvalidateProject";
pub const PIPELINE: &str = "Pipeline";
pub const ALARM_TOPIC: &str = "AlarmTopic";
pub const CONTENT_DEPLOYMENT: &str = "DeployWithInvalidation";

pub const INDEX_DOCUMENT: &str = "index.html";
pub const ERROR_DOCUMENT: &str = "error.html";

/// Invalidates every cached object.
pub const INVALIDATE_ALL_PATHS: &str = "/*";

/// Viewer-facing behaviour of the distribution's default cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorPolicy {
    pub viewer_protocol_policy: &'static str,
    pub allowed_methods: [&'static str; 3],
    pub compress: bool,
}

pub const DEFAULT_BEHAVIOR: BehaviorPolicy = BehaviorPolicy {
    viewer_protocol_policy: "redirect-to-https",
    allowed_methods: ["GET", "HEAD", "OPTIONS"],
    compress: true,
};

/// Bucket name derived from the site domain, if there is one.
pub fn bucket_name_for(site_domain: &str) -> String {
    format!("{}-static-site", site_domain)
}

/// Website bucket. Public-read, destroyed with the stack.
pub fn site_bucket(site_domain: Option<&str>) -> ResourceSpec {
    let mut properties = json!({
        "publicReadAccess": true,
        "websiteIndexDocument": INDEX_DOCUMENT,
        "websiteErrorDocument": ERROR_DOCUMENT,
        "removalPolicy": "destroy",
        "autoDeleteObjects": true,
    });
    if let Some(domain) = site_domain {
        properties["bucketName"] = json!(bucket_name_for(domain));
    }
    ResourceSpec::new(SITE_BUCKET, ResourceKind::Bucket, properties)
}

/// The TLS binding for a distribution served on a custom domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBinding {
    pub site_domain: String,
    /// Certificate ARN, usually a token into the certificate resource
    pub certificate_arn: String,
}

/// Edge distribution over the site bucket.
///
/// Without a binding the distribution is only reachable on its provider
/// hostname.
pub fn site_distribution(binding: Option<&DomainBinding>) -> ResourceSpec {
    let mut properties = json!({
        "defaultRootObject": INDEX_DOCUMENT,
        "origin": {
            "type": "s3",
            "domainName": get_att(SITE_BUCKET, "RegionalDomainName"),
        },
        "defaultBehavior": DEFAULT_BEHAVIOR,
    });
    let mut depends_on = vec![SITE_BUCKET.to_string()];
    if let Some(binding) = binding {
        properties["domainNames"] = json!([binding.site_domain]);
        properties["certificateArn"] = json!(binding.certificate_arn);
        depends_on.push(SITE_CERTIFICATE.to_string());
    }
    let mut spec = ResourceSpec::new(SITE_DISTRIBUTION, ResourceKind::Distribution, properties);
    spec.depends_on = depends_on;
    spec
}

/// Initial content sync into the bucket, followed by a full invalidation.
pub fn content_deployment(content_dir: &str) -> ResourceSpec {
    ResourceSpec::new(
        CONTENT_DEPLOYMENT,
        ResourceKind::BucketDeployment,
        json!({
            "sources": [content_dir],
            "destinationBucketName": get_att(SITE_BUCKET, "BucketName"),
            "distributionId": get_att(SITE_DISTRIBUTION, "DistributionId"),
            "distributionPaths": [INVALIDATE_ALL_PATHS],
        }),
    )
    .depends_on(SITE_BUCKET)
    .depends_on(SITE_DISTRIBUTION)
}

//! Provider trait definitions for sitestack
//!
//! The orchestrator never talks to a cloud SDK directly. Everything it needs
//! from the underlying platform goes through [`CloudProvider`]:
//! - zone lookup by domain name
//! - idempotent create-or-update of a declared resource
//! - attribute lookup on an already provisioned resource
//! - object upload, pruning and cache invalidation for the deploy path
//! - the list of resources each stack owns, so removals survive restarts
//!
//! An in-memory implementation lives in the `memory` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ProviderError;

/// Result type for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a resource's resolved properties.
///
/// Two specs with the same digest describe the same desired state, which is
/// what makes repeated applies a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = ProviderError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProviderError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Resource declarations
// ---------------------------------------------------------------------------

/// Kinds of resources a site stack declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    Certificate,
    Distribution,
    DnsRecord,
    BuildProject,
    Role,
    Pipeline,
    Topic,
    Alarm,
    BucketDeployment,
}

impl ResourceKind {
    /// Provider type name, as it would appear in a rendered template.
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "AWS::S3::Bucket",
            ResourceKind::Certificate => "AWS::CertificateManager::Certificate",
            ResourceKind::Distribution => "AWS::CloudFront::Distribution",
            ResourceKind::DnsRecord => "AWS::Route53::RecordSet",
            ResourceKind::BuildProject => "AWS::CodeBuild::Project",
            ResourceKind::Role => "AWS::IAM::Role",
            ResourceKind::Pipeline => "AWS::CodePipeline::Pipeline",
            ResourceKind::Topic => "AWS::SNS::Topic",
            ResourceKind::Alarm => "AWS::CloudWatch::Alarm",
            ResourceKind::BucketDeployment => "Custom::CDKBucketDeployment",
        }
    }

    /// Whether a property change forces a new physical resource.
    ///
    /// Certificates are bound to their domain and buckets to their name, so
    /// changing either creates a replacement rather than an in-place update.
    pub fn replaces_on_update(&self) -> bool {
        matches!(self, ResourceKind::Bucket | ResourceKind::Certificate)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Desired state of a single resource.
///
/// `properties` must be fully resolved (no unresolved cross-resource
/// references) by the time it reaches a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Stable identifier within the stack (e.g. "SiteBucket")
    pub logical_id: String,
    pub kind: ResourceKind,
    /// Region override; `None` means the stack's own region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub properties: serde_json::Value,
    /// Logical ids this resource must be provisioned after
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind, properties: serde_json::Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            region: None,
            properties,
            depends_on: Vec::new(),
        }
    }

    /// Pin the resource to a specific region.
    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Add an explicit ordering dependency.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Digest of everything that defines the desired state.
    ///
    /// `serde_json::Value` objects are backed by ordered maps, so the
    /// serialized form is canonical for equal values.
    pub fn digest(&self) -> ContentDigest {
        let canonical = serde_json::json!({
            "kind": self.kind,
            "region": self.region,
            "properties": self.properties,
        });
        ContentDigest::from_bytes(canonical.to_string().as_bytes())
    }
}

/// A resource as it exists at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub logical_id: String,
    pub kind: ResourceKind,
    /// Provider-assigned identifier
    pub physical_id: String,
    pub region: String,
    /// Attributes resolvable by dependents (e.g. "Arn", "DistributionId")
    pub attributes: BTreeMap<String, String>,
    pub properties: serde_json::Value,
    pub digest: ContentDigest,
    pub updated_at: DateTime<Utc>,
}

impl ProvisionedResource {
    /// Look up a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// What a provision call did to the live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Created,
    Updated,
    Replaced,
    Unchanged,
    /// Removed because the stack no longer declares it. Never returned by
    /// `provision`.
    Deleted,
}

/// Result of [`CloudProvider::provision`].
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub resource: ProvisionedResource,
    pub change: Change,
}

/// A DNS hosted zone resolved by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub zone_id: String,
    pub zone_name: String,
}

/// A single permission grant attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allows(&self, action: &str, resource: &str) -> bool {
        self.actions.iter().any(|a| a == action) && self.resources.iter().any(|r| r == resource)
    }
}

/// An object written into a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub body: Vec<u8>,
}

/// A cache invalidation accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub invalidation_id: String,
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CloudProvider
// ---------------------------------------------------------------------------

/// The cloud platform as seen by the orchestrator and the pipeline.
///
/// Guarantees:
/// - `provision` is an upsert keyed by `logical_id`: the same spec twice
///   yields the same physical resource and `Change::Unchanged`.
/// - Kinds with [`ResourceKind::replaces_on_update`] get a new physical id
///   when their properties change.
/// - `create_invalidation` succeeds only for a principal holding a grant for
///   `cloudfront:CreateInvalidation` on exactly that distribution.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Resolve an existing hosted zone. Fails with `ZoneNotFound` if absent.
    async fn lookup_zone(&self, domain_name: &str) -> ProviderResult<HostedZone>;

    /// Create or update a resource to match `spec`.
    async fn provision(&self, spec: &ResourceSpec) -> ProviderResult<ProvisionOutcome>;

    /// Fetch a provisioned resource by logical id.
    async fn describe(&self, logical_id: &str) -> ProviderResult<Option<ProvisionedResource>>;

    /// Delete a resource by logical id. Returns `false` if it did not exist.
    async fn delete(&self, logical_id: &str) -> ProviderResult<bool>;

    /// Write objects into a bucket, replacing existing keys.
    async fn put_objects(&self, bucket_name: &str, objects: Vec<StoredObject>) -> ProviderResult<usize>;

    /// List object keys in a bucket, sorted.
    async fn list_objects(&self, bucket_name: &str) -> ProviderResult<Vec<String>>;

    /// Remove keys from a bucket. Keys that do not exist are skipped; the
    /// return value counts the keys actually removed.
    async fn delete_objects(&self, bucket_name: &str, keys: &[String]) -> ProviderResult<usize>;

    /// Replace the list of logical ids `stack_name` owns, in provisioning
    /// order. An empty list forgets the stack.
    async fn record_stack(&self, stack_name: &str, logical_ids: Vec<String>) -> ProviderResult<()>;

    /// Logical ids last recorded for `stack_name`. Empty if never recorded.
    async fn stack_resources(&self, stack_name: &str) -> ProviderResult<Vec<String>>;

    /// Invalidate cached paths on a distribution on behalf of `principal_arn`.
    async fn create_invalidation(
        &self,
        principal_arn: &str,
        distribution_id: &str,
        paths: &[String],
    ) -> ProviderResult<InvalidationRecord>;
}

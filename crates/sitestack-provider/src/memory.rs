//! In-memory cloud provider
//!
//! `MemoryProvider` satisfies the [`CloudProvider`] contract without any
//! network access. It backs the test suites and the CLI's local state file:
//! the whole provider state can be captured as a [`ProviderSnapshot`] and
//! restored later, so repeated applies against the same snapshot behave the
//! way they would against a live account.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::provider_traits::*;

pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Action name the invalidation grant must cover.
pub const CREATE_INVALIDATION_ACTION: &str = "cloudfront:CreateInvalidation";

/// Serializable provider state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub account_id: String,
    pub region: String,
    #[serde(default)]
    pub zones: BTreeMap<String, HostedZone>,
    #[serde(default)]
    pub resources: BTreeMap<String, ProvisionedResource>,
    /// bucket name → key → body
    #[serde(default)]
    pub objects: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    #[serde(default)]
    pub invalidations: Vec<InvalidationRecord>,
    /// stack name → owned logical ids, in provisioning order
    #[serde(default)]
    pub stacks: BTreeMap<String, Vec<String>>,
}

impl Default for ProviderSnapshot {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            zones: BTreeMap::new(),
            resources: BTreeMap::new(),
            objects: BTreeMap::new(),
            invalidations: Vec::new(),
            stacks: BTreeMap::new(),
        }
    }
}

/// In-memory provider backed by a [`ProviderSnapshot`].
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<ProviderSnapshot>,
    failures: Mutex<HashMap<String, String>>,
    provision_log: Mutex<Vec<String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a provider from a previously captured snapshot.
    pub fn from_snapshot(snapshot: ProviderSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Set the stack's default region.
    pub fn with_region(self, region: impl Into<String>) -> Self {
        self.lock_state().region = region.into();
        self
    }

    /// Register an existing hosted zone.
    pub fn with_zone(self, zone_name: impl Into<String>) -> Self {
        self.add_zone(zone_name);
        self
    }

    pub fn add_zone(&self, zone_name: impl Into<String>) {
        let zone_name = zone_name.into();
        let zone_id = format!(
            "Z{}",
            ContentDigest::from_bytes(zone_name.as_bytes()).short().to_ascii_uppercase()
        );
        self.lock_state()
            .zones
            .insert(zone_name.clone(), HostedZone { zone_id, zone_name });
    }

    /// Make every subsequent provision of `logical_id` fail.
    pub fn fail_on(&self, logical_id: impl Into<String>, reason: impl Into<String>) {
        lock(&self.failures).insert(logical_id.into(), reason.into());
    }

    pub fn clear_failure(&self, logical_id: &str) {
        lock(&self.failures).remove(logical_id);
    }

    /// Capture the full provider state.
    pub fn snapshot(&self) -> ProviderSnapshot {
        self.lock_state().clone()
    }

    pub fn resource_count(&self) -> usize {
        self.lock_state().resources.len()
    }

    pub fn resource(&self, logical_id: &str) -> Option<ProvisionedResource> {
        self.lock_state().resources.get(logical_id).cloned()
    }

    pub fn resources_of_kind(&self, kind: ResourceKind) -> Vec<ProvisionedResource> {
        self.lock_state()
            .resources
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn invalidations(&self) -> Vec<InvalidationRecord> {
        self.lock_state().invalidations.clone()
    }

    pub fn objects(&self, bucket_name: &str) -> BTreeMap<String, Vec<u8>> {
        self.lock_state()
            .objects
            .get(bucket_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Logical ids in the order `provision` was called, including no-op calls.
    pub fn provision_log(&self) -> Vec<String> {
        lock(&self.provision_log).clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ProviderSnapshot> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn str_prop<'a>(spec: &'a ResourceSpec, key: &str) -> Option<&'a str> {
    spec.properties.get(key).and_then(|v| v.as_str())
}

fn require_prop<'a>(spec: &'a ResourceSpec, key: &str) -> ProviderResult<&'a str> {
    str_prop(spec, key).ok_or_else(|| ProviderError::InvalidProperties {
        logical_id: spec.logical_id.clone(),
        reason: format!("missing string property '{}'", key),
    })
}

/// Derive a fresh physical id for a resource.
fn physical_id(spec: &ResourceSpec, account_id: &str, digest: &ContentDigest) -> ProviderResult<String> {
    let seed = ContentDigest::from_bytes(
        format!("{}/{}/{}", account_id, spec.logical_id, digest).as_bytes(),
    );
    let suffix = &seed.as_str()[..8];
    let id = match spec.kind {
        ResourceKind::Bucket => match str_prop(spec, "bucketName") {
            Some(name) => name.to_string(),
            None => format!("{}-{}", spec.logical_id.to_ascii_lowercase(), suffix),
        },
        ResourceKind::Distribution => format!("E{}", seed.as_str()[..13].to_ascii_uppercase()),
        ResourceKind::Certificate => seed.as_str()[..32].to_string(),
        ResourceKind::DnsRecord => require_prop(spec, "recordName")?.to_string(),
        ResourceKind::Pipeline => str_prop(spec, "pipelineName")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", spec.logical_id, suffix)),
        ResourceKind::Topic => str_prop(spec, "topicName")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", spec.logical_id, suffix)),
        ResourceKind::Alarm => str_prop(spec, "alarmName")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", spec.logical_id, suffix)),
        ResourceKind::BuildProject
        | ResourceKind::Role
        | ResourceKind::BucketDeployment => format!("{}-{}", spec.logical_id, suffix),
    };
    Ok(id)
}

/// Attributes dependents may reference.
fn attributes(
    spec: &ResourceSpec,
    physical_id: &str,
    region: &str,
    account_id: &str,
) -> ProviderResult<BTreeMap<String, String>> {
    let mut attrs = BTreeMap::new();
    attrs.insert("Ref".to_string(), physical_id.to_string());
    match spec.kind {
        ResourceKind::Bucket => {
            attrs.insert("BucketName".into(), physical_id.to_string());
            attrs.insert("Arn".into(), format!("arn:aws:s3:::{}", physical_id));
            attrs.insert(
                "WebsiteURL".into(),
                format!("http://{}.s3-website-{}.amazonaws.com", physical_id, region),
            );
            attrs.insert(
                "RegionalDomainName".into(),
                format!("{}.s3.{}.amazonaws.com", physical_id, region),
            );
        }
        ResourceKind::Certificate => {
            require_prop(spec, "domainName")?;
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:acm:{}:{}:certificate/{}", region, account_id, physical_id),
            );
        }
        ResourceKind::Distribution => {
            attrs.insert("DistributionId".into(), physical_id.to_string());
            attrs.insert(
                "DomainName".into(),
                format!("{}.cloudfront.net", physical_id.to_ascii_lowercase()),
            );
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:cloudfront::{}:distribution/{}", account_id, physical_id),
            );
        }
        ResourceKind::DnsRecord => {
            require_prop(spec, "hostedZoneId")?;
            attrs.insert("Name".into(), physical_id.to_string());
        }
        ResourceKind::BuildProject => {
            attrs.insert("Name".into(), physical_id.to_string());
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:codebuild:{}:{}:project/{}", region, account_id, physical_id),
            );
        }
        ResourceKind::Role => {
            attrs.insert("RoleName".into(), physical_id.to_string());
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:iam::{}:role/{}", account_id, physical_id),
            );
        }
        ResourceKind::Pipeline => {
            attrs.insert("Name".into(), physical_id.to_string());
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:codepipeline:{}:{}:{}", region, account_id, physical_id),
            );
        }
        ResourceKind::Topic => {
            attrs.insert("TopicName".into(), physical_id.to_string());
            attrs.insert(
                "TopicArn".into(),
                format!("arn:aws:sns:{}:{}:{}", region, account_id, physical_id),
            );
        }
        ResourceKind::Alarm => {
            attrs.insert("AlarmName".into(), physical_id.to_string());
            attrs.insert(
                "Arn".into(),
                format!("arn:aws:cloudwatch:{}:{}:alarm:{}", region, account_id, physical_id),
            );
        }
        ResourceKind::BucketDeployment => {
            require_prop(spec, "destinationBucketName")?;
        }
    }
    Ok(attrs)
}

fn role_statements(role: &ProvisionedResource) -> Vec<PolicyStatement> {
    role.properties
        .get("policy")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn record_invalidation(
    state: &mut ProviderSnapshot,
    distribution_id: &str,
    paths: Vec<String>,
) -> InvalidationRecord {
    let seed = format!("{}/{}", distribution_id, state.invalidations.len());
    let record = InvalidationRecord {
        invalidation_id: format!(
            "I{}",
            ContentDigest::from_bytes(seed.as_bytes()).short().to_ascii_uppercase()
        ),
        distribution_id: distribution_id.to_string(),
        paths,
        created_at: Utc::now(),
    };
    state.invalidations.push(record.clone());
    record
}

fn find_distribution<'a>(
    state: &'a ProviderSnapshot,
    distribution_id: &str,
) -> Option<&'a ProvisionedResource> {
    state.resources.values().find(|r| {
        r.kind == ResourceKind::Distribution && r.attribute("DistributionId") == Some(distribution_id)
    })
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    async fn lookup_zone(&self, domain_name: &str) -> ProviderResult<HostedZone> {
        self.lock_state()
            .zones
            .get(domain_name.trim_end_matches('.'))
            .cloned()
            .ok_or_else(|| ProviderError::ZoneNotFound {
                domain: domain_name.to_string(),
            })
    }

    async fn provision(&self, spec: &ResourceSpec) -> ProviderResult<ProvisionOutcome> {
        lock(&self.provision_log).push(spec.logical_id.clone());

        if let Some(reason) = lock(&self.failures).get(&spec.logical_id) {
            return Err(ProviderError::ProvisionFailed {
                logical_id: spec.logical_id.clone(),
                reason: reason.clone(),
            });
        }

        let mut state = self.lock_state();
        let digest = spec.digest();
        let region = spec.region.clone().unwrap_or_else(|| state.region.clone());

        let existing = state.resources.get(&spec.logical_id).cloned();
        let change = match &existing {
            Some(current) if current.digest == digest => {
                debug!(logical_id = %spec.logical_id, "resource unchanged");
                return Ok(ProvisionOutcome {
                    resource: current.clone(),
                    change: Change::Unchanged,
                });
            }
            Some(_) if spec.kind.replaces_on_update() => Change::Replaced,
            Some(_) => Change::Updated,
            None => Change::Created,
        };

        let physical = match (&existing, change) {
            (Some(current), Change::Updated) => current.physical_id.clone(),
            _ => physical_id(spec, &state.account_id, &digest)?,
        };
        let attrs = attributes(spec, &physical, &region, &state.account_id)?;

        if spec.kind == ResourceKind::Bucket {
            if let Some(old) = existing.as_ref().filter(|old| old.physical_id != physical) {
                state.objects.remove(&old.physical_id);
            }
            state.objects.entry(physical.clone()).or_default();
        }

        if spec.kind == ResourceKind::BucketDeployment {
            let distribution = str_prop(spec, "distributionId").map(str::to_string);
            if let Some(distribution_id) = distribution {
                let paths: Vec<String> = spec
                    .properties
                    .get("distributionPaths")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_else(|| vec!["/*".to_string()]);
                if find_distribution(&state, &distribution_id).is_none() {
                    return Err(ProviderError::ResourceNotFound { id: distribution_id });
                }
                record_invalidation(&mut state, &distribution_id, paths);
            }
        }

        let resource = ProvisionedResource {
            logical_id: spec.logical_id.clone(),
            kind: spec.kind,
            physical_id: physical,
            region,
            attributes: attrs,
            properties: spec.properties.clone(),
            digest,
            updated_at: Utc::now(),
        };
        debug!(
            logical_id = %spec.logical_id,
            physical_id = %resource.physical_id,
            change = ?change,
            "resource provisioned"
        );
        state.resources.insert(spec.logical_id.clone(), resource.clone());
        Ok(ProvisionOutcome { resource, change })
    }

    async fn describe(&self, logical_id: &str) -> ProviderResult<Option<ProvisionedResource>> {
        Ok(self.lock_state().resources.get(logical_id).cloned())
    }

    async fn delete(&self, logical_id: &str) -> ProviderResult<bool> {
        let mut state = self.lock_state();
        match state.resources.remove(logical_id) {
            Some(removed) => {
                if removed.kind == ResourceKind::Bucket {
                    state.objects.remove(&removed.physical_id);
                }
                debug!(logical_id = %logical_id, "resource deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_objects(&self, bucket_name: &str, objects: Vec<StoredObject>) -> ProviderResult<usize> {
        let mut state = self.lock_state();
        let bucket = state
            .objects
            .get_mut(bucket_name)
            .ok_or_else(|| ProviderError::ResourceNotFound {
                id: bucket_name.to_string(),
            })?;
        let count = objects.len();
        for object in objects {
            bucket.insert(object.key, object.body);
        }
        Ok(count)
    }

    async fn list_objects(&self, bucket_name: &str) -> ProviderResult<Vec<String>> {
        let state = self.lock_state();
        let bucket = state
            .objects
            .get(bucket_name)
            .ok_or_else(|| ProviderError::ResourceNotFound {
                id: bucket_name.to_string(),
            })?;
        Ok(bucket.keys().cloned().collect())
    }

    async fn delete_objects(&self, bucket_name: &str, keys: &[String]) -> ProviderResult<usize> {
        let mut state = self.lock_state();
        let bucket = state
            .objects
            .get_mut(bucket_name)
            .ok_or_else(|| ProviderError::ResourceNotFound {
                id: bucket_name.to_string(),
            })?;
        let removed = keys.iter().filter(|key| bucket.remove(*key).is_some()).count();
        debug!(bucket = %bucket_name, removed = removed, "objects deleted");
        Ok(removed)
    }

    async fn record_stack(&self, stack_name: &str, logical_ids: Vec<String>) -> ProviderResult<()> {
        let mut state = self.lock_state();
        if logical_ids.is_empty() {
            state.stacks.remove(stack_name);
        } else {
            state.stacks.insert(stack_name.to_string(), logical_ids);
        }
        Ok(())
    }

    async fn stack_resources(&self, stack_name: &str) -> ProviderResult<Vec<String>> {
        Ok(self
            .lock_state()
            .stacks
            .get(stack_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_invalidation(
        &self,
        principal_arn: &str,
        distribution_id: &str,
        paths: &[String],
    ) -> ProviderResult<InvalidationRecord> {
        let mut state = self.lock_state();
        let distribution_arn = find_distribution(&state, distribution_id)
            .and_then(|d| d.attribute("Arn").map(str::to_string))
            .ok_or_else(|| ProviderError::ResourceNotFound {
                id: distribution_id.to_string(),
            })?;

        let granted = state
            .resources
            .values()
            .filter(|r| r.kind == ResourceKind::Role && r.attribute("Arn") == Some(principal_arn))
            .flat_map(role_statements)
            .any(|stmt| stmt.allows(CREATE_INVALIDATION_ACTION, &distribution_arn));

        if !granted {
            return Err(ProviderError::AccessDenied {
                principal: principal_arn.to_string(),
                action: CREATE_INVALIDATION_ACTION.to_string(),
                resource: distribution_arn,
            });
        }

        Ok(record_invalidation(&mut state, distribution_id, paths.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket_spec(name: &str) -> ResourceSpec {
        ResourceSpec::new("SiteBucket", ResourceKind::Bucket, json!({ "bucketName": name }))
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let provider = MemoryProvider::new();
        let first = provider.provision(&bucket_spec("a-static-site")).await.expect("first");
        let second = provider.provision(&bucket_spec("a-static-site")).await.expect("second");

        assert_eq!(first.change, Change::Created);
        assert_eq!(second.change, Change::Unchanged);
        assert_eq!(first.resource.physical_id, second.resource.physical_id);
        assert_eq!(provider.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_bucket_rename_replaces() {
        let provider = MemoryProvider::new();
        provider.provision(&bucket_spec("a-static-site")).await.expect("create");
        let outcome = provider.provision(&bucket_spec("b-static-site")).await.expect("replace");

        assert_eq!(outcome.change, Change::Replaced);
        assert_eq!(outcome.resource.physical_id, "b-static-site");
        assert!(provider.list_objects("a-static-site").await.is_err());
    }

    #[tokio::test]
    async fn test_distribution_update_keeps_id() {
        let provider = MemoryProvider::new();
        let v1 = ResourceSpec::new("SiteDistribution", ResourceKind::Distribution, json!({"v": 1}));
        let v2 = ResourceSpec::new("SiteDistribution", ResourceKind::Distribution, json!({"v": 2}));
        let a = provider.provision(&v1).await.expect("create");
        let b = provider.provision(&v2).await.expect("update");

        assert_eq!(b.change, Change::Updated);
        assert_eq!(a.resource.physical_id, b.resource.physical_id);
        assert!(a.resource.physical_id.starts_with('E'));
    }

    #[tokio::test]
    async fn test_lookup_zone() {
        let provider = MemoryProvider::new().with_zone("example.com");
        let zone = provider.lookup_zone("example.com").await.expect("zone");
        assert_eq!(zone.zone_name, "example.com");
        assert!(zone.zone_id.starts_with('Z'));

        let err = provider.lookup_zone("missing.org").await.unwrap_err();
        assert!(matches!(err, ProviderError::ZoneNotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let provider = MemoryProvider::new();
        provider.fail_on("SiteBucket", "quota exceeded");
        let err = provider.provision(&bucket_spec("x")).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        provider.clear_failure("SiteBucket");
        assert!(provider.provision(&bucket_spec("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_certificate_requires_domain() {
        let provider = MemoryProvider::new();
        let spec = ResourceSpec::new("SiteCertificate", ResourceKind::Certificate, json!({}))
            .in_region("us-east-1");
        let err = provider.provision(&spec).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidProperties { .. }));
    }

    #[tokio::test]
    async fn test_delete_bucket_empties_objects() {
        let provider = MemoryProvider::new();
        provider.provision(&bucket_spec("site")).await.expect("create");
        provider
            .put_objects(
                "site",
                vec![StoredObject {
                    key: "index.html".to_string(),
                    body: b"<html/>".to_vec(),
                }],
            )
            .await
            .expect("put");
        assert_eq!(provider.objects("site").len(), 1);

        assert!(provider.delete("SiteBucket").await.expect("delete"));
        assert!(provider.objects("site").is_empty());
        assert!(!provider.delete("SiteBucket").await.expect("second delete"));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_preserves_resources() {
        let provider = MemoryProvider::new().with_zone("example.com");
        provider.provision(&bucket_spec("site")).await.expect("create");

        let restored = MemoryProvider::from_snapshot(provider.snapshot());
        let outcome = restored.provision(&bucket_spec("site")).await.expect("re-apply");
        assert_eq!(outcome.change, Change::Unchanged);
        assert!(restored.lookup_zone("example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_stack_record_survives_snapshot() {
        let provider = MemoryProvider::new();
        provider
            .record_stack("StaticSite", vec!["SiteBucket".to_string(), "SiteDistribution".to_string()])
            .await
            .expect("record");

        let restored = MemoryProvider::from_snapshot(provider.snapshot());
        assert_eq!(
            restored.stack_resources("StaticSite").await.expect("list"),
            vec!["SiteBucket", "SiteDistribution"]
        );

        restored.record_stack("StaticSite", Vec::new()).await.expect("forget");
        assert!(restored.stack_resources("StaticSite").await.expect("list").is_empty());
        assert!(restored.snapshot().stacks.is_empty());
    }
}

//! Apply and teardown of construction plans against a provider.
//!
//! `apply` walks the plan in order. Each step's tokens are resolved from the
//! attributes of the steps before it, so a resource is only provisioned
//! once everything it references exists. The first provider failure aborts
//! the pass and names the failing step. Nothing is retried or rolled back.
//!
//! The provider keeps the list of logical ids each stack owns. A successful
//! apply deletes owned resources the plan no longer declares (switching
//! from Full to Bare mode, say), newest first, and teardown deletes
//! everything on that list rather than only what the current plan names.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sitestack_provider::{
    Change, CloudProvider, ProvisionedResource, ResourceKind, ResourceSpec, StoredObject,
};
use tracing::{debug, warn};

use crate::config::{SiteConfiguration, StackSettings};
use crate::construction::{build_plan, ConstructionPlan, PlannedStep};
use crate::content::{collect_objects, digest_objects, sync_bucket};
use crate::error::{Result, SiteError};
use crate::obs::{self, StackSpan};
use crate::resources::{ALARM_TOPIC, PIPELINE, SITE_BUCKET, SITE_DISTRIBUTION};
use crate::token::{resolve, ResolutionContext};
use crate::topology::TopologyMode;

/// What happened to one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub logical_id: String,
    /// `None` for zone lookups
    pub kind: Option<ResourceKind>,
    pub physical_id: String,
    /// `None` for zone lookups, which never change anything
    pub change: Option<Change>,
}

/// Externally observable result of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    pub mode: TopologyMode,
    pub bucket_name: String,
    pub distribution_id: String,
    pub distribution_domain: String,
    pub site_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_topic_arn: Option<String>,
}

impl StackOutputs {
    fn from_context(plan: &ConstructionPlan, ctx: &ResolutionContext) -> Result<Self> {
        let required = |logical_id: &str, attribute: &str| -> Result<String> {
            optional(ctx, logical_id, attribute).ok_or_else(|| SiteError::UnresolvedReference {
                referenced_by: "StackOutputs".to_string(),
                logical_id: logical_id.to_string(),
                attribute: attribute.to_string(),
            })
        };
        let distribution_domain = required(SITE_DISTRIBUTION, "DomainName")?;
        let site_url = match (plan.mode, &plan.effective_domain) {
            (TopologyMode::Full, Some(domain)) => format!("https://{}", domain),
            _ => format!("https://{}", distribution_domain),
        };
        Ok(Self {
            mode: plan.mode,
            bucket_name: required(SITE_BUCKET, "BucketName")?,
            distribution_id: required(SITE_DISTRIBUTION, "DistributionId")?,
            distribution_domain,
            site_url,
            pipeline_name: optional(ctx, PIPELINE, "Name"),
            alarm_topic_arn: optional(ctx, ALARM_TOPIC, "TopicArn"),
        })
    }
}

fn optional(ctx: &ResolutionContext, logical_id: &str, attribute: &str) -> Option<String> {
    ctx.get(logical_id)
        .and_then(|attrs| attrs.get(attribute))
        .cloned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub stack_name: String,
    pub mode: TopologyMode,
    pub steps: Vec<StepReport>,
    pub outputs: StackOutputs,
    pub duration_ms: u64,
}

impl ApplyReport {
    /// Steps that created, updated, replaced or deleted a resource.
    pub fn changed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.change, Some(c) if c != Change::Unchanged))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.change == Some(Change::Unchanged))
            .count()
    }

    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }

    pub fn step(&self, logical_id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.logical_id == logical_id)
    }

    /// Resources deleted because the plan no longer declares them.
    pub fn removed(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.change == Some(Change::Deleted))
            .map(|s| s.logical_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Deleted logical ids, in deletion order
    pub deleted: Vec<String>,
    /// Owned or planned resources that did not exist
    pub missing: Vec<String>,
}

/// Drives a provider through construction plans.
pub struct Orchestrator {
    provider: Arc<dyn CloudProvider>,
    content_root: PathBuf,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            content_root: PathBuf::from("."),
        }
    }

    /// Directory that relative content sources are resolved against.
    pub fn with_content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = root.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    /// Plan and apply in one go.
    pub async fn deploy(
        &self,
        config: &SiteConfiguration,
        settings: &StackSettings,
    ) -> Result<ApplyReport> {
        let plan = build_plan(config, settings)?;
        self.apply(&plan).await
    }

    /// Provision every step of `plan`, in order, then delete what the
    /// stack owned before but the plan no longer declares.
    pub async fn apply(&self, plan: &ConstructionPlan) -> Result<ApplyReport> {
        let _span = StackSpan::enter(&plan.stack_name, "apply");
        let started = Instant::now();

        let previous = self.owned(&plan.stack_name).await?;
        let mut applied = Vec::new();
        let result = match self.apply_steps(plan, &mut applied).await {
            Ok((mut steps, ctx)) => {
                let removed = self.remove_orphans(&plan.stack_name, &previous, &applied).await;
                removed.map(|removed| {
                    steps.extend(removed);
                    (steps, ctx)
                })
            }
            Err(e) => {
                self.record_owned(&plan.stack_name, merge_ids(&previous, &applied)).await;
                Err(e)
            }
        };

        match result {
            Ok((steps, ctx)) => {
                let outputs = StackOutputs::from_context(plan, &ctx)?;
                let report = ApplyReport {
                    stack_name: plan.stack_name.clone(),
                    mode: plan.mode,
                    steps,
                    outputs,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                obs::emit_apply_finished(
                    &plan.stack_name,
                    report.duration_ms,
                    report.changed(),
                    report.unchanged(),
                );
                Ok(report)
            }
            Err(e) => {
                obs::emit_apply_failed(&plan.stack_name, e.failed_resource(), &e);
                Err(e)
            }
        }
    }

    /// Delete `previous` entries missing from `applied`, newest first, and
    /// record what the stack owns afterwards.
    async fn remove_orphans(
        &self,
        stack_name: &str,
        previous: &[String],
        applied: &[String],
    ) -> Result<Vec<StepReport>> {
        let mut orphans: Vec<String> = previous
            .iter()
            .filter(|id| !applied.contains(*id))
            .cloned()
            .collect();
        let mut reports = Vec::with_capacity(orphans.len());

        while let Some(logical_id) = orphans.last().cloned() {
            match self.remove(&logical_id).await {
                Ok(Some(resource)) => {
                    obs::emit_resource_deleted(&resource.logical_id, &resource.physical_id);
                    reports.push(StepReport {
                        logical_id: resource.logical_id,
                        kind: Some(resource.kind),
                        physical_id: resource.physical_id,
                        change: Some(Change::Deleted),
                    });
                }
                Ok(None) => debug!(logical_id = %logical_id, "owned resource already gone"),
                Err(e) => {
                    self.record_owned(stack_name, merge_ids(applied, &orphans)).await;
                    return Err(e);
                }
            }
            orphans.pop();
        }

        self.record_owned(stack_name, applied.to_vec()).await;
        Ok(reports)
    }

    /// Describe then delete one resource. `None` if it did not exist.
    async fn remove(&self, logical_id: &str) -> Result<Option<ProvisionedResource>> {
        let existing = self.describe(logical_id).await?;
        let deleted = self
            .provider
            .delete(logical_id)
            .await
            .map_err(|source| SiteError::ResourceFailed {
                logical_id: logical_id.to_string(),
                source,
            })?;
        Ok(existing.filter(|_| deleted))
    }

    async fn owned(&self, stack_name: &str) -> Result<Vec<String>> {
        self.provider
            .stack_resources(stack_name)
            .await
            .map_err(|source| SiteError::ResourceFailed {
                logical_id: stack_name.to_string(),
                source,
            })
    }

    /// Failures are logged, not returned.
    async fn record_owned(&self, stack_name: &str, logical_ids: Vec<String>) {
        if let Err(e) = self.provider.record_stack(stack_name, logical_ids).await {
            warn!(stack = %stack_name, error = %e, "failed to record owned resources");
        }
    }

    async fn apply_steps(
        &self,
        plan: &ConstructionPlan,
        applied: &mut Vec<String>,
    ) -> Result<(Vec<StepReport>, ResolutionContext)> {
        let mut ctx = ResolutionContext::new();
        let mut reports = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            match step {
                PlannedStep::LookupZone {
                    logical_id,
                    domain_name,
                } => {
                    let zone = self
                        .provider
                        .lookup_zone(domain_name)
                        .await
                        .map_err(|source| SiteError::ZoneLookup {
                            domain: domain_name.clone(),
                            source,
                        })?;
                    debug!(zone_id = %zone.zone_id, zone = %zone.zone_name, "hosted zone resolved");
                    ctx.insert(
                        logical_id.clone(),
                        [
                            ("Ref".to_string(), zone.zone_id.clone()),
                            ("HostedZoneId".to_string(), zone.zone_id.clone()),
                            ("ZoneName".to_string(), zone.zone_name.clone()),
                        ]
                        .into_iter()
                        .collect(),
                    );
                    reports.push(StepReport {
                        logical_id: logical_id.clone(),
                        kind: None,
                        physical_id: zone.zone_id,
                        change: None,
                    });
                }
                PlannedStep::Provision(spec) => {
                    let mut resolved = resolve_spec(spec, &ctx, &plan.region)?;
                    if spec.kind == ResourceKind::BucketDeployment {
                        self.sync_content(&mut resolved).await?;
                    }
                    let outcome = self.provider.provision(&resolved).await.map_err(|source| {
                        SiteError::ResourceFailed {
                            logical_id: spec.logical_id.clone(),
                            source,
                        }
                    })?;
                    let resource = outcome.resource;
                    applied.push(resource.logical_id.clone());
                    obs::emit_resource_provisioned(
                        &resource.logical_id,
                        &resource.physical_id,
                        outcome.change,
                    );
                    reports.push(StepReport {
                        logical_id: resource.logical_id.clone(),
                        kind: Some(resource.kind),
                        physical_id: resource.physical_id.clone(),
                        change: Some(outcome.change),
                    });
                    ctx.insert(resource.logical_id, resource.attributes);
                }
            }
        }
        Ok((reports, ctx))
    }

    /// Objects under the deployment's sources. `None` when no source
    /// directory exists, which leaves the bucket untouched.
    fn local_content(&self, spec: &ResourceSpec) -> Result<Option<Vec<StoredObject>>> {
        let sources: Vec<String> = spec
            .properties
            .get("sources")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let mut objects = Vec::new();
        let mut found = false;
        for source in sources {
            let path = self.source_path(&source);
            if !path.exists() {
                warn!(source = %path.display(), "content source missing, nothing to upload");
                continue;
            }
            found = true;
            objects.extend(collect_objects(&path)?);
        }
        Ok(found.then_some(objects))
    }

    fn source_path(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.content_root.join(path)
        }
    }

    /// Mirror local content into the bucket, then stamp its digest onto the
    /// deployment so a content change re-provisions it (and re-invalidates
    /// the cache).
    async fn sync_content(&self, spec: &mut ResourceSpec) -> Result<()> {
        let content = self.local_content(spec)?;
        let objects = content.clone().unwrap_or_default();
        spec.properties["sourceDigest"] = json!(digest_objects(&objects).as_str());

        let bucket = spec
            .properties
            .get("destinationBucketName")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let (Some(bucket), Some(objects)) = (bucket, content) {
            let summary = sync_bucket(self.provider.as_ref(), &bucket, objects)
                .await
                .map_err(|source| SiteError::ResourceFailed {
                    logical_id: spec.logical_id.clone(),
                    source,
                })?;
            debug!(
                bucket = %bucket,
                uploaded = summary.uploaded,
                pruned = summary.pruned,
                "content synced"
            );
        }
        Ok(())
    }

    /// Predict what `apply` would do, without changing anything.
    ///
    /// Resources whose inputs cannot be resolved yet are reported as
    /// created (if absent) or updated. Owned resources the plan drops are
    /// reported as deleted, in the order apply would delete them.
    pub async fn diff(&self, plan: &ConstructionPlan) -> Result<Vec<StepReport>> {
        let mut ctx = ResolutionContext::new();
        let mut reports = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            match step {
                PlannedStep::LookupZone {
                    logical_id,
                    domain_name,
                } => {
                    let zone = self
                        .provider
                        .lookup_zone(domain_name)
                        .await
                        .map_err(|source| SiteError::ZoneLookup {
                            domain: domain_name.clone(),
                            source,
                        })?;
                    ctx.insert(
                        logical_id.clone(),
                        [("HostedZoneId".to_string(), zone.zone_id.clone())]
                            .into_iter()
                            .collect(),
                    );
                    reports.push(StepReport {
                        logical_id: logical_id.clone(),
                        kind: None,
                        physical_id: zone.zone_id,
                        change: None,
                    });
                }
                PlannedStep::Provision(spec) => {
                    let existing = self.describe(&spec.logical_id).await?;
                    let report = match existing {
                        None => StepReport {
                            logical_id: spec.logical_id.clone(),
                            kind: Some(spec.kind),
                            physical_id: String::new(),
                            change: Some(Change::Created),
                        },
                        Some(current) => {
                            let change = match resolve_spec(spec, &ctx, &plan.region) {
                                Ok(mut resolved) => {
                                    if spec.kind == ResourceKind::BucketDeployment {
                                        let objects =
                                            self.local_content(&resolved)?.unwrap_or_default();
                                        resolved.properties["sourceDigest"] =
                                            json!(digest_objects(&objects).as_str());
                                    }
                                    predicted_change(&current, &resolved)
                                }
                                Err(_) => changed_kind(spec.kind),
                            };
                            let report = StepReport {
                                logical_id: spec.logical_id.clone(),
                                kind: Some(spec.kind),
                                physical_id: current.physical_id.clone(),
                                change: Some(change),
                            };
                            ctx.insert(current.logical_id, current.attributes);
                            report
                        }
                    };
                    reports.push(report);
                }
            }
        }

        let planned: Vec<&str> = plan.resource_specs().map(|s| s.logical_id.as_str()).collect();
        for logical_id in self.owned(&plan.stack_name).await?.iter().rev() {
            if planned.contains(&logical_id.as_str()) {
                continue;
            }
            if let Some(current) = self.describe(logical_id).await? {
                reports.push(StepReport {
                    logical_id: current.logical_id,
                    kind: Some(current.kind),
                    physical_id: current.physical_id,
                    change: Some(Change::Deleted),
                });
            }
        }
        Ok(reports)
    }

    async fn describe(&self, logical_id: &str) -> Result<Option<ProvisionedResource>> {
        self.provider
            .describe(logical_id)
            .await
            .map_err(|source| SiteError::ResourceFailed {
                logical_id: logical_id.to_string(),
                source,
            })
    }

    /// Outputs of a previously applied plan, read back from the provider.
    pub async fn outputs(&self, plan: &ConstructionPlan) -> Result<StackOutputs> {
        let mut ctx = ResolutionContext::new();
        for spec in plan.resource_specs() {
            if let Some(resource) = self.describe(&spec.logical_id).await? {
                ctx.insert(resource.logical_id, resource.attributes);
            }
        }
        StackOutputs::from_context(plan, &ctx)
    }

    /// Delete everything the stack owns, plus anything `plan` declares,
    /// newest first. Zone lookups are left alone; the zone was never ours.
    pub async fn teardown(&self, plan: &ConstructionPlan) -> Result<TeardownReport> {
        let _span = StackSpan::enter(&plan.stack_name, "teardown");
        let mut report = TeardownReport::default();

        let owned = self.owned(&plan.stack_name).await?;
        let planned: Vec<String> = plan.resource_specs().map(|s| s.logical_id.clone()).collect();
        let mut remaining = merge_ids(&owned, &planned);

        while let Some(logical_id) = remaining.last().cloned() {
            match self.provider.delete(&logical_id).await {
                Ok(true) => report.deleted.push(logical_id),
                Ok(false) => report.missing.push(logical_id),
                Err(source) => {
                    self.record_owned(&plan.stack_name, remaining).await;
                    return Err(SiteError::ResourceFailed { logical_id, source });
                }
            }
            remaining.pop();
        }
        self.record_owned(&plan.stack_name, Vec::new()).await;
        Ok(report)
    }
}

/// `first` followed by the ids of `then` it lacks, without duplicates.
fn merge_ids(first: &[String], then: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(first.len() + then.len());
    for id in first.iter().chain(then) {
        if !merged.contains(id) {
            merged.push(id.clone());
        }
    }
    merged
}

fn resolve_spec(spec: &ResourceSpec, ctx: &ResolutionContext, default_region: &str) -> Result<ResourceSpec> {
    Ok(ResourceSpec {
        properties: resolve(&spec.properties, ctx, &spec.logical_id)?,
        region: Some(
            spec.region
                .clone()
                .unwrap_or_else(|| default_region.to_string()),
        ),
        ..spec.clone()
    })
}

fn changed_kind(kind: ResourceKind) -> Change {
    if kind.replaces_on_update() {
        Change::Replaced
    } else {
        Change::Updated
    }
}

fn predicted_change(current: &ProvisionedResource, desired: &ResourceSpec) -> Change {
    if current.digest == desired.digest() {
        Change::Unchanged
    } else {
        changed_kind(desired.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitestack_provider::MemoryProvider;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_bare_apply_reports_outputs() {
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone());
        let report = orchestrator
            .deploy(&SiteConfiguration::default(), &StackSettings::default())
            .await
            .unwrap();

        assert_eq!(report.mode, TopologyMode::Bare);
        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.changed(), 3);
        assert!(report.outputs.pipeline_name.is_none());
        assert!(report.outputs.alarm_topic_arn.is_none());
        assert!(report.outputs.site_url.ends_with(".cloudfront.net"));
        assert_eq!(provider.resource_count(), 3);
    }

    #[tokio::test]
    async fn test_content_is_uploaded_and_digest_stamped() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public/index.html"), "hello").unwrap();

        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone()).with_content_root(dir.path());
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        let report = orchestrator.apply(&plan).await.unwrap();

        let objects = provider.objects(&report.outputs.bucket_name);
        assert_eq!(objects.get("index.html").map(Vec::as_slice), Some(&b"hello"[..]));
        assert_eq!(provider.invalidations().len(), 1);

        // same content: nothing changes, no new invalidation
        let again = orchestrator.apply(&plan).await.unwrap();
        assert!(again.is_noop());
        assert_eq!(provider.invalidations().len(), 1);

        // new content: deployment updates and invalidates again
        std::fs::write(dir.path().join("public/index.html"), "hello again").unwrap();
        let third = orchestrator.apply(&plan).await.unwrap();
        assert_eq!(
            third.step("DeployWithInvalidation").and_then(|s| s.change),
            Some(Change::Updated)
        );
        assert_eq!(provider.invalidations().len(), 2);
    }

    #[tokio::test]
    async fn test_removed_file_is_pruned_on_redeploy() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public/index.html"), "home").unwrap();
        std::fs::write(dir.path().join("public/old.html"), "retired").unwrap();

        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone()).with_content_root(dir.path());
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        let report = orchestrator.apply(&plan).await.unwrap();
        let bucket = report.outputs.bucket_name.clone();
        assert_eq!(provider.objects(&bucket).len(), 2);

        std::fs::remove_file(dir.path().join("public/old.html")).unwrap();
        let redeploy = orchestrator.apply(&plan).await.unwrap();
        assert_eq!(
            redeploy.step("DeployWithInvalidation").and_then(|s| s.change),
            Some(Change::Updated)
        );
        let keys: Vec<String> = provider.objects(&bucket).into_keys().collect();
        assert_eq!(keys, vec!["index.html"]);
    }

    #[tokio::test]
    async fn test_missing_content_dir_leaves_bucket_alone() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone()).with_content_root(dir.path());
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        let report = orchestrator.apply(&plan).await.unwrap();

        // uploaded out of band, e.g. by a pipeline run
        provider
            .put_objects(
                &report.outputs.bucket_name,
                vec![StoredObject {
                    key: "index.html".to_string(),
                    body: b"built".to_vec(),
                }],
            )
            .await
            .unwrap();

        orchestrator.apply(&plan).await.unwrap();
        assert!(provider.objects(&report.outputs.bucket_name).contains_key("index.html"));
    }

    #[tokio::test]
    async fn test_diff_before_and_after_apply() {
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone());
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();

        let before = orchestrator.diff(&plan).await.unwrap();
        assert!(before.iter().all(|s| s.change == Some(Change::Created)));
        assert_eq!(provider.resource_count(), 0);

        orchestrator.apply(&plan).await.unwrap();
        let after = orchestrator.diff(&plan).await.unwrap();
        assert!(after.iter().all(|s| s.change == Some(Change::Unchanged)));
    }

    #[tokio::test]
    async fn test_outputs_require_applied_stack() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryProvider::new()));
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        let err = orchestrator.outputs(&plan).await.unwrap_err();
        assert!(matches!(err, SiteError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_merge_ids_keeps_first_order() {
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            merge_ids(&ids(&["a", "b", "c"]), &ids(&["b", "d", "a", "e"])),
            ids(&["a", "b", "c", "d", "e"])
        );
    }

    #[tokio::test]
    async fn test_teardown_reverse_order() {
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Orchestrator::new(provider.clone());
        let plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        orchestrator.apply(&plan).await.unwrap();

        let report = orchestrator.teardown(&plan).await.unwrap();
        assert_eq!(
            report.deleted,
            vec!["DeployWithInvalidation", "SiteDistribution", "SiteBucket"]
        );
        assert!(report.missing.is_empty());
        assert_eq!(provider.resource_count(), 0);
        assert!(provider.snapshot().stacks.is_empty());

        let again = orchestrator.teardown(&plan).await.unwrap();
        assert!(again.deleted.is_empty());
        assert_eq!(again.missing.len(), 3);
    }
}

//! Construction plan: the ordered list of resources a configuration needs.
//!
//! [`build_plan`] is a pure function of the configuration and settings. It
//! performs no provider calls, so a plan can be inspected, diffed and
//! validated as a dry run before [`crate::Orchestrator::apply`] touches
//! anything.
//!
//! Steps are in dependency order. Every `depends_on` entry and every
//! `${LogicalId.Attribute}` token in a step must name an earlier step.

use std::collections::BTreeSet;

use serde::Serialize;
use sitestack_provider::{ResourceKind, ResourceSpec};

use crate::certificate::{alias_record, domain_binding, site_certificate};
use crate::config::{SiteConfiguration, StackSettings};
use crate::error::{Result, SiteError};
use crate::monitoring::monitoring_resources;
use crate::obs;
use crate::pipeline::pipeline_resources;
use crate::resources::{content_deployment, site_bucket, site_distribution, ZONE};
use crate::token::references;
use crate::topology::{Topology, TopologyMode};

/// One step of a construction plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlannedStep {
    /// Resolve an existing hosted zone. Never creates one.
    LookupZone {
        logical_id: String,
        domain_name: String,
    },
    /// Create or update a resource.
    Provision(ResourceSpec),
}

impl PlannedStep {
    pub fn logical_id(&self) -> &str {
        match self {
            PlannedStep::LookupZone { logical_id, .. } => logical_id,
            PlannedStep::Provision(spec) => &spec.logical_id,
        }
    }

    /// Resource kind, `None` for lookups.
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            PlannedStep::LookupZone { .. } => None,
            PlannedStep::Provision(spec) => Some(spec.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructionPlan {
    pub stack_name: String,
    pub mode: TopologyMode,
    pub effective_domain: Option<String>,
    pub region: String,
    pub steps: Vec<PlannedStep>,
}

impl ConstructionPlan {
    pub fn contains(&self, logical_id: &str) -> bool {
        self.step(logical_id).is_some()
    }

    pub fn step(&self, logical_id: &str) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.logical_id() == logical_id)
    }

    pub fn count_of_kind(&self, kind: ResourceKind) -> usize {
        self.steps.iter().filter(|s| s.kind() == Some(kind)).count()
    }

    pub fn logical_ids(&self) -> Vec<&str> {
        self.steps.iter().map(PlannedStep::logical_id).collect()
    }

    pub fn resource_specs(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.steps.iter().filter_map(|s| match s {
            PlannedStep::Provision(spec) => Some(spec),
            PlannedStep::LookupZone { .. } => None,
        })
    }

    /// Check that logical ids are unique and every dependency and token
    /// points at an earlier step.
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for step in &self.steps {
            if let PlannedStep::Provision(spec) = step {
                for dep in &spec.depends_on {
                    if !seen.contains(dep.as_str()) {
                        return Err(SiteError::InvalidPlan(format!(
                            "'{}' depends on '{}', which is not declared before it",
                            spec.logical_id, dep
                        )));
                    }
                }
                for reference in references(&spec.properties) {
                    if !seen.contains(reference.logical_id.as_str()) {
                        return Err(SiteError::InvalidPlan(format!(
                            "'{}' references {}.{} before it is declared",
                            spec.logical_id, reference.logical_id, reference.attribute
                        )));
                    }
                }
            }
            if !seen.insert(step.logical_id()) {
                return Err(SiteError::InvalidPlan(format!(
                    "duplicate logical id '{}'",
                    step.logical_id()
                )));
            }
        }
        Ok(())
    }
}

/// Build the construction plan for a configuration.
///
/// Incomplete configuration is never an error; it selects the bare
/// topology. The returned plan has already been validated.
pub fn build_plan(config: &SiteConfiguration, settings: &StackSettings) -> Result<ConstructionPlan> {
    let topology = Topology::decide(config);
    let effective_domain = config.effective_domain();

    let mut steps = vec![PlannedStep::Provision(site_bucket(effective_domain.as_deref()))];

    match &topology {
        Topology::Full { domain, source } => {
            steps.push(PlannedStep::LookupZone {
                logical_id: ZONE.to_string(),
                domain_name: domain.zone_name.clone(),
            });
            steps.push(PlannedStep::Provision(site_certificate(&domain.site_domain)));
            let binding = domain_binding(&domain.site_domain);
            steps.push(PlannedStep::Provision(site_distribution(Some(&binding))));
            steps.push(PlannedStep::Provision(alias_record(&domain.site_domain)));
            steps.extend(
                pipeline_resources(source, settings)
                    .into_iter()
                    .map(PlannedStep::Provision),
            );
            steps.extend(
                monitoring_resources(settings)?
                    .into_iter()
                    .map(PlannedStep::Provision),
            );
        }
        Topology::Bare => {
            steps.push(PlannedStep::Provision(site_distribution(None)));
        }
    }

    steps.push(PlannedStep::Provision(content_deployment(&settings.content_dir)));

    let plan = ConstructionPlan {
        stack_name: settings.name.clone(),
        mode: topology.mode(),
        effective_domain,
        region: settings.region.clone(),
        steps,
    };
    plan.validate()?;
    obs::emit_plan_built(&plan.stack_name, plan.mode, plan.steps.len());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::resources::*;

    fn full_config() -> SiteConfiguration {
        SiteConfiguration {
            domain_name: Some("example.com".to_string()),
            site_sub_domain: Some("www".to_string()),
            repo_owner: Some("octo".to_string()),
            repo_name: Some("blog".to_string()),
            access_token: Some(Secret::new("token")),
        }
    }

    #[test]
    fn test_full_plan_shape() {
        let plan = build_plan(&full_config(), &StackSettings::default()).unwrap();
        assert_eq!(plan.mode, TopologyMode::Full);
        assert_eq!(plan.effective_domain.as_deref(), Some("www.example.com"));
        assert_eq!(plan.count_of_kind(ResourceKind::Bucket), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::Certificate), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::Distribution), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::DnsRecord), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::Pipeline), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::Topic), 1);
        assert_eq!(plan.count_of_kind(ResourceKind::Alarm), 4);
        assert_eq!(plan.logical_ids().first(), Some(&SITE_BUCKET));
        assert_eq!(plan.logical_ids().last(), Some(&CONTENT_DEPLOYMENT));
    }

    #[test]
    fn test_zone_lookup_uses_apex() {
        let plan = build_plan(&full_config(), &StackSettings::default()).unwrap();
        match plan.step(ZONE) {
            Some(PlannedStep::LookupZone { domain_name, .. }) => {
                assert_eq!(domain_name, "example.com")
            }
            other => panic!("unexpected zone step: {:?}", other),
        }
    }

    #[test]
    fn test_bare_plan_shape() {
        let cfg = SiteConfiguration {
            access_token: None,
            ..full_config()
        };
        let plan = build_plan(&cfg, &StackSettings::default()).unwrap();
        assert_eq!(plan.mode, TopologyMode::Bare);
        assert_eq!(
            plan.logical_ids(),
            vec![SITE_BUCKET, SITE_DISTRIBUTION, CONTENT_DEPLOYMENT]
        );
        assert!(!plan.contains(ZONE));
        assert!(!plan.contains(SITE_CERTIFICATE));
    }

    #[test]
    fn test_bare_plan_keeps_domain_bucket_name() {
        let cfg = SiteConfiguration {
            repo_owner: None,
            ..full_config()
        };
        let plan = build_plan(&cfg, &StackSettings::default()).unwrap();
        match plan.step(SITE_BUCKET) {
            Some(PlannedStep::Provision(spec)) => {
                assert_eq!(spec.properties["bucketName"], "www.example.com-static-site")
            }
            other => panic!("unexpected bucket step: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let mut plan = build_plan(&full_config(), &StackSettings::default()).unwrap();
        // distribution ahead of the bucket it fronts
        plan.steps.swap(0, 3);
        assert!(matches!(plan.validate(), Err(SiteError::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut plan = build_plan(&SiteConfiguration::default(), &StackSettings::default()).unwrap();
        let first = plan.steps[0].clone();
        plan.steps.push(first);
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_plan_never_carries_the_token() {
        let plan = build_plan(&full_config(), &StackSettings::default()).unwrap();
        let rendered = serde_json::to_string(&plan).unwrap();
        assert!(!rendered.contains("\"token\""));
    }
}

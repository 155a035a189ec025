//! Topology decision.
//!
//! The configuration is split into two capabilities, a custom domain and a
//! git source. The stack only gets the full topology when both are present.
//! A domain without a source (or a source without a domain) collapses to the
//! bare topology, and the domain is then ignored entirely: no certificate, no
//! alias record, no custom hostname on the distribution.

use serde::{Deserialize, Serialize};

use crate::config::{Secret, SiteConfiguration};

/// Which family of resources a stack gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyMode {
    /// Storage and distribution only.
    Bare,
    /// Adds certificate, DNS alias, deployment pipeline and alarms.
    Full,
}

impl std::fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyMode::Bare => write!(f, "bare"),
            TopologyMode::Full => write!(f, "full"),
        }
    }
}

/// A domain the operator owns, resolved to the name the site is served on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomain {
    /// Zone apex used for the hosted zone lookup (e.g. `example.com`)
    pub zone_name: String,
    /// Fully qualified site name (e.g. `www.example.com`)
    pub site_domain: String,
}

/// Repository the deployment pipeline pulls from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub owner: String,
    pub repo: String,
    pub token: Secret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainCapability {
    None,
    Custom(CustomDomain),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCapability {
    None,
    GitSource(GitSource),
}

impl DomainCapability {
    pub fn from_config(config: &SiteConfiguration) -> Self {
        match (config.domain_name(), config.effective_domain()) {
            (Some(zone), Some(site)) => DomainCapability::Custom(CustomDomain {
                zone_name: zone.to_string(),
                site_domain: site,
            }),
            _ => DomainCapability::None,
        }
    }
}

impl PipelineCapability {
    pub fn from_config(config: &SiteConfiguration) -> Self {
        match (config.repo_owner(), config.repo_name(), config.access_token()) {
            (Some(owner), Some(repo), Some(token)) => PipelineCapability::GitSource(GitSource {
                owner: owner.to_string(),
                repo: repo.to_string(),
                token: token.clone(),
            }),
            _ => PipelineCapability::None,
        }
    }
}

/// The decided topology, carrying what the full branch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Bare,
    Full {
        domain: CustomDomain,
        source: GitSource,
    },
}

impl Topology {
    /// All-or-nothing gate over the two capabilities.
    pub fn decide(config: &SiteConfiguration) -> Self {
        match (
            DomainCapability::from_config(config),
            PipelineCapability::from_config(config),
        ) {
            (DomainCapability::Custom(domain), PipelineCapability::GitSource(source)) => {
                Topology::Full { domain, source }
            }
            _ => Topology::Bare,
        }
    }

    pub fn mode(&self) -> TopologyMode {
        match self {
            Topology::Bare => TopologyMode::Bare,
            Topology::Full { .. } => TopologyMode::Full,
        }
    }
}

/// Select the topology mode for a configuration. Never fails.
pub fn plan(config: &SiteConfiguration) -> TopologyMode {
    Topology::decide(config).mode()
}

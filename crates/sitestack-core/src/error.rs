//! Domain-level error taxonomy for sitestack.
//!
//! Incomplete configuration is deliberately absent: it resolves to the bare
//! topology and never produces an error.

use sitestack_provider::ProviderError;

/// sitestack domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("hosted zone lookup failed for '{domain}': {source}")]
    ZoneLookup {
        domain: String,
        #[source]
        source: ProviderError,
    },

    #[error("resource '{logical_id}' failed: {source}")]
    ResourceFailed {
        logical_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("unresolved reference {logical_id}.{attribute} in '{referenced_by}'")]
    UnresolvedReference {
        referenced_by: String,
        logical_id: String,
        attribute: String,
    },

    #[error("invalid construction plan: {0}")]
    InvalidPlan(String),

    #[error("invalid pipeline definition: {0}")]
    InvalidPipeline(String),

    #[error("unknown alarm: {0}")]
    UnknownAlarm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiteError {
    /// Logical id of the resource that aborted an apply, if any.
    pub fn failed_resource(&self) -> Option<&str> {
        match self {
            SiteError::ZoneLookup { .. } => Some(crate::resources::ZONE),
            SiteError::ResourceFailed { logical_id, .. } => Some(logical_id),
            _ => None,
        }
    }
}

/// Result type for sitestack domain operations.
pub type Result<T> = std::result::Result<T, SiteError>;

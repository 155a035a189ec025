//! Pipeline execution errors.
//!
//! Only problems that prevent a run from starting are returned as errors.
//! Failures inside a run (a build command exiting non-zero, a denied
//! invalidation) are recorded on the run result instead.

use sitestack_core::SiteError;
use sitestack_provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pipeline: {0}")]
    InvalidDefinition(#[from] SiteError),

    #[error("pipeline '{pipeline}' still holds unresolved reference {reference}")]
    Unresolved { pipeline: String, reference: String },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("source fetch failed for {owner}/{repo}@{branch}: {reason}")]
    Source {
        owner: String,
        repo: String,
        branch: String,
        reason: String,
    },

    #[error("artifact '{0}' has not been produced")]
    ArtifactMissing(String),

    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

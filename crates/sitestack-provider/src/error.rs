//! Error types for sitestack-provider

use thiserror::Error;

/// Errors surfaced by a cloud provider implementation.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No hosted zone is registered under the requested name
    #[error("hosted zone not found for domain: {domain}")]
    ZoneNotFound { domain: String },

    /// The provider rejected a create or update call
    #[error("failed to provision {logical_id}: {reason}")]
    ProvisionFailed { logical_id: String, reason: String },

    /// A referenced resource does not exist
    #[error("resource not found: {id}")]
    ResourceNotFound { id: String },

    /// The principal lacks a grant for the requested action
    #[error("access denied: {principal} is not allowed to perform {action} on {resource}")]
    AccessDenied {
        principal: String,
        action: String,
        resource: String,
    },

    /// A resource spec is missing a property the provider requires
    #[error("invalid properties for {logical_id}: {reason}")]
    InvalidProperties { logical_id: String, reason: String },

    /// A content digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Snapshot (de)serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}

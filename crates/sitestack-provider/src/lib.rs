//! sitestack-provider: the cloud platform boundary
//!
//! ## Layer 0 - Provider
//!
//! Everything the orchestrator and the deployment pipeline need from the
//! underlying cloud goes through the [`CloudProvider`] trait. Resource
//! allocation itself is the provider's business; this crate only fixes the
//! contract and ships an in-memory implementation.
//!
//! ## Key Components
//!
//! - `ResourceSpec`: desired state of one resource, keyed by logical id
//! - `ProvisionedResource`: what the provider reports back, with attributes
//! - `MemoryProvider`: snapshot-able in-memory provider

mod error;
pub mod memory;
pub mod provider_traits;

pub use error::ProviderError;
pub use memory::{MemoryProvider, ProviderSnapshot, CREATE_INVALIDATION_ACTION};
pub use provider_traits::{
    Change, CloudProvider, ContentDigest, HostedZone, InvalidationRecord, PolicyStatement,
    ProvisionOutcome, ProvisionedResource, ProviderResult, ResourceKind, ResourceSpec,
    StoredObject,
};

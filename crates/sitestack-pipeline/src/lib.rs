//! sitestack pipeline - runs the declared delivery pipeline
//!
//! Provides an executor that:
//! - Fetches the watched branch into a run-scoped artifact store
//! - Runs build commands in stage and run-order sequence
//! - Uploads build output and invalidates the distribution cache
//! - Records an ordered event log that can be audited afterwards

pub mod artifacts;
pub mod audit;
pub mod error;
pub mod event;
pub mod executor;
pub mod runner;
pub mod source;
pub mod spec;

// Re-export key types
pub use audit::{AuditVerdict, OrderingAudit};
pub use error::{PipelineError, Result};
pub use event::{EventLog, RunEvent, RunEventKind};
pub use executor::{
    ActionResult, ActionStatus, PipelineExecutor, PipelineRunResult, StageResult, StageStatus,
};
pub use runner::{CommandResult, CommandRunner};
pub use source::{LocalSource, SourceRepository, SourceRevision};
pub use spec::{RunSpec, RunTrigger};

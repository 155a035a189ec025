//! Run identity: what ran, and why.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sitestack_core::PipelineDefinition;

/// Why a run started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunTrigger {
    /// Operator retry or first run.
    Manual,
    /// A change on the watched branch.
    SourceChange { branch: String },
}

/// Stable identity of a pipeline shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub pipeline_name: String,

    /// SHA-256 of ordered `stage/action@run_order` entries.
    pub stages_digest: String,

    pub trigger: RunTrigger,
}

impl RunSpec {
    pub fn new(definition: &PipelineDefinition, trigger: RunTrigger) -> Self {
        Self {
            pipeline_name: definition.name.clone(),
            stages_digest: compute_stages_digest(definition),
            trigger,
        }
    }
}

fn compute_stages_digest(definition: &PipelineDefinition) -> String {
    let mut hasher = Sha256::new();
    for stage in &definition.stages {
        for action in &stage.actions {
            hasher.update(format!("{}/{}@{}", stage.name, action.name, action.run_order).as_bytes());
            hasher.update(b"\0");
        }
    }
    hex::encode(hasher.finalize())
}

//! Ordered run event log.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    StageStarted,
    ActionStarted,
    ActionSucceeded,
    ActionFailed,
    StageSucceeded,
    StageFailed,
    StageNotExecuted,
    RunFinished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Monotonic within a run, starting at 1
    pub seq: u64,
    pub kind: RunEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log shared by the actions of a run.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<RunEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &self,
        kind: RunEventKind,
        stage: Option<&str>,
        action: Option<(&str, u32)>,
        message: Option<String>,
    ) -> u64 {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = events.len() as u64 + 1;
        events.push(RunEvent {
            seq,
            kind,
            stage: stage.map(str::to_string),
            action: action.map(|(name, _)| name.to_string()),
            run_order: action.map(|(_, order)| order),
            message,
            timestamp: Utc::now(),
        });
        seq
    }

    pub fn run(&self, kind: RunEventKind, message: Option<String>) -> u64 {
        self.push(kind, None, None, message)
    }

    pub fn stage(&self, kind: RunEventKind, stage: &str) -> u64 {
        self.push(kind, Some(stage), None, None)
    }

    pub fn action(
        &self,
        kind: RunEventKind,
        stage: &str,
        action: &str,
        run_order: u32,
        message: Option<String>,
    ) -> u64 {
        self.push(kind, Some(stage), Some((action, run_order)), message)
    }

    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

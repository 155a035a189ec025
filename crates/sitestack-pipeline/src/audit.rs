//! Ordering audit over a run's event log.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sitestack_core::PipelineDefinition;

use crate::event::{RunEvent, RunEventKind};

/// Audit verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub passed: bool,

    /// Violations found (empty if passed).
    pub violations: Vec<String>,

    pub message: String,
}

/// Checks that a recorded run respected stage and run-order sequencing.
pub struct OrderingAudit;

impl OrderingAudit {
    /// Evaluate `events` against the shape of `definition`.
    ///
    /// Rules:
    /// - a stage starts only after the stage before it succeeded, and never
    ///   while another stage is running
    /// - an action starts only after every lower run-order action of its
    ///   stage succeeded
    /// - nothing starts after a stage failed
    /// - every started action reaches a terminal event
    pub fn evaluate(definition: &PipelineDefinition, events: &[RunEvent]) -> AuditVerdict {
        let mut violations = Vec::new();

        let mut open_stage: Option<String> = None;
        let mut succeeded_stages: HashSet<String> = HashSet::new();
        let mut failed_stage: Option<String> = None;
        let mut started: Vec<(String, String)> = Vec::new();
        let mut succeeded: HashSet<(String, String)> = HashSet::new();
        let mut failed: HashSet<(String, String)> = HashSet::new();

        let mut ordered: Vec<&RunEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.seq);

        for event in ordered {
            let stage = event.stage.clone().unwrap_or_default();
            match event.kind {
                RunEventKind::StageStarted => {
                    if let Some(open) = &open_stage {
                        violations.push(format!(
                            "Stage '{}' started while '{}' was still running",
                            stage, open
                        ));
                    }
                    if let Some(bad) = &failed_stage {
                        violations.push(format!(
                            "Stage '{}' started after stage '{}' failed",
                            stage, bad
                        ));
                    }
                    match definition.stages.iter().position(|s| s.name == stage) {
                        Some(0) => {}
                        Some(idx) => {
                            let previous = &definition.stages[idx - 1].name;
                            if !succeeded_stages.contains(previous) {
                                violations.push(format!(
                                    "Stage '{}' started before stage '{}' succeeded",
                                    stage, previous
                                ));
                            }
                        }
                        None => violations.push(format!("Stage '{}' is not declared", stage)),
                    }
                    open_stage = Some(stage);
                }
                RunEventKind::StageSucceeded | RunEventKind::StageFailed => {
                    if open_stage.as_deref() != Some(stage.as_str()) {
                        violations.push(format!("Stage '{}' finished without starting", stage));
                    }
                    open_stage = None;
                    if event.kind == RunEventKind::StageSucceeded {
                        succeeded_stages.insert(stage);
                    } else if failed_stage.is_none() {
                        failed_stage = Some(stage);
                    }
                }
                RunEventKind::ActionStarted => {
                    let action = event.action.clone().unwrap_or_default();
                    if open_stage.as_deref() != Some(stage.as_str()) {
                        violations.push(format!(
                            "Action '{}' started outside its stage '{}'",
                            action, stage
                        ));
                    }
                    let run_order = event.run_order.unwrap_or(0);
                    if let Some(declared) = definition.stage(&stage) {
                        for earlier in declared.actions.iter().filter(|a| a.run_order < run_order) {
                            if !succeeded.contains(&(stage.clone(), earlier.name.clone())) {
                                violations.push(format!(
                                    "Action '{}' (run order {}) started before '{}' (run order {}) succeeded",
                                    action, run_order, earlier.name, earlier.run_order
                                ));
                            }
                        }
                    }
                    started.push((stage, action));
                }
                RunEventKind::ActionSucceeded => {
                    succeeded.insert((stage, event.action.clone().unwrap_or_default()));
                }
                RunEventKind::ActionFailed => {
                    failed.insert((stage, event.action.clone().unwrap_or_default()));
                }
                RunEventKind::RunStarted
                | RunEventKind::RunFinished
                | RunEventKind::StageNotExecuted => {}
            }
        }

        for key in &started {
            if !succeeded.contains(key) && !failed.contains(key) {
                violations.push(format!(
                    "Action '{}' in stage '{}' started but never completed",
                    key.1, key.0
                ));
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            "Run respected stage ordering".to_string()
        } else {
            format!("Audit failed with {} violation(s)", violations.len())
        };

        AuditVerdict {
            passed,
            violations,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;
    use sitestack_core::{ActionDefinition, ActionKind, StageDefinition};

    fn deploy(name: &str, run_order: u32) -> ActionDefinition {
        ActionDefinition {
            name: name.to_string(),
            run_order,
            kind: ActionKind::S3Deploy {
                bucket_name: "b".to_string(),
                input: "in".to_string(),
            },
        }
    }

    fn definition() -> PipelineDefinition {
        PipelineDefinition {
            name: "p".to_string(),
            stages: vec![
                StageDefinition {
                    name: "Build".to_string(),
                    actions: vec![deploy("Compile", 1)],
                },
                StageDefinition {
                    name: "Deploy".to_string(),
                    actions: vec![deploy("Upload", 1), deploy("Invalidate", 2)],
                },
            ],
        }
    }

    fn run_action(log: &EventLog, stage: &str, action: &str, order: u32, ok: bool) {
        log.action(RunEventKind::ActionStarted, stage, action, order, None);
        let kind = if ok {
            RunEventKind::ActionSucceeded
        } else {
            RunEventKind::ActionFailed
        };
        log.action(kind, stage, action, order, None);
    }

    #[test]
    fn test_empty_log_passes() {
        assert!(OrderingAudit::evaluate(&definition(), &[]).passed);
    }

    #[test]
    fn test_in_order_run_passes() {
        let log = EventLog::new();
        log.stage(RunEventKind::StageStarted, "Build");
        run_action(&log, "Build", "Compile", 1, true);
        log.stage(RunEventKind::StageSucceeded, "Build");
        log.stage(RunEventKind::StageStarted, "Deploy");
        run_action(&log, "Deploy", "Upload", 1, true);
        run_action(&log, "Deploy", "Invalidate", 2, true);
        log.stage(RunEventKind::StageSucceeded, "Deploy");

        let verdict = OrderingAudit::evaluate(&definition(), &log.snapshot());
        assert!(verdict.passed, "{:?}", verdict.violations);
    }

    #[test]
    fn test_stage_after_failure_is_flagged() {
        let log = EventLog::new();
        log.stage(RunEventKind::StageStarted, "Build");
        run_action(&log, "Build", "Compile", 1, false);
        log.stage(RunEventKind::StageFailed, "Build");
        log.stage(RunEventKind::StageStarted, "Deploy");
        log.stage(RunEventKind::StageSucceeded, "Deploy");

        let verdict = OrderingAudit::evaluate(&definition(), &log.snapshot());
        assert!(!verdict.passed);
        assert!(verdict.violations.iter().any(|v| v.contains("after stage 'Build' failed")));
    }

    #[test]
    fn test_run_order_overlap_is_flagged() {
        let log = EventLog::new();
        log.stage(RunEventKind::StageStarted, "Build");
        run_action(&log, "Build", "Compile", 1, true);
        log.stage(RunEventKind::StageSucceeded, "Build");
        log.stage(RunEventKind::StageStarted, "Deploy");
        log.action(RunEventKind::ActionStarted, "Deploy", "Upload", 1, None);
        log.action(RunEventKind::ActionStarted, "Deploy", "Invalidate", 2, None);
        log.action(RunEventKind::ActionSucceeded, "Deploy", "Upload", 1, None);
        log.action(RunEventKind::ActionSucceeded, "Deploy", "Invalidate", 2, None);
        log.stage(RunEventKind::StageSucceeded, "Deploy");

        let verdict = OrderingAudit::evaluate(&definition(), &log.snapshot());
        assert_eq!(verdict.violations.len(), 1);
        assert!(verdict.violations[0].contains("'Invalidate' (run order 2)"));
    }

    #[test]
    fn test_unfinished_action_is_flagged() {
        let log = EventLog::new();
        log.stage(RunEventKind::StageStarted, "Build");
        log.action(RunEventKind::ActionStarted, "Build", "Compile", 1, None);

        let verdict = OrderingAudit::evaluate(&definition(), &log.snapshot());
        assert!(!verdict.passed);
        assert!(verdict.violations[0].contains("never completed"));
    }
}

//! Pipeline execution.
//!
//! Stages run one after another and never overlap. Inside a stage, actions
//! are grouped by run order; a group runs concurrently and the next group
//! starts only once every action of the previous group has succeeded. The
//! first failing action fails its stage and halts the run. Later stages are
//! recorded as not executed. Nothing already done is rolled back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sitestack_core::content::{collect_objects, sync_bucket};
use sitestack_core::token::references;
use sitestack_core::{obs, ActionDefinition, ActionKind, PipelineDefinition, SiteError};
use sitestack_provider::CloudProvider;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{copy_tree, ArtifactStore};
use crate::error::{PipelineError, Result};
use crate::event::{EventLog, RunEvent, RunEventKind};
use crate::runner::{CommandResult, CommandRunner};
use crate::source::SourceRepository;
use crate::spec::{RunSpec, RunTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    NotExecuted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub name: String,
    pub run_order: u32,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandResult>,
    /// Source revision, for fetch actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    fn not_executed(action: &ActionDefinition) -> Self {
        Self {
            name: action.name.clone(),
            run_order: action.run_order,
            status: ActionStatus::NotExecuted,
            message: None,
            commands: Vec::new(),
            revision: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    NotExecuted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub actions: Vec<ActionResult>,
    pub duration_ms: u64,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub run_id: String,
    pub spec: RunSpec,
    /// Whether every stage succeeded
    pub success: bool,
    pub stages: Vec<StageResult>,
    pub events: Vec<RunEvent>,
    pub duration_ms: u64,
}

impl PipelineRunResult {
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionResult> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find(|a| a.name == name)
    }

    /// The stage that halted the run, if any.
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }

    pub fn source_revision(&self) -> Option<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find_map(|a| a.revision.as_deref())
    }
}

#[derive(Default)]
struct ActionOutcome {
    commands: Vec<CommandResult>,
    revision: Option<String>,
    message: Option<String>,
    failure: Option<String>,
}

/// Executes declared pipelines against a provider and a source repository.
pub struct PipelineExecutor {
    provider: Arc<dyn CloudProvider>,
    source: Arc<dyn SourceRepository>,
    runner: CommandRunner,
    work_dir: PathBuf,
}

impl PipelineExecutor {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        source: Arc<dyn SourceRepository>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            source,
            runner: CommandRunner::default(),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Run every stage of `definition`.
    ///
    /// Returns an error only when the run cannot start (invalid or
    /// unresolved definition). Stage failures are reported on the result.
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        trigger: RunTrigger,
    ) -> Result<PipelineRunResult> {
        definition.validate()?;
        let rendered = serde_json::to_value(definition).map_err(SiteError::from)?;
        if let Some(reference) = references(&rendered).into_iter().next() {
            return Err(PipelineError::Unresolved {
                pipeline: definition.name.clone(),
                reference: format!("{}.{}", reference.logical_id, reference.attribute),
            });
        }

        let start = Instant::now();
        let spec = RunSpec::new(definition, trigger);
        let run_id = Uuid::new_v4().to_string();
        let store = ArtifactStore::new(self.work_dir.join(&run_id));
        let events = EventLog::new();

        info!(run_id = %run_id, pipeline = %definition.name, "starting pipeline run");
        events.run(RunEventKind::RunStarted, Some(definition.name.clone()));

        let mut stages = Vec::with_capacity(definition.stages.len());
        let mut halted = false;

        for stage in &definition.stages {
            if halted {
                events.stage(RunEventKind::StageNotExecuted, &stage.name);
                stages.push(StageResult {
                    name: stage.name.clone(),
                    status: StageStatus::NotExecuted,
                    actions: stage.actions.iter().map(ActionResult::not_executed).collect(),
                    duration_ms: 0,
                });
                continue;
            }

            let stage_start = Instant::now();
            events.stage(RunEventKind::StageStarted, &stage.name);
            let mut actions = Vec::with_capacity(stage.actions.len());
            let mut failed = false;

            for group in stage.run_order_groups() {
                if failed {
                    actions.extend(group.actions.iter().map(|a| ActionResult::not_executed(a)));
                    continue;
                }
                let results = join_all(
                    group
                        .actions
                        .iter()
                        .map(|action| self.execute_action(&stage.name, action, &store, &events)),
                )
                .await;
                failed = results.iter().any(|r| r.status == ActionStatus::Failed);
                actions.extend(results);
            }

            let status = if failed {
                StageStatus::Failed
            } else {
                StageStatus::Succeeded
            };
            events.stage(
                if failed {
                    RunEventKind::StageFailed
                } else {
                    RunEventKind::StageSucceeded
                },
                &stage.name,
            );
            let duration_ms = stage_start.elapsed().as_millis() as u64;
            obs::emit_stage_finished(&run_id, &stage.name, !failed, duration_ms);

            stages.push(StageResult {
                name: stage.name.clone(),
                status,
                actions,
                duration_ms,
            });
            halted = failed;
        }

        let success = !halted;
        events.run(
            RunEventKind::RunFinished,
            Some(if success { "succeeded" } else { "failed" }.to_string()),
        );
        if success {
            info!(run_id = %run_id, "pipeline run succeeded");
        } else {
            warn!(run_id = %run_id, "pipeline run failed");
        }

        Ok(PipelineRunResult {
            run_id,
            spec,
            success,
            stages,
            events: events.snapshot(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_action(
        &self,
        stage: &str,
        action: &ActionDefinition,
        store: &ArtifactStore,
        events: &EventLog,
    ) -> ActionResult {
        let start = Instant::now();
        events.action(RunEventKind::ActionStarted, stage, &action.name, action.run_order, None);

        let outcome = match self.perform(action, store).await {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome {
                failure: Some(e.to_string()),
                ..Default::default()
            },
        };

        let (status, kind, message) = match outcome.failure {
            Some(reason) => (ActionStatus::Failed, RunEventKind::ActionFailed, Some(reason)),
            None => (
                ActionStatus::Succeeded,
                RunEventKind::ActionSucceeded,
                outcome.message,
            ),
        };
        events.action(kind, stage, &action.name, action.run_order, message.clone());

        ActionResult {
            name: action.name.clone(),
            run_order: action.run_order,
            status,
            message,
            commands: outcome.commands,
            revision: outcome.revision,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn perform(&self, action: &ActionDefinition, store: &ArtifactStore) -> Result<ActionOutcome> {
        match &action.kind {
            ActionKind::GitHubSource {
                owner,
                repo,
                branch,
                output,
                ..
            } => {
                let dir = store.scratch(&action.name)?;
                let revision = self.source.fetch(owner, repo, branch, &dir).await?;
                store.register(output, dir);
                Ok(ActionOutcome {
                    message: Some(format!(
                        "fetched {} file(s) from {}/{}@{}",
                        revision.files, owner, repo, branch
                    )),
                    revision: Some(revision.revision),
                    ..Default::default()
                })
            }
            ActionKind::CodeBuild {
                input,
                output,
                spec,
                ..
            } => {
                let source = store.get(input)?;
                let dir = store.scratch(&action.name)?;
                copy_tree(&source, &dir, &[])?;

                let mut outcome = ActionOutcome::default();
                for command in spec.commands() {
                    let result = self.runner.run(command, &dir).await?;
                    let passed = result.passed();
                    let exit_code = result.exit_code;
                    outcome.commands.push(result);
                    if !passed {
                        outcome.failure =
                            Some(format!("'{}' exited with code {}", command, exit_code));
                        return Ok(outcome);
                    }
                }

                if let Some(output) = output {
                    let produced = match &spec.artifact_base_directory {
                        Some(base) => dir.join(base),
                        None => dir.clone(),
                    };
                    if !produced.is_dir() {
                        outcome.failure = Some(format!(
                            "build output directory '{}' was not produced",
                            produced.display()
                        ));
                        return Ok(outcome);
                    }
                    store.register(output, produced);
                }
                outcome.message = Some(format!("{} command(s) succeeded", outcome.commands.len()));
                Ok(outcome)
            }
            ActionKind::S3Deploy { bucket_name, input } => {
                let dir = store.get(input)?;
                let objects = collect_objects(&dir)
                    .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
                let summary = sync_bucket(self.provider.as_ref(), bucket_name, objects).await?;
                Ok(ActionOutcome {
                    message: Some(format!(
                        "uploaded {} object(s) to {}, removed {} stale",
                        summary.uploaded, bucket_name, summary.pruned
                    )),
                    ..Default::default()
                })
            }
            ActionKind::Invalidate {
                distribution_id,
                paths,
                role_arn,
                ..
            } => {
                let record = self
                    .provider
                    .create_invalidation(role_arn, distribution_id, paths)
                    .await?;
                Ok(ActionOutcome {
                    message: Some(format!(
                        "invalidation {} for {}",
                        record.invalidation_id,
                        record.paths.join(",")
                    )),
                    ..Default::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_lookups() {
        let result = PipelineRunResult {
            run_id: "run123".to_string(),
            spec: RunSpec {
                pipeline_name: "p".to_string(),
                stages_digest: "abc".to_string(),
                trigger: RunTrigger::Manual,
            },
            success: false,
            stages: vec![
                StageResult {
                    name: "Build".to_string(),
                    status: StageStatus::Failed,
                    actions: vec![ActionResult {
                        name: "Build".to_string(),
                        run_order: 1,
                        status: ActionStatus::Failed,
                        message: Some("'npm run test' exited with code 1".to_string()),
                        commands: Vec::new(),
                        revision: None,
                        duration_ms: 10,
                    }],
                    duration_ms: 10,
                },
                StageResult {
                    name: "Deploy".to_string(),
                    status: StageStatus::NotExecuted,
                    actions: Vec::new(),
                    duration_ms: 0,
                },
            ],
            events: Vec::new(),
            duration_ms: 10,
        };

        assert_eq!(result.failed_stage().map(|s| s.name.as_str()), Some("Build"));
        assert_eq!(result.action("Build").map(|a| a.status), Some(ActionStatus::Failed));
        assert_eq!(
            result.stage("Deploy").map(|s| s.status),
            Some(StageStatus::NotExecuted)
        );
        assert!(result.source_revision().is_none());
    }
}

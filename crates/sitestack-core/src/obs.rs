//! Structured observability hooks for stack lifecycle events.
//!
//! - `StackSpan` RAII guard scoping an apply or teardown pass
//! - Emission functions for plan, provisioning, pipeline and alarm events
//!
//! Events are emitted at `info!` level; failures at `warn!`. Filter with
//! `RUST_LOG`.

use sitestack_provider::Change;
use tracing::{info, warn};

use crate::alarm::AlarmTransition;
use crate::topology::TopologyMode;

/// RAII guard that enters a stack-scoped span for the duration of a pass.
///
/// ```ignore
/// let _span = StackSpan::enter("StaticSite", "apply");
/// ```
pub struct StackSpan {
    _span: tracing::span::EnteredSpan,
}

impl StackSpan {
    pub fn enter(stack_name: &str, operation: &str) -> Self {
        let span = tracing::info_span!("sitestack.stack", stack = %stack_name, op = %operation);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_plan_built(stack_name: &str, mode: TopologyMode, steps: usize) {
    info!(event = "plan.built", stack = %stack_name, mode = %mode, steps = steps);
}

pub fn emit_resource_provisioned(logical_id: &str, physical_id: &str, change: Change) {
    info!(
        event = "resource.provisioned",
        logical_id = %logical_id,
        physical_id = %physical_id,
        change = ?change,
    );
}

pub fn emit_resource_deleted(logical_id: &str, physical_id: &str) {
    info!(
        event = "resource.deleted",
        logical_id = %logical_id,
        physical_id = %physical_id,
    );
}

/// Emit event: apply pass completed.
pub fn emit_apply_finished(stack_name: &str, duration_ms: u64, changed: usize, unchanged: usize) {
    info!(
        event = "apply.finished",
        stack = %stack_name,
        duration_ms = duration_ms,
        changed = changed,
        unchanged = unchanged,
    );
}

/// Emit event: apply pass aborted at `logical_id`.
pub fn emit_apply_failed(stack_name: &str, logical_id: Option<&str>, error: &dyn std::fmt::Display) {
    warn!(
        event = "apply.failed",
        stack = %stack_name,
        logical_id = logical_id.unwrap_or("-"),
        error = %error,
    );
}

pub fn emit_stage_finished(run_id: &str, stage: &str, success: bool, duration_ms: u64) {
    info!(
        event = "pipeline.stage_finished",
        run_id = %run_id,
        stage = %stage,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_alarm_transition(transition: &AlarmTransition) {
    info!(
        event = "alarm.transition",
        alarm = %transition.alarm_name,
        from = %transition.from,
        to = %transition.to,
        window = transition.window,
    );
}

//! The orchestrator: owns the task in flight, its control context, and the
//! bounded archive of finished tasks.
//!
//! Every domain mutation is paired with a state-machine dispatch. Step status
//! bookkeeping that follows from a transition (a step starting, waiting for
//! approval, burning a heal attempt) is applied here in one place, so callers
//! only ever send events.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::context::{ControlContext, DEFAULT_MAX_HEAL_ATTEMPTS, DEFAULT_MAX_ITERATIONS};
use crate::core::history::{DEFAULT_HISTORY_LIMIT, TaskHistory};
use crate::core::invariants::{validate_context, validate_task};
use crate::core::state_machine::{Event, try_transition};
use crate::core::task::{AutonomousTask, StepSpec, TaskStep};
use crate::core::types::{AgentState, ApprovalMode, StepStatus};

/// Construction-time settings for an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub approval_mode: ApprovalMode,
    pub max_iterations: u32,
    pub max_heal_attempts: u32,
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::Auto,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_heal_attempts: DEFAULT_MAX_HEAL_ATTEMPTS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("no active task")]
    NoActiveTask,
    #[error("no step is awaiting approval (state is {0})")]
    NoPendingApproval(AgentState),
    #[error("step '{requested}' is not the step awaiting approval ('{pending}')")]
    ApprovalStepMismatch { requested: String, pending: String },
    #[error("step '{requested}' is not the current step ('{current}')")]
    NotCurrentStep { requested: String, current: String },
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("steps were already materialized for task '{0}'")]
    StepsAlreadySet(String),
    #[error("decomposition produced no steps")]
    EmptyPlan,
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: AgentState,
    },
}

/// What a pending rollback will undo once the snapshot service reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RollbackScope {
    Step(usize),
    Task,
}

#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    approval_mode: ApprovalMode,
    ctx: ControlContext,
    current_task: Option<AutonomousTask>,
    history: TaskHistory,
    next_task_number: u64,
    pending_rollback: Option<RollbackScope>,
    last_dispatch_applied: bool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            approval_mode: config.approval_mode,
            ctx: ControlContext::with_limits(config.max_iterations, config.max_heal_attempts),
            current_task: None,
            history: TaskHistory::new(config.history_limit),
            next_task_number: 1,
            pending_rollback: None,
            last_dispatch_applied: true,
            config,
        }
    }

    pub fn ctx(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn current_task(&self) -> Option<&AutonomousTask> {
        self.current_task.as_ref()
    }

    pub fn history(&self) -> &TaskHistory {
        &self.history
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.approval_mode
    }

    /// Whether the most recent dispatch changed the context.
    pub fn last_dispatch_applied(&self) -> bool {
        self.last_dispatch_applied
    }

    /// Change the approval mode. Only allowed between tasks.
    pub fn set_approval_mode(&mut self, mode: ApprovalMode) -> Result<(), OrchestratorError> {
        if !self.ctx.state.is_restartable() {
            return Err(OrchestratorError::InvalidState {
                action: "change approval mode",
                state: self.ctx.state,
            });
        }
        self.approval_mode = mode;
        Ok(())
    }

    /// Cursor of the current task, projected from the control context.
    pub fn current_step_index(&self) -> Option<usize> {
        self.current_task.as_ref()?;
        self.ctx.current_step_index
    }

    /// The step under the cursor, if the cursor points at one.
    pub fn current_step(&self) -> Option<&TaskStep> {
        let index = self.current_step_index()?;
        self.current_task.as_ref()?.steps.get(index)
    }

    /// Context and task invariant violations, empty when consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut errors = validate_context(&self.ctx);
        if let Some(task) = &self.current_task {
            errors.extend(validate_task(task, &self.ctx));
        }
        errors
    }

    /// Apply one event to the control context and the task it drives.
    ///
    /// Returns whether the event was valid for the current state.
    pub fn dispatch(&mut self, event: Event) -> bool {
        let prev = self.ctx.clone();
        let transition = try_transition(&prev, &event);
        self.last_dispatch_applied = transition.applied;
        if !transition.applied {
            warn!(event = event.name(), state = %prev.state, "ignored event");
            return false;
        }

        self.ctx = transition.context;
        debug!(
            event = event.name(),
            from = %prev.state,
            to = %self.ctx.state,
            step = ?self.ctx.current_step_index,
            heal_attempts = self.ctx.heal_attempts,
            "dispatched"
        );
        self.sync_task(&prev, &event);

        let violations = self.check_invariants();
        if !violations.is_empty() {
            warn!(?violations, "invariant violations after dispatch");
        }
        true
    }

    /// Begin a new task. Any task still held is archived first.
    pub fn start_task(&mut self, prompt: &str) -> String {
        if let Some(previous) = self.current_task.take() {
            self.archive(previous);
        }
        let task_id = format!("task-{}", self.next_task_number);
        self.next_task_number += 1;
        self.current_task = Some(AutonomousTask::new(task_id.clone(), prompt));
        self.pending_rollback = None;
        self.ctx =
            ControlContext::with_limits(self.config.max_iterations, self.config.max_heal_attempts);
        info!(task_id = %task_id, "task started");
        self.dispatch(Event::StartTask);
        task_id
    }

    /// Materialize the decomposed plan and move to the first step.
    pub fn set_steps(&mut self, specs: Vec<StepSpec>) -> Result<(), OrchestratorError> {
        let state = self.ctx.state;
        let task = self
            .current_task
            .as_mut()
            .ok_or(OrchestratorError::NoActiveTask)?;
        if !task.steps.is_empty() {
            return Err(OrchestratorError::StepsAlreadySet(task.id.clone()));
        }
        if state != AgentState::Decomposing {
            return Err(OrchestratorError::InvalidState {
                action: "set steps",
                state,
            });
        }
        if specs.is_empty() {
            self.fail_decomposition(&OrchestratorError::EmptyPlan.to_string());
            return Err(OrchestratorError::EmptyPlan);
        }

        let task_id = task.id.clone();
        task.steps = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| TaskStep::from_spec(&task_id, index, spec))
            .collect();
        let step_count = task.steps.len();
        info!(task_id = %task_id, step_count, "plan materialized");
        self.dispatch(Event::DecompositionComplete { step_count });
        Ok(())
    }

    pub fn fail_decomposition(&mut self, error: &str) -> bool {
        self.dispatch(Event::DecompositionFailed {
            error: error.to_string(),
        })
    }

    pub fn pause_task(&mut self) -> bool {
        self.dispatch(Event::Pause)
    }

    pub fn resume_task(&mut self) -> bool {
        self.dispatch(Event::Resume)
    }

    /// Cancel the task in flight and archive it. Returns the archived task id.
    pub fn cancel_task(&mut self) -> Option<String> {
        self.dispatch(Event::Cancel);
        let task = self.current_task.take()?;
        let id = task.id.clone();
        info!(task_id = %id, "task cancelled");
        self.archive(task);
        Some(id)
    }

    /// Approve the step awaiting approval. `step_id` must name that step.
    pub fn approve_step(&mut self, step_id: &str) -> Result<(), OrchestratorError> {
        self.ensure_pending_approval(step_id)?;
        self.dispatch(Event::Approve);
        Ok(())
    }

    /// Reject the step awaiting approval, starting a rollback of that step.
    pub fn reject_step(&mut self, step_id: &str) -> Result<(), OrchestratorError> {
        let index = self.ensure_pending_approval(step_id)?;
        self.pending_rollback = Some(RollbackScope::Step(index));
        self.dispatch(Event::Reject);
        Ok(())
    }

    /// Start a whole-task rollback. Returns the snapshot to restore, if one
    /// was captured; restoring it is the caller's job.
    pub fn rollback_all(&mut self) -> Result<Option<String>, OrchestratorError> {
        let anchor = self
            .current_task
            .as_ref()
            .ok_or(OrchestratorError::NoActiveTask)?
            .pre_execution_commit_id
            .clone();
        let state = self.ctx.state;
        if !self.dispatch(Event::Rollback) {
            return Err(OrchestratorError::InvalidState {
                action: "roll back",
                state,
            });
        }
        self.pending_rollback = Some(RollbackScope::Task);
        Ok(anchor)
    }

    /// Record that the snapshot service finished restoring.
    pub fn complete_rollback(&mut self) -> Result<(), OrchestratorError> {
        if self.ctx.state != AgentState::RollingBack {
            return Err(OrchestratorError::InvalidState {
                action: "complete rollback",
                state: self.ctx.state,
            });
        }
        let scope = self.pending_rollback.take().unwrap_or(RollbackScope::Task);
        if let Some(task) = self.current_task.as_mut() {
            for step in &mut task.steps {
                let affected = match scope {
                    RollbackScope::Step(index) => step.index == index,
                    RollbackScope::Task => matches!(
                        step.status,
                        StepStatus::Completed | StepStatus::Running | StepStatus::AwaitingApproval
                    ),
                };
                if affected {
                    step.status = StepStatus::RolledBack;
                }
            }
        }
        self.dispatch(Event::RollbackComplete);
        Ok(())
    }

    /// Record a step's result and advance past it.
    ///
    /// Only the step under the cursor can be completed, and only while the
    /// task is in `completing_step`.
    pub fn complete_step(
        &mut self,
        step_id: &str,
        result: &str,
        files_modified: Vec<String>,
    ) -> Result<(), OrchestratorError> {
        let state = self.ctx.state;
        if state != AgentState::CompletingStep {
            return Err(OrchestratorError::InvalidState {
                action: "complete a step",
                state,
            });
        }
        let current = self.current_step().ok_or(OrchestratorError::NoActiveTask)?;
        if current.id != step_id {
            return Err(OrchestratorError::NotCurrentStep {
                requested: step_id.to_string(),
                current: current.id.clone(),
            });
        }
        let index = current.index;

        if !self.dispatch(Event::StepComplete) {
            return Err(OrchestratorError::InvalidState {
                action: "complete a step",
                state,
            });
        }
        if let Some(step) = self
            .current_task
            .as_mut()
            .and_then(|task| task.steps.get_mut(index))
        {
            step.status = StepStatus::Completed;
            step.result = Some(result.to_string());
            step.files_modified = files_modified;
            step.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Keep unresolved findings on a step that goes to a human anyway.
    pub fn record_step_error(
        &mut self,
        step_id: &str,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        self.step_mut(step_id)?.error = Some(error.to_string());
        Ok(())
    }

    /// Mark a step failed. Nothing is dispatched: whether to retry, skip, or
    /// abort is decided by the caller.
    pub fn fail_step(&mut self, step_id: &str, error: &str) -> Result<(), OrchestratorError> {
        let step = self.step_mut(step_id)?;
        step.status = StepStatus::Failed;
        step.error = Some(error.to_string());
        step.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn set_step_snapshot(
        &mut self,
        step_id: &str,
        snapshot_id: &str,
    ) -> Result<(), OrchestratorError> {
        self.step_mut(step_id)?.git_snapshot_id = Some(snapshot_id.to_string());
        Ok(())
    }

    pub fn set_pre_execution_commit(&mut self, snapshot_id: &str) -> Result<(), OrchestratorError> {
        let task = self
            .current_task
            .as_mut()
            .ok_or(OrchestratorError::NoActiveTask)?;
        task.pre_execution_commit_id = Some(snapshot_id.to_string());
        Ok(())
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        if let Some(task) = self.current_task.as_mut() {
            task.total_tokens_used += tokens;
        }
    }

    /// Return to idle, archiving whatever task was held.
    pub fn reset(&mut self) {
        self.dispatch(Event::Reset);
        self.pending_rollback = None;
        if let Some(task) = self.current_task.take() {
            self.archive(task);
        }
    }

    fn archive(&mut self, mut task: AutonomousTask) {
        if task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }
        if let Some(evicted) = self.history.push(task) {
            debug!(task_id = %evicted.id, "evicted task from history");
        }
    }

    fn step_mut(&mut self, step_id: &str) -> Result<&mut TaskStep, OrchestratorError> {
        self.current_task
            .as_mut()
            .ok_or(OrchestratorError::NoActiveTask)?
            .step_mut(step_id)
            .ok_or_else(|| OrchestratorError::UnknownStep(step_id.to_string()))
    }

    /// Enforce the single-pending-approval rule, returning the step index.
    fn ensure_pending_approval(&self, step_id: &str) -> Result<usize, OrchestratorError> {
        if self.ctx.state != AgentState::AwaitingApproval {
            return Err(OrchestratorError::NoPendingApproval(self.ctx.state));
        }
        let pending = self
            .current_step()
            .ok_or(OrchestratorError::NoPendingApproval(self.ctx.state))?;
        if pending.id != step_id {
            return Err(OrchestratorError::ApprovalStepMismatch {
                requested: step_id.to_string(),
                pending: pending.id.clone(),
            });
        }
        Ok(pending.index)
    }

    /// Step and task bookkeeping implied by a transition from `prev`.
    fn sync_task(&mut self, prev: &ControlContext, event: &Event) {
        let ctx = &self.ctx;
        let Some(task) = self.current_task.as_mut() else {
            return;
        };
        let now = Utc::now();
        let step = ctx.current_step_index.and_then(|index| task.steps.get_mut(index));

        if let Some(step) = step {
            match ctx.state {
                AgentState::ExecutingStep if step.status == StepStatus::Pending => {
                    step.status = StepStatus::Running;
                    step.started_at = Some(now);
                }
                AgentState::AwaitingApproval => step.status = StepStatus::AwaitingApproval,
                AgentState::CompletingStep if step.status == StepStatus::AwaitingApproval => {
                    step.status = StepStatus::Running;
                }
                AgentState::CompletingStep
                    if matches!(
                        event,
                        Event::ValidationFail { .. } | Event::HealFailed { .. }
                    ) =>
                {
                    // Heal bound exhausted: the step is accepted with its errors on record.
                    step.error = ctx.last_error.clone();
                }
                AgentState::Failed
                    if prev.state != AgentState::RollingBack
                        && matches!(
                            step.status,
                            StepStatus::Running | StepStatus::AwaitingApproval
                        ) =>
                {
                    step.status = StepStatus::Failed;
                    step.error = ctx.last_error.clone();
                    step.completed_at = Some(now);
                }
                _ => {}
            }
            if ctx.heal_attempts > prev.heal_attempts {
                step.retry_count += 1;
            }
        }

        if ctx.state.is_terminal() && !prev.state.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state_machine::ROLLED_BACK_BY_USER;
    use crate::test_support::step_specs;

    fn started_with_steps(n: usize) -> Orchestrator {
        let mut orch = Orchestrator::default();
        orch.start_task("build a landing page");
        orch.set_steps(step_specs(n)).expect("set steps");
        orch
    }

    fn run_to_completing(orch: &mut Orchestrator) {
        assert!(orch.dispatch(Event::StepStreamComplete));
        assert!(orch.dispatch(Event::ValidationPass));
    }

    #[test]
    fn start_task_enters_decomposing_with_fresh_task() {
        let mut orch = Orchestrator::default();
        let id = orch.start_task("make a todo app");

        assert_eq!(id, "task-1");
        assert_eq!(orch.ctx().state, AgentState::Decomposing);
        let task = orch.current_task().expect("task");
        assert_eq!(task.user_prompt, "make a todo app");
        assert!(task.steps.is_empty());
        assert_eq!(orch.current_step_index(), None);
    }

    #[test]
    fn set_steps_materializes_plan_and_starts_first_step() {
        let orch = started_with_steps(3);

        assert_eq!(orch.ctx().state, AgentState::ExecutingStep);
        assert_eq!(orch.ctx().total_steps, 3);
        assert_eq!(orch.current_step_index(), Some(0));
        let step = orch.current_step().expect("step");
        assert_eq!(step.status, StepStatus::Running);
        assert!(step.started_at.is_some());
        assert!(orch.check_invariants().is_empty());
    }

    #[test]
    fn set_steps_rejects_empty_plan_and_fails_task() {
        let mut orch = Orchestrator::default();
        orch.start_task("p");
        let err = orch.set_steps(Vec::new()).expect_err("empty plan");

        assert_eq!(err, OrchestratorError::EmptyPlan);
        assert_eq!(orch.ctx().state, AgentState::Failed);
        assert_eq!(
            orch.ctx().last_error.as_deref(),
            Some("decomposition produced no steps")
        );
    }

    #[test]
    fn set_steps_is_called_once_per_task() {
        let mut orch = started_with_steps(2);
        let err = orch.set_steps(step_specs(1)).expect_err("second call");
        assert!(matches!(err, OrchestratorError::StepsAlreadySet(_)));
    }

    #[test]
    fn complete_step_advances_cursor_and_finishes_task() {
        let mut orch = started_with_steps(2);

        for _ in 0..2 {
            let id = orch.current_step().expect("step").id.clone();
            run_to_completing(&mut orch);
            orch.complete_step(&id, "done", vec!["index.html".to_string()])
                .expect("complete");
        }

        assert_eq!(orch.ctx().state, AgentState::Completed);
        assert_eq!(orch.current_step_index(), Some(2));
        assert!(orch.current_step().is_none());
        let task = orch.current_task().expect("task");
        assert_eq!(task.completed_count(), 2);
        assert!(task.completed_at.is_some());
        assert_eq!(task.steps[1].files_modified, vec!["index.html".to_string()]);
        assert!(orch.check_invariants().is_empty());
    }

    #[test]
    fn complete_step_outside_completing_state_changes_nothing() {
        let mut orch = started_with_steps(2);
        let id = orch.current_step().expect("step").id.clone();

        let err = orch.complete_step(&id, "early", Vec::new()).expect_err("not ready");
        assert_eq!(
            err,
            OrchestratorError::InvalidState {
                action: "complete a step",
                state: AgentState::ExecutingStep,
            }
        );
        assert_eq!(orch.ctx().state, AgentState::ExecutingStep);
        let step = orch.current_step().expect("step");
        assert_eq!(step.status, StepStatus::Running);
        assert!(step.result.is_none());
    }

    #[test]
    fn complete_step_only_accepts_the_cursor_step() {
        let mut orch = started_with_steps(2);
        run_to_completing(&mut orch);

        let err = orch
            .complete_step("task-1-step-1", "wrong", Vec::new())
            .expect_err("not current");
        assert!(matches!(err, OrchestratorError::NotCurrentStep { .. }));
        assert_eq!(orch.ctx().state, AgentState::CompletingStep);
        assert_eq!(orch.current_step_index(), Some(0));
        let task = orch.current_task().expect("task");
        assert_eq!(task.steps[0].status, StepStatus::Running);
        assert_eq!(task.steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn record_step_error_keeps_status() {
        let mut orch = started_with_steps(1);
        let id = orch.current_step().expect("step").id.clone();

        orch.record_step_error(&id, "Empty file: app.js").expect("record");
        let step = orch.current_step().expect("step");
        assert_eq!(step.status, StepStatus::Running);
        assert_eq!(step.error.as_deref(), Some("Empty file: app.js"));
        assert_eq!(
            orch.record_step_error("task-1-step-9", "x"),
            Err(OrchestratorError::UnknownStep("task-1-step-9".to_string()))
        );
    }

    #[test]
    fn fail_step_records_error_without_dispatching() {
        let mut orch = started_with_steps(2);
        let id = orch.current_step().expect("step").id.clone();

        orch.fail_step(&id, "generator crashed").expect("fail");
        let step = orch.current_task().expect("task").step(&id).expect("step");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("generator crashed"));
        assert_eq!(orch.ctx().state, AgentState::ExecutingStep);
    }

    #[test]
    fn heal_attempts_increment_retry_count_and_fail_open_records_error() {
        let mut orch = started_with_steps(1);
        orch.dispatch(Event::StepStreamComplete);
        let fail = Event::ValidationFail {
            errors: vec!["Empty file: app.js".to_string()],
        };
        for _ in 0..3 {
            orch.dispatch(fail.clone());
            orch.dispatch(Event::HealComplete);
        }
        orch.dispatch(fail);

        assert_eq!(orch.ctx().state, AgentState::CompletingStep);
        let step = orch.current_step().expect("step");
        assert_eq!(step.retry_count, 3);
        assert_eq!(step.error.as_deref(), Some("Empty file: app.js"));
    }

    #[test]
    fn approve_requires_matching_pending_step() {
        let mut orch = started_with_steps(2);
        let id = orch.current_step().expect("step").id.clone();

        let err = orch.approve_step(&id).expect_err("nothing pending");
        assert_eq!(
            err,
            OrchestratorError::NoPendingApproval(AgentState::ExecutingStep)
        );

        orch.dispatch(Event::StepStreamComplete);
        orch.dispatch(Event::ApprovalRequired);
        assert_eq!(
            orch.current_step().expect("step").status,
            StepStatus::AwaitingApproval
        );

        let err = orch.approve_step("task-1-step-1").expect_err("wrong step");
        assert!(matches!(err, OrchestratorError::ApprovalStepMismatch { .. }));
        assert_eq!(orch.ctx().state, AgentState::AwaitingApproval);

        orch.approve_step(&id).expect("approve");
        assert_eq!(orch.ctx().state, AgentState::CompletingStep);
        assert_eq!(orch.current_step().expect("step").status, StepStatus::Running);
    }

    #[test]
    fn reject_rolls_back_only_the_pending_step() {
        let mut orch = started_with_steps(2);
        let first = orch.current_step().expect("step").id.clone();
        run_to_completing(&mut orch);
        orch.complete_step(&first, "ok", Vec::new()).expect("complete");

        let second = orch.current_step().expect("step").id.clone();
        orch.dispatch(Event::StepStreamComplete);
        orch.dispatch(Event::ApprovalRequired);
        orch.reject_step(&second).expect("reject");
        assert_eq!(orch.ctx().state, AgentState::RollingBack);

        orch.complete_rollback().expect("complete rollback");
        assert_eq!(orch.ctx().state, AgentState::Failed);
        assert_eq!(orch.ctx().last_error.as_deref(), Some(ROLLED_BACK_BY_USER));
        let task = orch.current_task().expect("task");
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        assert_eq!(task.steps[1].status, StepStatus::RolledBack);
    }

    #[test]
    fn rollback_all_returns_anchor_and_rolls_back_finished_steps() {
        let mut orch = started_with_steps(2);
        orch.set_pre_execution_commit("abc123").expect("anchor");
        let first = orch.current_step().expect("step").id.clone();
        run_to_completing(&mut orch);
        orch.complete_step(&first, "ok", Vec::new()).expect("complete");

        let anchor = orch.rollback_all().expect("rollback");
        assert_eq!(anchor.as_deref(), Some("abc123"));
        orch.complete_rollback().expect("complete rollback");

        let task = orch.current_task().expect("task");
        assert_eq!(task.steps[0].status, StepStatus::RolledBack);
        assert_eq!(task.steps[1].status, StepStatus::RolledBack);
        assert_eq!(orch.ctx().state, AgentState::Failed);
    }

    #[test]
    fn rollback_all_without_task_errors() {
        let mut orch = Orchestrator::default();
        assert_eq!(orch.rollback_all(), Err(OrchestratorError::NoActiveTask));
    }

    #[test]
    fn cancel_archives_task_and_clears_current() {
        let mut orch = started_with_steps(3);
        let archived = orch.cancel_task().expect("archived id");

        assert_eq!(archived, "task-1");
        assert_eq!(orch.ctx().state, AgentState::Cancelled);
        assert!(orch.current_task().is_none());
        let latest = orch.history().latest().expect("history");
        assert_eq!(latest.id, "task-1");
        assert!(latest.completed_at.is_some());
    }

    #[test]
    fn new_task_supersedes_and_archives_previous() {
        let mut orch = started_with_steps(1);
        let second = orch.start_task("another idea");

        assert_eq!(second, "task-2");
        assert_eq!(orch.history().len(), 1);
        assert_eq!(orch.ctx().state, AgentState::Decomposing);
    }

    #[test]
    fn history_is_bounded() {
        let mut orch = Orchestrator::new(OrchestratorConfig {
            history_limit: 2,
            ..OrchestratorConfig::default()
        });
        for i in 0..4 {
            orch.start_task(&format!("prompt {i}"));
            orch.cancel_task();
        }
        let ids: Vec<&str> = orch.history().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-3", "task-4"]);
    }

    #[test]
    fn ignored_events_are_reported() {
        let mut orch = Orchestrator::default();
        assert!(!orch.resume_task());
        assert!(!orch.last_dispatch_applied());
        assert_eq!(orch.ctx().state, AgentState::Idle);

        orch.start_task("p");
        assert!(orch.last_dispatch_applied());
    }

    #[test]
    fn pause_and_resume_route_through_approval() {
        let mut orch = started_with_steps(1);
        assert!(orch.pause_task());
        assert_eq!(orch.ctx().state, AgentState::AwaitingApproval);
        assert!(orch.resume_task());
        assert_eq!(orch.ctx().state, AgentState::CompletingStep);
    }

    #[test]
    fn error_event_fails_running_step() {
        let mut orch = started_with_steps(2);
        orch.dispatch(Event::Error {
            error: "generator unreachable".to_string(),
        });
        let step = orch.current_step().expect("step");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("generator unreachable"));
    }

    #[test]
    fn approval_mode_is_fixed_while_running() {
        let mut orch = started_with_steps(1);
        assert!(orch.set_approval_mode(ApprovalMode::Step).is_err());
        orch.cancel_task();
        orch.set_approval_mode(ApprovalMode::Step).expect("idle change");
        assert_eq!(orch.approval_mode(), ApprovalMode::Step);
    }

    #[test]
    fn reset_returns_to_idle_and_archives() {
        let mut orch = started_with_steps(1);
        orch.reset();
        assert_eq!(orch.ctx().state, AgentState::Idle);
        assert!(orch.current_task().is_none());
        assert_eq!(orch.history().len(), 1);
    }
}

//! Drives one task end-to-end through the collaborators.
//!
//! The driver is the only place that talks to the outside world during a
//! task: it builds prompts, calls the generator, asks the workspace what
//! changed, probes and validates the result, and reports every outcome to the
//! orchestrator as an event. It stops as soon as the orchestrator leaves the
//! step-level states, so a `CANCEL` or `ERROR` halts further AI calls.

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::decomposition::parse_decomposition_response;
use crate::core::state_machine::Event;
use crate::core::task::TaskStep;
use crate::core::types::{AgentState, ApprovalMode, console_errors};
use crate::core::validator::validate_step_output;
use crate::io::approval::{Approver, Decision};
use crate::io::config::AutopilotConfig;
use crate::io::generator::Generator;
use crate::io::prompt::PromptBuilder;
use crate::io::review::{Reviewer, review_findings};
use crate::io::runtime::RuntimeProbe;
use crate::io::workspace::{SnapshotStore, Workspace};
use crate::orchestrator::Orchestrator;

pub const ITERATION_BUDGET_EXHAUSTED: &str = "iteration budget exhausted";

/// Longest step result kept for later prompts.
const RESULT_SUMMARY_CHARS: usize = 400;

/// Everything outside the core a task run depends on.
pub struct Collaborators<'a> {
    pub generator: &'a dyn Generator,
    pub workspace: &'a dyn Workspace,
    pub snapshots: &'a dyn SnapshotStore,
    pub probe: &'a dyn RuntimeProbe,
    pub approver: &'a dyn Approver,
    pub reviewer: Option<&'a dyn Reviewer>,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub prompts: PromptBuilder,
    pub min_review_score: u8,
    /// Put a step in front of a human once its heal attempts run out,
    /// instead of accepting it with errors.
    pub escalate_on_heal_exhausted: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        AutopilotConfig::default().driver_config()
    }
}

/// Where a task ended up after [`drive`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveOutcome {
    pub task_id: String,
    pub state: AgentState,
    pub last_error: Option<String>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub tokens_used: u64,
}

/// Run a new task for `prompt` until it completes, fails, or is cancelled.
///
/// Collaborator failures that the state machine models (a failed AI call, an
/// unparseable plan) end the task in `failed`. Failures it does not model
/// (git, config, the approval prompt) are returned as errors.
#[instrument(skip_all, fields(approval_mode = orch.approval_mode().as_str()))]
pub fn drive(
    orch: &mut Orchestrator,
    collaborators: &Collaborators<'_>,
    config: &DriverConfig,
    prompt: &str,
) -> Result<DriveOutcome> {
    let task_id = orch.start_task(prompt);
    let mut driver = Driver {
        orch,
        collab: collaborators,
        config,
        last_text: String::new(),
        pending_errors: Vec::new(),
    };

    driver.decompose(prompt)?;
    if driver.orch.ctx().state == AgentState::ExecutingStep {
        driver.gate_plan()?;
    }
    if driver.orch.ctx().state == AgentState::ExecutingStep {
        let anchor = driver
            .collab
            .snapshots
            .capture(&format!("autopilot: before {task_id}"))
            .context("capture rollback anchor")?;
        driver.orch.set_pre_execution_commit(&anchor)?;
    }
    driver.run_steps()?;

    let outcome = task_outcome(driver.orch, &task_id);
    info!(
        task_id = %outcome.task_id,
        state = %outcome.state,
        steps_completed = outcome.steps_completed,
        total_steps = outcome.total_steps,
        "task finished"
    );
    Ok(outcome)
}

/// Undo the whole current task: restore the rollback anchor and mark its
/// steps rolled back.
pub fn rollback_task(orch: &mut Orchestrator, snapshots: &dyn SnapshotStore) -> Result<()> {
    let anchor = orch.rollback_all()?;
    match anchor {
        Some(snapshot) => snapshots
            .restore(&snapshot)
            .context("restore rollback anchor")?,
        None => warn!("no rollback anchor captured, nothing to restore"),
    }
    orch.complete_rollback()?;
    Ok(())
}

struct Driver<'o, 'c> {
    orch: &'o mut Orchestrator,
    collab: &'c Collaborators<'c>,
    config: &'c DriverConfig,
    /// Latest generator response for the current step.
    last_text: String,
    /// Findings from the latest failed validation of the current step.
    pending_errors: Vec<String>,
}

impl Driver<'_, '_> {
    fn decompose(&mut self, prompt: &str) -> Result<()> {
        let files = self.collab.workspace.files().context("read workspace files")?;
        let pack = self.config.prompts.build_decomposition(prompt, &files)?;
        let text = match self.generate(pack.as_str()) {
            Ok(text) => text,
            Err(message) => {
                self.orch.dispatch(Event::Error { error: message });
                return Ok(());
            }
        };
        match parse_decomposition_response(&text) {
            Ok(specs) => self.orch.set_steps(specs)?,
            Err(err) => {
                warn!(err = %err, "decomposition failed");
                self.orch.fail_decomposition(&err.to_string());
            }
        }
        Ok(())
    }

    fn gate_plan(&mut self) -> Result<()> {
        if self.orch.approval_mode() != ApprovalMode::PlanOnly {
            return Ok(());
        }
        let task = self.orch.current_task().context("no active task")?;
        if self.collab.approver.approve_plan(task)? == Decision::Reject {
            info!(task_id = %task.id, "plan rejected");
            self.orch.cancel_task();
        }
        Ok(())
    }

    fn run_steps(&mut self) -> Result<()> {
        loop {
            let state = self.orch.ctx().state;
            match state {
                AgentState::ExecutingStep => self.execute_step()?,
                AgentState::Validating => self.validate_step()?,
                AgentState::SelfHealing => self.heal_step()?,
                AgentState::AwaitingApproval => self.await_approval()?,
                AgentState::CompletingStep => self.complete_step()?,
                _ => return Ok(()),
            }
            if !self.orch.last_dispatch_applied() {
                bail!("driver stalled: last event was ignored in state {state}");
            }
        }
    }

    fn execute_step(&mut self) -> Result<()> {
        if self.stop_if_budget_exhausted() {
            return Ok(());
        }

        let step = self.current_step()?;
        let snapshot = self
            .collab
            .snapshots
            .capture(&format!("autopilot: before {} ({})", step.id, step.title))
            .with_context(|| format!("capture snapshot for {}", step.id))?;
        self.orch.set_step_snapshot(&step.id, &snapshot)?;
        self.pending_errors.clear();

        let files = self.collab.workspace.files().context("read workspace files")?;
        let task = self.orch.current_task().context("no active task")?;
        let previous = task.previous_results(step.index);
        let pack = self
            .config
            .prompts
            .build_step(&step, task.steps.len(), &previous, &files)?;

        info!(step = %step.id, title = %step.title, "executing step");
        match self.generate(pack.as_str()) {
            Ok(text) => {
                self.last_text = text;
                self.orch.dispatch(Event::StepStreamComplete);
            }
            Err(message) => {
                self.orch.dispatch(Event::Error { error: message });
            }
        }
        Ok(())
    }

    fn validate_step(&mut self) -> Result<()> {
        let step = self.current_step()?;
        let snapshot = step
            .git_snapshot_id
            .as_deref()
            .with_context(|| format!("step {} has no snapshot", step.id))?;
        let generated = self
            .collab
            .workspace
            .changed_since(snapshot)
            .context("collect generated files")?;
        let events = self
            .collab
            .probe
            .probe(&generated)
            .context("probe generated code")?;

        let mut errors = validate_step_output(&generated, &console_errors(&events));
        if let Some(reviewer) = self.collab.reviewer {
            let report = reviewer.review(&generated).context("review generated files")?;
            debug!(score = report.score, issues = report.issues.len(), "review finished");
            errors.extend(review_findings(&report, self.config.min_review_score));
        }
        debug!(step = %step.id, files = generated.len(), errors = errors.len(), "validated step");

        if errors.is_empty() {
            self.pending_errors.clear();
            let event = if self.orch.approval_mode() == ApprovalMode::Step {
                Event::ApprovalRequired
            } else {
                Event::ValidationPass
            };
            self.orch.dispatch(event);
            return Ok(());
        }

        self.pending_errors = errors.clone();
        let needs_human = self.config.escalate_on_heal_exhausted
            || self.orch.approval_mode() == ApprovalMode::Step;
        if needs_human && !self.orch.ctx().heal_attempts_remaining() {
            info!(step = %step.id, "heal attempts exhausted, asking for approval");
            self.orch.record_step_error(&step.id, &errors.join("\n"))?;
            self.orch.dispatch(Event::ApprovalRequired);
        } else {
            self.orch.dispatch(Event::ValidationFail { errors });
        }
        Ok(())
    }

    fn heal_step(&mut self) -> Result<()> {
        if self.stop_if_budget_exhausted() {
            return Ok(());
        }
        let files = self.collab.workspace.files().context("read workspace files")?;
        let pack = self
            .config
            .prompts
            .build_self_heal(&self.pending_errors, &files)?;
        info!(
            attempt = self.orch.ctx().heal_attempts,
            errors = self.pending_errors.len(),
            "self-healing step"
        );
        match self.generate(pack.as_str()) {
            Ok(text) => {
                self.last_text = text;
                self.orch.dispatch(Event::HealComplete);
            }
            Err(message) => {
                self.orch.dispatch(Event::HealFailed { error: message });
            }
        }
        Ok(())
    }

    fn await_approval(&mut self) -> Result<()> {
        let step = self.current_step()?;
        match self
            .collab
            .approver
            .approve_step(&step, &self.pending_errors)?
        {
            Decision::Approve => self.orch.approve_step(&step.id)?,
            Decision::Reject => {
                self.orch.reject_step(&step.id)?;
                if let Some(snapshot) = &step.git_snapshot_id {
                    self.collab
                        .snapshots
                        .restore(snapshot)
                        .with_context(|| format!("restore snapshot for {}", step.id))?;
                }
                self.orch.complete_rollback()?;
            }
        }
        Ok(())
    }

    fn complete_step(&mut self) -> Result<()> {
        let step = self.current_step()?;
        let files_modified: Vec<String> = match &step.git_snapshot_id {
            Some(snapshot) => self
                .collab
                .workspace
                .changed_since(snapshot)
                .context("collect modified files")?
                .into_keys()
                .collect(),
            None => Vec::new(),
        };
        let result = summarize(&self.last_text);
        self.orch.complete_step(&step.id, &result, files_modified)?;
        self.pending_errors.clear();
        Ok(())
    }

    /// Fail the task instead of making another AI call once the iteration
    /// budget is spent. Returns whether the task was stopped.
    fn stop_if_budget_exhausted(&mut self) -> bool {
        let ctx = self.orch.ctx();
        if !ctx.iteration_budget_exhausted() {
            return false;
        }
        warn!(
            iteration_count = ctx.iteration_count,
            max_iterations = ctx.max_iterations,
            "iteration budget exhausted"
        );
        self.orch.dispatch(Event::Error {
            error: ITERATION_BUDGET_EXHAUSTED.to_string(),
        });
        true
    }

    /// Call the generator, recording token usage. A failed call is reported
    /// as a message for the state machine rather than an error.
    fn generate(&mut self, prompt: &str) -> std::result::Result<String, String> {
        match self.collab.generator.generate(prompt) {
            Ok(generation) => {
                if let Some(tokens) = generation.tokens_used {
                    self.orch.add_tokens(tokens);
                }
                Ok(generation.text)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "generation failed");
                Err(format!("generation failed: {err:#}"))
            }
        }
    }

    fn current_step(&self) -> Result<TaskStep> {
        self.orch
            .current_step()
            .cloned()
            .context("no step under the cursor")
    }
}

fn summarize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no output)".to_string();
    }
    let mut summary: String = trimmed.chars().take(RESULT_SUMMARY_CHARS).collect();
    if trimmed.chars().count() > RESULT_SUMMARY_CHARS {
        summary.push_str("...");
    }
    summary
}

fn task_outcome(orch: &Orchestrator, task_id: &str) -> DriveOutcome {
    let task = orch
        .current_task()
        .filter(|task| task.id == task_id)
        .or_else(|| orch.history().iter().rev().find(|task| task.id == task_id));
    DriveOutcome {
        task_id: task_id.to_string(),
        state: orch.ctx().state,
        last_error: orch.ctx().last_error.clone(),
        steps_completed: task.map_or(0, |task| task.completed_count()),
        total_steps: task.map_or(0, |task| task.steps.len()),
        tokens_used: task.map_or(0, |task| task.total_tokens_used),
    }
}

//! Pure reducer over the control context.
//!
//! `transition` is total: an event that is not valid for the current state
//! returns the context unchanged. `try_transition` reports whether the event
//! was applied so callers can surface misuse instead of swallowing it.

use crate::core::context::ControlContext;
use crate::core::types::AgentState;

/// Message recorded when a human rejects a step and the rollback lands.
pub const ROLLED_BACK_BY_USER: &str = "Step rolled back by user";

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartTask,
    DecompositionComplete { step_count: usize },
    DecompositionFailed { error: String },
    StepStreamComplete,
    ValidationPass,
    ValidationFail { errors: Vec<String> },
    HealComplete,
    HealFailed { error: String },
    ApprovalRequired,
    Approve,
    Reject,
    Pause,
    Resume,
    StepComplete,
    AllStepsDone,
    Rollback,
    RollbackComplete,
    Cancel,
    Reset,
    Error { error: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartTask => "START_TASK",
            Event::DecompositionComplete { .. } => "DECOMPOSITION_COMPLETE",
            Event::DecompositionFailed { .. } => "DECOMPOSITION_FAILED",
            Event::StepStreamComplete => "STEP_STREAM_COMPLETE",
            Event::ValidationPass => "VALIDATION_PASS",
            Event::ValidationFail { .. } => "VALIDATION_FAIL",
            Event::HealComplete => "HEAL_COMPLETE",
            Event::HealFailed { .. } => "HEAL_FAILED",
            Event::ApprovalRequired => "APPROVAL_REQUIRED",
            Event::Approve => "APPROVE",
            Event::Reject => "REJECT",
            Event::Pause => "PAUSE",
            Event::Resume => "RESUME",
            Event::StepComplete => "STEP_COMPLETE",
            Event::AllStepsDone => "ALL_STEPS_DONE",
            Event::Rollback => "ROLLBACK",
            Event::RollbackComplete => "ROLLBACK_COMPLETE",
            Event::Cancel => "CANCEL",
            Event::Reset => "RESET",
            Event::Error { .. } => "ERROR",
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub context: ControlContext,
    /// False when the event was not valid for the input state.
    pub applied: bool,
}

/// Apply `event` to `ctx`, returning the next context.
pub fn transition(ctx: &ControlContext, event: &Event) -> ControlContext {
    try_transition(ctx, event).context
}

/// Apply `event` to `ctx` and report whether anything was applied.
pub fn try_transition(ctx: &ControlContext, event: &Event) -> Transition {
    match next_context(ctx, event) {
        Some(context) => Transition {
            context,
            applied: true,
        },
        None => Transition {
            context: ctx.clone(),
            applied: false,
        },
    }
}

fn next_context(ctx: &ControlContext, event: &Event) -> Option<ControlContext> {
    // Global events behave identically from every state.
    match event {
        Event::Reset => return Some(ctx.reinitialized()),
        Event::Cancel => {
            return Some(ControlContext {
                state: AgentState::Cancelled,
                last_error: None,
                ..ctx.clone()
            });
        }
        Event::Error { error } => {
            return Some(ControlContext {
                state: AgentState::Failed,
                last_error: Some(error.clone()),
                ..ctx.clone()
            });
        }
        Event::StartTask if ctx.state.is_restartable() => {
            return Some(ControlContext {
                state: AgentState::Decomposing,
                ..ctx.reinitialized()
            });
        }
        Event::Rollback
            if !matches!(ctx.state, AgentState::Idle | AgentState::RollingBack) =>
        {
            return Some(ControlContext {
                state: AgentState::RollingBack,
                last_error: None,
                ..ctx.clone()
            });
        }
        _ => {}
    }

    match (ctx.state, event) {
        (AgentState::Decomposing, Event::DecompositionComplete { step_count }) => {
            Some(ControlContext {
                state: AgentState::ExecutingStep,
                total_steps: *step_count,
                current_step_index: Some(0),
                iteration_count: ctx.iteration_count + 1,
                ..ctx.clone()
            })
        }
        (AgentState::Decomposing, Event::DecompositionFailed { error }) => Some(ControlContext {
            state: AgentState::Failed,
            last_error: Some(error.clone()),
            ..ctx.clone()
        }),

        (AgentState::ExecutingStep, Event::StepStreamComplete) => Some(ControlContext {
            state: AgentState::Validating,
            ..ctx.clone()
        }),
        (AgentState::ExecutingStep, Event::Pause) => Some(ControlContext {
            state: AgentState::AwaitingApproval,
            ..ctx.clone()
        }),

        (AgentState::Validating, Event::ValidationPass) => Some(ControlContext {
            state: AgentState::CompletingStep,
            heal_attempts: 0,
            ..ctx.clone()
        }),
        (AgentState::Validating, Event::ValidationFail { errors }) => {
            let joined = errors.join("\n");
            if ctx.heal_attempts_remaining() {
                Some(ControlContext {
                    state: AgentState::SelfHealing,
                    last_error: Some(joined),
                    heal_attempts: ctx.heal_attempts + 1,
                    ..ctx.clone()
                })
            } else {
                // Bound exhausted: accept the step, keep the last errors visible.
                Some(ControlContext {
                    state: AgentState::CompletingStep,
                    last_error: Some(joined),
                    heal_attempts: 0,
                    ..ctx.clone()
                })
            }
        }
        (AgentState::Validating, Event::ApprovalRequired) => Some(ControlContext {
            state: AgentState::AwaitingApproval,
            ..ctx.clone()
        }),

        (AgentState::SelfHealing, Event::HealComplete) => Some(ControlContext {
            state: AgentState::Validating,
            iteration_count: ctx.iteration_count + 1,
            ..ctx.clone()
        }),
        (AgentState::SelfHealing, Event::HealFailed { error }) => {
            if ctx.heal_attempts_remaining() {
                Some(ControlContext {
                    last_error: Some(error.clone()),
                    heal_attempts: ctx.heal_attempts + 1,
                    ..ctx.clone()
                })
            } else {
                Some(ControlContext {
                    state: AgentState::CompletingStep,
                    last_error: Some(error.clone()),
                    heal_attempts: 0,
                    ..ctx.clone()
                })
            }
        }

        (AgentState::AwaitingApproval, Event::Approve | Event::Resume) => Some(ControlContext {
            state: AgentState::CompletingStep,
            ..ctx.clone()
        }),
        (AgentState::AwaitingApproval, Event::Reject) => Some(ControlContext {
            state: AgentState::RollingBack,
            ..ctx.clone()
        }),

        (AgentState::CompletingStep, Event::StepComplete) => {
            let current = ctx.current_step_index.unwrap_or(0);
            if current + 1 >= ctx.total_steps {
                Some(ControlContext {
                    state: AgentState::Completed,
                    current_step_index: Some(ctx.total_steps),
                    ..ctx.clone()
                })
            } else {
                Some(ControlContext {
                    state: AgentState::ExecutingStep,
                    current_step_index: Some(current + 1),
                    iteration_count: ctx.iteration_count + 1,
                    heal_attempts: 0,
                    ..ctx.clone()
                })
            }
        }
        (AgentState::CompletingStep, Event::AllStepsDone) => Some(ControlContext {
            state: AgentState::Completed,
            current_step_index: Some(ctx.total_steps),
            ..ctx.clone()
        }),

        (AgentState::RollingBack, Event::RollbackComplete) => Some(ControlContext {
            state: AgentState::Failed,
            last_error: Some(ROLLED_BACK_BY_USER.to_string()),
            ..ctx.clone()
        }),

        _ => None,
    }
}

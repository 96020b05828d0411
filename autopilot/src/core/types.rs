//! Shared deterministic types for the orchestrator core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// File name to file body, ordered by name so prompts and logs stay stable.
pub type FileMap = BTreeMap<String, String>;

/// Control state of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Decomposing,
    ExecutingStep,
    Validating,
    SelfHealing,
    AwaitingApproval,
    CompletingStep,
    RollingBack,
    Completed,
    Failed,
    Cancelled,
}

impl AgentState {
    pub const ALL: [AgentState; 11] = [
        AgentState::Idle,
        AgentState::Decomposing,
        AgentState::ExecutingStep,
        AgentState::Validating,
        AgentState::SelfHealing,
        AgentState::AwaitingApproval,
        AgentState::CompletingStep,
        AgentState::RollingBack,
        AgentState::Completed,
        AgentState::Failed,
        AgentState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Decomposing => "decomposing",
            AgentState::ExecutingStep => "executing_step",
            AgentState::Validating => "validating",
            AgentState::SelfHealing => "self_healing",
            AgentState::AwaitingApproval => "awaiting_approval",
            AgentState::CompletingStep => "completing_step",
            AgentState::RollingBack => "rolling_back",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
            AgentState::Cancelled => "cancelled",
        }
    }

    /// States from which a fresh `START_TASK` reinitializes the context.
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            AgentState::Idle | AgentState::Completed | AgentState::Failed | AgentState::Cancelled
        )
    }

    /// User-visible end states of a task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Completed | AgentState::Failed | AgentState::Cancelled
        )
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a single task step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Skipped,
    RolledBack,
}

/// When a human must confirm work before it is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Never gate; steps are committed as soon as they validate.
    #[default]
    Auto,
    /// Every validated step waits for approval.
    Step,
    /// The decomposed plan is approved once, then steps run unattended.
    PlanOnly,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Auto => "auto",
            ApprovalMode::Step => "step",
            ApprovalMode::PlanOnly => "plan_only",
        }
    }
}

/// Severity reported by the sandboxed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

/// One console message emitted while running generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub level: ConsoleLevel,
    pub message: String,
}

impl ConsoleEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ConsoleLevel::Error,
            message: message.into(),
        }
    }
}

/// Keep only error-level console messages, in emission order.
pub fn console_errors(events: &[ConsoleEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|event| event.level == ConsoleLevel::Error)
        .map(|event| event.message.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restartable_states_are_idle_and_terminal() {
        let restartable: Vec<AgentState> = AgentState::ALL
            .into_iter()
            .filter(AgentState::is_restartable)
            .collect();
        assert_eq!(
            restartable,
            vec![
                AgentState::Idle,
                AgentState::Completed,
                AgentState::Failed,
                AgentState::Cancelled
            ]
        );
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&AgentState::AwaitingApproval).expect("serialize");
        assert_eq!(json, "\"awaiting_approval\"");
        assert_eq!(AgentState::SelfHealing.to_string(), "self_healing");
    }

    #[test]
    fn console_errors_drop_non_error_levels() {
        let events = vec![
            ConsoleEvent {
                level: ConsoleLevel::Log,
                message: "ready".to_string(),
            },
            ConsoleEvent::error("ReferenceError: x is not defined"),
            ConsoleEvent {
                level: ConsoleLevel::Warn,
                message: "deprecated".to_string(),
            },
        ];
        assert_eq!(
            console_errors(&events),
            vec!["ReferenceError: x is not defined".to_string()]
        );
    }
}

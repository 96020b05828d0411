//! Control context: the working memory of the state machine.

use serde::{Deserialize, Serialize};

use crate::core::types::AgentState;

pub const DEFAULT_MAX_HEAL_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Control state for one task in flight.
///
/// `current_step_index` is `None` until decomposition completes. Once steps
/// exist it satisfies `0 <= index <= total_steps`, reaching `total_steps` only
/// when the task has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlContext {
    pub state: AgentState,
    pub current_step_index: Option<usize>,
    pub total_steps: usize,
    /// AI round-trips spent on the task so far.
    pub iteration_count: u32,
    /// Soft cap on `iteration_count`, enforced by the driver, not the reducer.
    pub max_iterations: u32,
    pub last_error: Option<String>,
    pub heal_attempts: u32,
    pub max_heal_attempts: u32,
}

impl ControlContext {
    /// Fresh idle context with explicit limits.
    pub fn with_limits(max_iterations: u32, max_heal_attempts: u32) -> Self {
        Self {
            state: AgentState::Idle,
            current_step_index: None,
            total_steps: 0,
            iteration_count: 0,
            max_iterations,
            last_error: None,
            heal_attempts: 0,
            max_heal_attempts,
        }
    }

    /// Fresh idle context that keeps this context's limits.
    pub fn reinitialized(&self) -> Self {
        Self::with_limits(self.max_iterations, self.max_heal_attempts)
    }

    pub fn heal_attempts_remaining(&self) -> bool {
        self.heal_attempts < self.max_heal_attempts
    }

    pub fn iteration_budget_exhausted(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }
}

impl Default for ControlContext {
    fn default() -> Self {
        create_initial_context()
    }
}

/// Idle context with the default limits.
pub fn create_initial_context() -> ControlContext {
    ControlContext::with_limits(DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_HEAL_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_context_is_idle_without_cursor() {
        let ctx = create_initial_context();
        assert_eq!(ctx.state, AgentState::Idle);
        assert_eq!(ctx.current_step_index, None);
        assert_eq!(ctx.max_heal_attempts, 3);
        assert!(ctx.last_error.is_none());
    }

    #[test]
    fn reinitialized_keeps_limits_only() {
        let mut ctx = ControlContext::with_limits(7, 5);
        ctx.state = AgentState::Failed;
        ctx.iteration_count = 4;
        ctx.last_error = Some("boom".to_string());

        let fresh = ctx.reinitialized();
        assert_eq!(fresh, ControlContext::with_limits(7, 5));
    }
}

//! Semantic invariants over the control context and the task it drives.

use std::collections::HashSet;

use crate::core::context::ControlContext;
use crate::core::task::AutonomousTask;
use crate::core::types::AgentState;

/// Check context invariants:
/// - `current_step_index <= total_steps`
/// - `heal_attempts <= max_heal_attempts`
/// - step-level states point at an existing step
/// - `completed` leaves the cursor at `total_steps`
pub fn validate_context(ctx: &ControlContext) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(index) = ctx.current_step_index
        && index > ctx.total_steps
    {
        errors.push(format!(
            "current_step_index {} exceeds total_steps {}",
            index, ctx.total_steps
        ));
    }

    if ctx.heal_attempts > ctx.max_heal_attempts {
        errors.push(format!(
            "heal_attempts {} exceeds max_heal_attempts {}",
            ctx.heal_attempts, ctx.max_heal_attempts
        ));
    }

    let step_level = matches!(
        ctx.state,
        AgentState::ExecutingStep
            | AgentState::Validating
            | AgentState::SelfHealing
            | AgentState::CompletingStep
    );
    if step_level {
        match ctx.current_step_index {
            Some(index) if index < ctx.total_steps => {}
            other => errors.push(format!(
                "{}: cursor {:?} does not point at one of {} steps",
                ctx.state, other, ctx.total_steps
            )),
        }
    }

    if ctx.state == AgentState::Completed && ctx.current_step_index != Some(ctx.total_steps) {
        errors.push(format!(
            "completed: cursor {:?} should equal total_steps {}",
            ctx.current_step_index, ctx.total_steps
        ));
    }

    errors
}

/// Check that a task agrees with the context driving it:
/// - no duplicate step ids
/// - step indexes are `0..n` in order
/// - once materialized, the step count matches `total_steps`
pub fn validate_task(task: &AutonomousTask, ctx: &ControlContext) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (position, step) in task.steps.iter().enumerate() {
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id '{}'", step.id));
        }
        if step.index != position {
            errors.push(format!(
                "step '{}' has index {} at position {}",
                step.id, step.index, position
            ));
        }
    }

    if !task.steps.is_empty() && task.steps.len() != ctx.total_steps {
        errors.push(format!(
            "task has {} steps but context expects {}",
            task.steps.len(),
            ctx.total_steps
        ));
    }

    errors
}

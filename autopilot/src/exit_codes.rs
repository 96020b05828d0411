//! Stable exit codes for autopilot CLI commands.

/// Command succeeded or the task completed.
pub const OK: i32 = 0;
/// Command failed due to invalid input/config/repository or other errors.
pub const INVALID: i32 = 1;
/// The task ended in `failed` (decomposition failure, error, or rollback).
pub const TASK_FAILED: i32 = 3;
/// The task was cancelled, e.g. by rejecting its plan.
pub const TASK_CANCELLED: i32 = 4;
/// `autopilot check` found validation errors.
pub const FINDINGS: i32 = 5;

//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod decomposition;
pub mod history;
pub mod invariants;
pub mod state_machine;
pub mod task;
pub mod types;
pub mod validator;

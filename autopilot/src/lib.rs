//! Autonomous multi-step code generation orchestrator.
//!
//! A free-form request is decomposed by an AI backend into an ordered plan of
//! steps; each step is generated, validated, optionally self-healed, optionally
//! approved by a human, and committed before the next one starts. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, task model,
//!   decomposition parsing, output validation). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting adapters (config, prompts, child processes,
//!   git snapshots, AI generation, runtime probing, human approval), each
//!   behind a trait so tests can script it.
//!
//! [`orchestrator`] owns the task in flight and pairs every mutation with a
//! state-machine dispatch; [`driver`] runs one task end-to-end against the
//! collaborators.

pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

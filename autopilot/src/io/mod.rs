//! Side-effecting adapters used by the driver and CLI.

pub mod approval;
pub mod config;
pub mod generator;
pub mod git;
pub mod process;
pub mod prompt;
pub mod review;
pub mod runtime;
pub mod workspace;

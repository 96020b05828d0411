//! Human approval collaborator.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::core::task::{AutonomousTask, TaskStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

pub trait Approver {
    /// Confirm a decomposed plan before any step runs.
    fn approve_plan(&self, task: &AutonomousTask) -> Result<Decision>;

    /// Confirm a step's work. `errors` holds findings still unresolved, if any.
    fn approve_step(&self, step: &TaskStep, errors: &[String]) -> Result<Decision>;
}

/// Parse a yes/no answer. Anything unrecognized is `None`.
pub fn parse_decision(input: &str) -> Option<Decision> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "a" | "approve" => Some(Decision::Approve),
        "n" | "no" | "r" | "reject" => Some(Decision::Reject),
        _ => None,
    }
}

/// Asks on stderr and reads answers from stdin. End of input rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinApprover;

impl StdinApprover {
    fn ask(&self, summary: &str) -> Result<Decision> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut stderr = io::stderr();
        loop {
            write!(stderr, "{summary}\napprove? [y/n] ").context("write approval prompt")?;
            stderr.flush().context("flush approval prompt")?;
            let mut line = String::new();
            if input.read_line(&mut line).context("read approval answer")? == 0 {
                return Ok(Decision::Reject);
            }
            if let Some(decision) = parse_decision(&line) {
                return Ok(decision);
            }
        }
    }
}

impl Approver for StdinApprover {
    fn approve_plan(&self, task: &AutonomousTask) -> Result<Decision> {
        let mut summary = format!("plan for {} ({} steps):", task.id, task.steps.len());
        for step in &task.steps {
            summary.push_str(&format!("\n  {}. {}", step.index + 1, step.title));
        }
        self.ask(&summary)
    }

    fn approve_step(&self, step: &TaskStep, errors: &[String]) -> Result<Decision> {
        let mut summary = format!("step {}: {}", step.index + 1, step.title);
        for error in errors {
            summary.push_str(&format!("\n  ! {error}"));
        }
        self.ask(&summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_answers() {
        assert_eq!(parse_decision("Y\n"), Some(Decision::Approve));
        assert_eq!(parse_decision(" approve "), Some(Decision::Approve));
        assert_eq!(parse_decision("no"), Some(Decision::Reject));
        assert_eq!(parse_decision("maybe"), None);
        assert_eq!(parse_decision(""), None);
    }
}

//! Runtime probe for generated code.
//!
//! A probe runs whatever the step produced and reports console events. The
//! driver keeps only error-level events as validation input.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::{ConsoleEvent, ConsoleLevel, FileMap};
use crate::io::config::CheckConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

const CHECK_OUTPUT_LIMIT_BYTES: usize = 100_000;

pub trait RuntimeProbe {
    fn probe(&self, files: &FileMap) -> Result<Vec<ConsoleEvent>>;
}

/// Probe that runs a configured check command in the project root.
///
/// A passing run yields its stdout lines as `log` events. A failing run yields
/// its stderr lines as `error` events, capped at `max_errors`.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    max_errors: usize,
}

impl CommandProbe {
    pub fn new(config: &CheckConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            workdir: workdir.into(),
            timeout: config.timeout(),
            max_errors: config.max_errors,
        }
    }
}

impl RuntimeProbe for CommandProbe {
    #[instrument(skip_all, fields(files = files.len()))]
    fn probe(&self, files: &FileMap) -> Result<Vec<ConsoleEvent>> {
        if self.command.is_empty() {
            return Ok(Vec::new());
        }
        let cmd = command_from_argv(&self.command, &self.workdir)?;
        let output = run_command_with_timeout(cmd, None, self.timeout, CHECK_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run check {}", self.command.join(" ")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "check timed out");
            return Ok(vec![ConsoleEvent::error(format!(
                "check timed out after {}s",
                self.timeout.as_secs()
            ))]);
        }

        if output.status.success() {
            let events = lines(&output.stdout_lossy())
                .map(|line| ConsoleEvent {
                    level: ConsoleLevel::Log,
                    message: line.to_string(),
                })
                .collect();
            return Ok(events);
        }

        let stderr = output.stderr_lossy();
        let mut events: Vec<ConsoleEvent> = lines(&stderr)
            .take(self.max_errors)
            .map(ConsoleEvent::error)
            .collect();
        if events.is_empty() {
            events.push(ConsoleEvent::error(format!(
                "check exited with status {:?}",
                output.status.code()
            )));
        }
        debug!(errors = events.len(), "check reported errors");
        Ok(events)
    }
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::console_errors;

    fn probe(script: &str, max_errors: usize) -> CommandProbe {
        let config = CheckConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs: 10,
            max_errors,
        };
        CommandProbe::new(&config, std::env::temp_dir())
    }

    #[test]
    fn empty_command_reports_nothing() {
        let probe = CommandProbe::new(&CheckConfig::default(), std::env::temp_dir());
        assert!(probe.probe(&FileMap::new()).expect("probe").is_empty());
    }

    #[test]
    fn passing_run_yields_no_errors() {
        let events = probe("echo ready", 5).probe(&FileMap::new()).expect("probe");
        assert_eq!(events.len(), 1);
        assert!(console_errors(&events).is_empty());
    }

    #[test]
    fn failing_run_turns_stderr_lines_into_errors() {
        let script = "echo 'TypeError: a' >&2; echo >&2; echo 'TypeError: b' >&2; echo 'c' >&2; exit 1";
        let events = probe(script, 2).probe(&FileMap::new()).expect("probe");
        assert_eq!(
            console_errors(&events),
            vec!["TypeError: a".to_string(), "TypeError: b".to_string()]
        );
    }

    #[test]
    fn silent_failure_still_reports_an_error() {
        let events = probe("exit 2", 5).probe(&FileMap::new()).expect("probe");
        assert_eq!(
            console_errors(&events),
            vec!["check exited with status Some(2)".to_string()]
        );
    }
}

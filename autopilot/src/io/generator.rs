//! AI text-generation abstraction.
//!
//! The [`Generator`] trait decouples the driver from the actual backend
//! (by default `codex exec`). Tests use scripted generators that return
//! predetermined text without spawning processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Accumulated output of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    /// Reported by backends that meter usage.
    pub tokens_used: Option<u64>,
}

/// Abstraction over AI text-generation backends.
pub trait Generator {
    /// Send a prompt and wait for the complete response.
    fn generate(&self, prompt: &str) -> Result<Generation>;
}

/// Generator that pipes the prompt to a configured command and reads its stdout.
///
/// The command runs in the project root so agentic backends can edit files
/// in place.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(config: &GeneratorConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            workdir: workdir.into(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs(), prompt_bytes = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<Generation> {
        info!(workdir = %self.workdir.display(), "starting generator");
        let cmd = command_from_argv(&self.command, &self.workdir)?;
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run generator {}", self.command.join(" ")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            let stderr = output.stderr_lossy();
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let text = output.stdout_lossy();
        debug!(response_bytes = text.len(), "generator completed");
        Ok(Generation {
            text,
            tokens_used: None,
        })
    }
}

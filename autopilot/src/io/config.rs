//! Autopilot configuration stored under `.autopilot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::context::{DEFAULT_MAX_HEAL_ATTEMPTS, DEFAULT_MAX_ITERATIONS};
use crate::core::history::DEFAULT_HISTORY_LIMIT;
use crate::core::types::ApprovalMode;
use crate::driver::DriverConfig;
use crate::io::prompt::PromptBuilder;
use crate::orchestrator::OrchestratorConfig;

pub const AUTOPILOT_DIR: &str = ".autopilot";
pub const CONFIG_FILE: &str = "config.toml";

/// Location of the config file for a project root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(AUTOPILOT_DIR).join(CONFIG_FILE)
}

/// Autopilot configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields fall back to
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Repair rounds per step before the step is accepted with its errors.
    pub max_heal_attempts: u32,

    /// Soft cap on step advances per task, checked by the driver.
    pub max_iterations: u32,

    pub approval_mode: ApprovalMode,

    /// Ask a human instead of accepting a step whose heal attempts ran out.
    pub escalate_on_heal_exhausted: bool,

    /// Finished tasks kept in memory.
    pub history_limit: usize,

    /// Byte budget for a rendered prompt.
    pub prompt_budget_bytes: usize,

    /// Per-file preview size embedded in the decomposition prompt.
    pub file_preview_bytes: usize,

    /// Review scores below this turn error-level review issues into
    /// validation errors.
    pub min_review_score: u8,

    pub generator: GeneratorConfig,
    pub check: CheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and edits the working tree.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckConfig {
    /// Command that runs the generated code; empty disables runtime checks.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Cap on console errors reported from one run.
    pub max_errors: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            max_errors: 20,
        }
    }
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            max_heal_attempts: DEFAULT_MAX_HEAL_ATTEMPTS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            approval_mode: ApprovalMode::Auto,
            escalate_on_heal_exhausted: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            prompt_budget_bytes: 40_000,
            file_preview_bytes: 4_000,
            min_review_score: 70,
            generator: GeneratorConfig::default(),
            check: CheckConfig::default(),
        }
    }
}

impl AutopilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.history_limit == 0 {
            return Err(anyhow!("history_limit must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.file_preview_bytes == 0 {
            return Err(anyhow!("file_preview_bytes must be > 0"));
        }
        if self.min_review_score > 100 {
            return Err(anyhow!("min_review_score must be <= 100"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if let Some(program) = self.check.command.first()
            && program.trim().is_empty()
        {
            return Err(anyhow!("check.command must name a program"));
        }
        if self.check.timeout_secs == 0 {
            return Err(anyhow!("check.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            approval_mode: self.approval_mode,
            max_iterations: self.max_iterations,
            max_heal_attempts: self.max_heal_attempts,
            history_limit: self.history_limit,
        }
    }

    pub fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompt_budget_bytes, self.file_preview_bytes)
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            prompts: self.prompt_builder(),
            min_review_score: self.min_review_score,
            escalate_on_heal_exhausted: self.escalate_on_heal_exhausted,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutopilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutopilotConfig> {
    if !path.exists() {
        let cfg = AutopilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutopilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutopilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the default config under `root`.
///
/// Fails if the file exists unless `force` is set.
pub fn init_config(root: &Path, force: bool) -> Result<PathBuf> {
    let path = config_path(root);
    if path.exists() && !force {
        return Err(anyhow!(
            "autopilot init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(&path, &AutopilotConfig::default())?;
    Ok(path)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

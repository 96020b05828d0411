//! Autonomous multi-step code generation orchestrator.
//!
//! `autopilot run` decomposes a request into steps and drives each one through
//! generation, validation, self-healing, and approval inside the current git
//! work tree. The remaining commands expose the individual pieces for
//! scripting and debugging.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use autopilot::core::decomposition::parse_decomposition_response;
use autopilot::core::types::{AgentState, ApprovalMode, FileMap};
use autopilot::core::validator::validate_step_output;
use autopilot::driver::{Collaborators, DriveOutcome, drive, rollback_task};
use autopilot::exit_codes;
use autopilot::io::approval::StdinApprover;
use autopilot::io::config::{config_path, init_config, load_config};
use autopilot::io::generator::CommandGenerator;
use autopilot::io::git::Git;
use autopilot::io::runtime::CommandProbe;
use autopilot::io::workspace::{GitWorkspace, Workspace};
use autopilot::logging;
use autopilot::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "autopilot",
    version,
    about = "Autonomous multi-step code generation orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.autopilot/config.toml` with default settings.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Decompose a request and run every step in the current git work tree.
    Run {
        /// What to build.
        prompt: String,
        /// Override the configured approval mode.
        #[arg(long, value_enum)]
        approval: Option<ApprovalMode>,
        /// Restore the pre-task snapshot if the task fails.
        #[arg(long)]
        rollback_on_failure: bool,
    },
    /// Print the decomposition prompt for a request without calling the generator.
    Plan {
        /// What to build.
        prompt: String,
    },
    /// Run the output validator over files and print its findings.
    Check {
        /// Files to validate.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Parse a decomposition response from stdin and print the steps as JSON.
    ParsePlan,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Run {
            prompt,
            approval,
            rollback_on_failure,
        } => cmd_run(&root, &prompt, approval, rollback_on_failure),
        Command::Plan { prompt } => cmd_plan(&root, &prompt),
        Command::Check { files } => cmd_check(&files),
        Command::ParsePlan => cmd_parse_plan(),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = init_config(root, force)?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    root: &Path,
    prompt: &str,
    approval: Option<ApprovalMode>,
    rollback_on_failure: bool,
) -> Result<i32> {
    let mut cfg = load_config(&config_path(root))?;
    if let Some(mode) = approval {
        cfg.approval_mode = mode;
    }
    let git = Git::new(root);
    git.ensure_repository()?;

    let workspace = GitWorkspace::new(git);
    let generator = CommandGenerator::new(&cfg.generator, root);
    let probe = CommandProbe::new(&cfg.check, root);
    let approver = StdinApprover;
    let collaborators = Collaborators {
        generator: &generator,
        workspace: &workspace,
        snapshots: &workspace,
        probe: &probe,
        approver: &approver,
        reviewer: None,
    };

    let mut orch = Orchestrator::new(cfg.orchestrator_config());
    let outcome = drive(&mut orch, &collaborators, &cfg.driver_config(), prompt)?;
    if rollback_on_failure
        && outcome.state == AgentState::Failed
        && orch
            .current_task()
            .is_some_and(|task| task.pre_execution_commit_id.is_some())
    {
        rollback_task(&mut orch, &workspace)?;
    }

    print_json(&RunReport::new(&outcome, &orch))?;
    Ok(exit_code_for(outcome.state))
}

fn cmd_plan(root: &Path, prompt: &str) -> Result<i32> {
    let cfg = load_config(&config_path(root))?;
    let git = Git::new(root);
    git.ensure_repository()?;
    let files = GitWorkspace::new(git).files()?;
    let pack = cfg.prompt_builder().build_decomposition(prompt, &files)?;
    println!("{}", pack.as_str());
    Ok(exit_codes::OK)
}

fn cmd_check(paths: &[PathBuf]) -> Result<i32> {
    let mut files = FileMap::new();
    for path in paths {
        let body =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        files.insert(path.display().to_string(), body);
    }
    let errors = validate_step_output(&files, &[]);
    for error in &errors {
        println!("{error}");
    }
    if errors.is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FINDINGS)
    }
}

fn cmd_parse_plan() -> Result<i32> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read decomposition response from stdin")?;
    let steps = parse_decomposition_response(&input)?;
    print_json(&steps)?;
    Ok(exit_codes::OK)
}

fn exit_code_for(state: AgentState) -> i32 {
    match state {
        AgentState::Completed => exit_codes::OK,
        AgentState::Cancelled => exit_codes::TASK_CANCELLED,
        _ => exit_codes::TASK_FAILED,
    }
}

/// Final summary of a `run`, printed to stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    task_id: &'a str,
    state: AgentState,
    last_error: Option<&'a str>,
    steps_completed: usize,
    total_steps: usize,
    tokens_used: u64,
    steps: Vec<StepReport<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepReport<'a> {
    id: &'a str,
    title: &'a str,
    status: autopilot::core::types::StepStatus,
    files_modified: &'a [String],
    error: Option<&'a str>,
}

impl<'a> RunReport<'a> {
    fn new(outcome: &'a DriveOutcome, orch: &'a Orchestrator) -> Self {
        let task = orch
            .current_task()
            .filter(|task| task.id == outcome.task_id)
            .or_else(|| orch.history().latest());
        let steps = task
            .map(|task| {
                task.steps
                    .iter()
                    .map(|step| StepReport {
                        id: &step.id,
                        title: &step.title,
                        status: step.status,
                        files_modified: &step.files_modified,
                        error: step.error.as_deref(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            task_id: &outcome.task_id,
            state: outcome.state,
            last_error: outcome.last_error.as_deref(),
            steps_completed: outcome.steps_completed,
            total_steps: outcome.total_steps,
            tokens_used: outcome.tokens_used,
            steps,
        }
    }
}

/// Serialize `value` to pretty-printed JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["autopilot", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["autopilot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_approval_override() {
        let cli = Cli::parse_from([
            "autopilot",
            "run",
            "build a landing page",
            "--approval",
            "plan-only",
        ]);
        match cli.command {
            Command::Run {
                prompt,
                approval,
                rollback_on_failure,
            } => {
                assert_eq!(prompt, "build a landing page");
                assert_eq!(approval, Some(ApprovalMode::PlanOnly));
                assert!(!rollback_on_failure);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn check_requires_files() {
        assert!(Cli::try_parse_from(["autopilot", "check"]).is_err());
    }

    #[test]
    fn exit_codes_distinguish_terminal_states() {
        assert_eq!(exit_code_for(AgentState::Completed), exit_codes::OK);
        assert_eq!(exit_code_for(AgentState::Failed), exit_codes::TASK_FAILED);
        assert_eq!(
            exit_code_for(AgentState::Cancelled),
            exit_codes::TASK_CANCELLED
        );
    }

    #[test]
    fn check_reports_findings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.js");
        fs::write(&path, "function f() {").expect("write");
        assert_eq!(cmd_check(&[path]).expect("check"), exit_codes::FINDINGS);

        let ok = temp.path().join("ok.js");
        fs::write(&ok, "function f() {}").expect("write");
        assert_eq!(cmd_check(&[ok]).expect("check"), exit_codes::OK);
    }
}

//! Test-only helpers: deterministic fixtures and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::task::{AutonomousTask, StepSpec, TaskStep};
use crate::core::types::{ConsoleEvent, FileMap};
use crate::io::approval::{Approver, Decision};
use crate::io::generator::{Generation, Generator};
use crate::io::git::Git;
use crate::io::review::{ReviewReport, Reviewer};
use crate::io::runtime::RuntimeProbe;
use crate::io::workspace::{SnapshotStore, Workspace};

/// Create a deterministic step definition with no affected files.
pub fn step_spec(title: &str) -> StepSpec {
    StepSpec {
        title: title.to_string(),
        description: format!("{title} description"),
        files_affected: Vec::new(),
    }
}

/// Create `n` step definitions titled `step 0` .. `step n-1`.
pub fn step_specs(n: usize) -> Vec<StepSpec> {
    (0..n).map(|i| step_spec(&format!("step {i}"))).collect()
}

/// A well-formed decomposition response listing the given step titles.
pub fn decomposition_json(titles: &[&str]) -> String {
    let steps: Vec<serde_json::Value> = titles
        .iter()
        .map(|title| {
            serde_json::json!({
                "title": title,
                "description": format!("{title} description"),
                "filesAffected": ["index.html"],
            })
        })
        .collect();
    serde_json::json!({ "steps": steps }).to_string()
}

/// Build a file map from `(name, body)` pairs.
pub fn file_map(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect()
}

/// Generator that replays scripted responses in order and records prompts.
///
/// An `Err` entry simulates a failed AI call.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
    tokens_per_call: Option<u64>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            ..Self::default()
        }
    }

    /// Convenience for scripts where every call succeeds.
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|reply| Ok(reply.to_string())).collect())
    }

    pub fn with_tokens(mut self, tokens_per_call: u64) -> Self {
        self.tokens_per_call = Some(tokens_per_call);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<Generation> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(Generation {
                text,
                tokens_used: self.tokens_per_call,
            }),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// In-memory workspace. `changed_since` replays scripted change sets, one per
/// call, repeating the last one once the script runs out.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    files: RefCell<FileMap>,
    changes: RefCell<VecDeque<FileMap>>,
    queried_snapshots: RefCell<Vec<String>>,
}

impl MemoryWorkspace {
    pub fn new(files: FileMap, changes: Vec<FileMap>) -> Self {
        Self {
            files: RefCell::new(files),
            changes: RefCell::new(changes.into()),
            queried_snapshots: RefCell::default(),
        }
    }

    /// Snapshot ids passed to `changed_since`, in call order.
    pub fn queried_snapshots(&self) -> Vec<String> {
        self.queried_snapshots.borrow().clone()
    }
}

impl Workspace for MemoryWorkspace {
    fn files(&self) -> Result<FileMap> {
        Ok(self.files.borrow().clone())
    }

    fn changed_since(&self, snapshot_id: &str) -> Result<FileMap> {
        self.queried_snapshots
            .borrow_mut()
            .push(snapshot_id.to_string());
        let mut changes = self.changes.borrow_mut();
        let next = if changes.len() > 1 {
            changes.pop_front()
        } else {
            changes.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }
}

/// Snapshot store that hands out `snap-N` ids and records restores.
#[derive(Debug, Default)]
pub struct MemorySnapshots {
    next: Cell<u32>,
    labels: RefCell<Vec<String>>,
    restored: RefCell<Vec<String>>,
}

impl MemorySnapshots {
    pub fn labels(&self) -> Vec<String> {
        self.labels.borrow().clone()
    }

    pub fn restored(&self) -> Vec<String> {
        self.restored.borrow().clone()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn capture(&self, label: &str) -> Result<String> {
        let n = self.next.get() + 1;
        self.next.set(n);
        self.labels.borrow_mut().push(label.to_string());
        Ok(format!("snap-{n}"))
    }

    fn restore(&self, snapshot_id: &str) -> Result<()> {
        self.restored.borrow_mut().push(snapshot_id.to_string());
        Ok(())
    }
}

/// Probe that replays scripted console events per call, repeating the last
/// entry; reports nothing when unscripted.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    events: RefCell<VecDeque<Vec<ConsoleEvent>>>,
}

impl ScriptedProbe {
    pub fn new(events: Vec<Vec<ConsoleEvent>>) -> Self {
        Self {
            events: RefCell::new(events.into()),
        }
    }
}

impl RuntimeProbe for ScriptedProbe {
    fn probe(&self, _files: &FileMap) -> Result<Vec<ConsoleEvent>> {
        let mut events = self.events.borrow_mut();
        let next = if events.len() > 1 {
            events.pop_front()
        } else {
            events.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }
}

/// Approver that replays scripted decisions and approves once they run out.
#[derive(Debug, Default)]
pub struct ScriptedApprover {
    plan: RefCell<VecDeque<Decision>>,
    steps: RefCell<VecDeque<Decision>>,
    seen_steps: RefCell<Vec<(String, Vec<String>)>>,
}

impl ScriptedApprover {
    pub fn new(plan: Vec<Decision>, steps: Vec<Decision>) -> Self {
        Self {
            plan: RefCell::new(plan.into()),
            steps: RefCell::new(steps.into()),
            seen_steps: RefCell::default(),
        }
    }

    /// `(step id, outstanding errors)` for each step put up for approval.
    pub fn seen_steps(&self) -> Vec<(String, Vec<String>)> {
        self.seen_steps.borrow().clone()
    }
}

impl Approver for ScriptedApprover {
    fn approve_plan(&self, _task: &AutonomousTask) -> Result<Decision> {
        Ok(self.plan.borrow_mut().pop_front().unwrap_or(Decision::Approve))
    }

    fn approve_step(&self, step: &TaskStep, errors: &[String]) -> Result<Decision> {
        self.seen_steps
            .borrow_mut()
            .push((step.id.clone(), errors.to_vec()));
        Ok(self.steps.borrow_mut().pop_front().unwrap_or(Decision::Approve))
    }
}

/// Reviewer that returns the same report for every review.
#[derive(Debug, Clone)]
pub struct ScriptedReviewer {
    pub report: ReviewReport,
}

impl Reviewer for ScriptedReviewer {
    fn review(&self, _files: &FileMap) -> Result<ReviewReport> {
        Ok(self.report.clone())
    }
}

/// Throwaway git repository with a committer identity configured.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Self { dir };
        repo.git_cmd(&["init", "-q"]);
        repo.git_cmd(&["config", "user.email", "autopilot@example.com"]);
        repo.git_cmd(&["config", "user.name", "autopilot"]);
        repo.git_cmd(&["config", "commit.gpgsign", "false"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.dir.path())
    }

    pub fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, body).expect("write file");
        path
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.dir.path().join(rel)).ok()
    }

    fn git_cmd(&self, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .status()
            .expect("spawn git");
        assert!(status.success(), "git {args:?} failed");
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

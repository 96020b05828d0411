//! Git adapter for workspace snapshots.
//!
//! Snapshots are ordinary commits, so we keep a small, explicit wrapper around
//! `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Error unless the working directory is inside a git work tree.
    pub fn ensure_repository(&self) -> Result<()> {
        let out = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        if out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true" {
            return Ok(());
        }
        Err(anyhow!(
            "{} is not inside a git work tree",
            self.workdir.display()
        ))
    }

    /// Full SHA of HEAD.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Tracked and untracked files, excluding ignored ones, sorted.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["ls-files", "-z", "--cached", "--others", "--exclude-standard"])?;
        Ok(split_nul_sorted(&out))
    }

    /// Files whose working-tree content differs from `rev`, plus untracked files.
    ///
    /// Deleted files are included; callers decide how to treat paths that no
    /// longer exist.
    pub fn changed_files_since(&self, rev: &str) -> Result<Vec<String>> {
        let mut tracked = self.run_capture(&["diff", "--name-only", "-z", rev, "--"])?;
        let untracked = self.run_capture(&["ls-files", "-z", "--others", "--exclude-standard"])?;
        tracked.push_str(&untracked);
        Ok(split_nul_sorted(&tracked))
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Stage everything and commit, even when nothing changed.
    #[instrument(skip_all)]
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.add_all()?;
        self.run_checked(&["commit", "-q", "--allow-empty", "--no-verify", "-m", message])?;
        let sha = self.head_sha()?;
        debug!(sha = %sha, "committed snapshot");
        Ok(sha)
    }

    /// Discard tracked changes and untracked files, returning to `rev`.
    #[instrument(skip_all, fields(rev))]
    pub fn reset_hard(&self, rev: &str) -> Result<()> {
        debug!(rev, "resetting working tree");
        self.run_checked(&["reset", "-q", "--hard", rev])?;
        self.run_checked(&["clean", "-q", "-fd"])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn split_nul_sorted(raw: &str) -> Vec<String> {
    let mut paths: Vec<String> = raw
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

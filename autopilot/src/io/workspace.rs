//! Project files and snapshots.
//!
//! [`Workspace`] supplies file context for prompts and reports what a step
//! produced; [`SnapshotStore`] captures and restores rollback points. The
//! orchestrator only ever stores snapshot ids.

use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::FileMap;
use crate::io::git::Git;

pub trait Workspace {
    /// Current project files by relative path.
    fn files(&self) -> Result<FileMap>;

    /// Files created or modified since `snapshot_id`, with their current bodies.
    fn changed_since(&self, snapshot_id: &str) -> Result<FileMap>;
}

pub trait SnapshotStore {
    /// Record the current working tree, returning an opaque snapshot id.
    fn capture(&self, label: &str) -> Result<String>;

    /// Return the working tree to a captured snapshot.
    fn restore(&self, snapshot_id: &str) -> Result<()>;
}

/// Workspace and snapshot store backed by a git work tree.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    git: Git,
}

impl GitWorkspace {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    /// Read the given paths, skipping deleted and non-UTF-8 files.
    fn read_files(&self, paths: Vec<String>) -> Result<FileMap> {
        let mut files = FileMap::new();
        for rel in paths {
            let path = self.git.workdir().join(&rel);
            if !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(body) => {
                    files.insert(rel, body);
                }
                Err(_) => debug!(path = %rel, "skipping non-UTF-8 file"),
            }
        }
        Ok(files)
    }
}

impl Workspace for GitWorkspace {
    #[instrument(skip_all)]
    fn files(&self) -> Result<FileMap> {
        let paths = self.git.list_files()?;
        self.read_files(paths)
    }

    #[instrument(skip_all, fields(snapshot_id))]
    fn changed_since(&self, snapshot_id: &str) -> Result<FileMap> {
        let paths = self.git.changed_files_since(snapshot_id)?;
        debug!(changed = paths.len(), "collected changed files");
        self.read_files(paths)
    }
}

impl SnapshotStore for GitWorkspace {
    fn capture(&self, label: &str) -> Result<String> {
        self.git
            .commit_all(label)
            .with_context(|| format!("capture snapshot '{label}'"))
    }

    fn restore(&self, snapshot_id: &str) -> Result<()> {
        self.git
            .reset_hard(snapshot_id)
            .with_context(|| format!("restore snapshot {snapshot_id}"))
    }
}

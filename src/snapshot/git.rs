//! Git snapshot backend
//!
//! Revisions are commits of a repository living directly in the workspace.
//! Staging is forced, so host excludes, `.git/info/exclude` and nested
//! `.gitignore` files never hide content; only the ignore-set is left out,
//! through exclude pathspecs and a generated `.gitignore`.
//! HEAD only ever moves forward through `commit`; `restore` rewrites the index
//! and working tree but leaves HEAD alone, so every recorded revision stays
//! reachable.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

use crate::core::error::{MemoError, Result};
use crate::core::logging::operations;
use crate::core::paths::IGNORE_SET;
use crate::snapshot::{SnapshotBackend, SnapshotId};

/// Identity used for snapshot commits, so hosts without git config still work
const COMMIT_IDENTITY: [&str; 6] = [
    "-c",
    "user.name=wsmemo",
    "-c",
    "user.email=wsmemo@localhost",
    "-c",
    "commit.gpgsign=false",
];

#[derive(Debug, Default)]
pub struct GitSnapshot;

impl GitSnapshot {
    pub fn new() -> Self {
        Self
    }

    fn run(
        &self,
        work_dir: &Path,
        operation: &'static str,
        args: &[&str],
        index_file: Option<&Path>,
    ) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.current_dir(work_dir).args(args);
        if let Some(index) = index_file {
            cmd.env("GIT_INDEX_FILE", index);
        }

        debug!(operation, args = %args.join(" "), "git");
        cmd.output()
            .map_err(|e| MemoError::snapshot(operation, format!("failed to run git: {}", e)))
    }

    /// Run git and fail unless it exits successfully; returns trimmed stdout
    fn run_ok(
        &self,
        work_dir: &Path,
        operation: &'static str,
        args: &[&str],
        index_file: Option<&Path>,
    ) -> Result<String> {
        let output = self.run(work_dir, operation, args, index_file)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MemoError::snapshot(
                operation,
                format!("git {} failed: {}", args.join(" "), stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn ensure_initialized(&self, work_dir: &Path, operation: &'static str) -> Result<()> {
        if self.is_initialized(work_dir) {
            Ok(())
        } else {
            Err(MemoError::snapshot(
                operation,
                format!("{} has no snapshot repository (run init)", work_dir.display()),
            ))
        }
    }

    fn head(&self, work_dir: &Path, operation: &'static str) -> Result<SnapshotId> {
        self.run_ok(work_dir, operation, &["rev-parse", "HEAD"], None)
            .map(SnapshotId::new)
    }

    /// Resolve a snapshot to its tree hash
    fn tree_of(&self, work_dir: &Path, operation: &'static str, id: &SnapshotId) -> Result<String> {
        let rev = format!("{}^{{tree}}", id.as_str());
        self.run_ok(work_dir, operation, &["rev-parse", "--verify", "--quiet", &rev], None)
            .map_err(|_| MemoError::snapshot(operation, format!("unknown snapshot {}", id)))
    }

    /// Stage the whole working tree except the ignore-set
    fn stage(
        &self,
        work_dir: &Path,
        operation: &'static str,
        index_file: Option<&Path>,
    ) -> Result<()> {
        let excludes: Vec<String> = IGNORE_SET
            .iter()
            .filter(|name| **name != ".git")
            .map(|name| format!(":(top,literal,exclude){}", name))
            .collect();

        let mut args = vec![
            "-c",
            "core.excludesFile=/dev/null",
            "add",
            "-A",
            "--force",
            "--",
            ".",
        ];
        args.extend(excludes.iter().map(String::as_str));
        self.run_ok(work_dir, operation, &args, index_file)?;
        Ok(())
    }

    fn write_gitignore(&self, work_dir: &Path) -> Result<()> {
        let content: String = IGNORE_SET
            .iter()
            .filter(|name| **name != ".git")
            .map(|name| format!("/{}\n", name))
            .collect();
        fs::write(work_dir.join(".gitignore"), content).map_err(|e| {
            MemoError::snapshot(operations::SNAPSHOT_INIT, format!("cannot write .gitignore: {}", e))
        })
    }
}

impl SnapshotBackend for GitSnapshot {
    fn name(&self) -> &'static str {
        "git"
    }

    fn is_initialized(&self, work_dir: &Path) -> bool {
        work_dir.join(".git").exists()
    }

    fn init(&self, work_dir: &Path) -> Result<SnapshotId> {
        let op = operations::SNAPSHOT_INIT;
        if self.is_initialized(work_dir) {
            return self.head(work_dir, op);
        }

        self.write_gitignore(work_dir)?;
        self.run_ok(work_dir, op, &["init", "-q"], None)?;
        self.commit(work_dir)
    }

    fn commit(&self, work_dir: &Path) -> Result<SnapshotId> {
        let op = operations::SNAPSHOT_COMMIT;
        self.ensure_initialized(work_dir, op)?;

        self.stage(work_dir, op, None)?;

        let mut args: Vec<&str> = COMMIT_IDENTITY.to_vec();
        args.extend([
            "commit",
            "-q",
            "--no-verify",
            "--allow-empty",
            "--allow-empty-message",
            "-m",
            "",
        ]);
        self.run_ok(work_dir, op, &args, None)?;

        self.head(work_dir, op)
    }

    fn restore(&self, work_dir: &Path, id: &SnapshotId) -> Result<()> {
        let op = operations::SNAPSHOT_RESTORE;
        self.ensure_initialized(work_dir, op)?;
        self.tree_of(work_dir, op, id)?;

        // Track everything first so read-tree may remove or overwrite any
        // non-ignored file.
        self.stage(work_dir, op, None)?;
        self.run_ok(work_dir, op, &["read-tree", "--reset", "-u", id.as_str()], None)?;
        Ok(())
    }

    fn has_changed_since(&self, work_dir: &Path, id: &SnapshotId) -> Result<bool> {
        let op = operations::CACHE_LOOKUP;
        self.ensure_initialized(work_dir, op)?;
        let recorded = self.tree_of(work_dir, op, id)?;

        // Stage the working tree into a private index and compare tree hashes.
        let scratch = tempfile::tempdir()
            .map_err(|e| MemoError::snapshot(op, format!("cannot create temp index: {}", e)))?;
        let index = scratch.path().join("index");
        let live_index = work_dir.join(".git").join("index");
        if live_index.exists() {
            // Reuse cached stat info so unchanged files are not rehashed
            fs::copy(&live_index, &index)
                .map_err(|e| MemoError::snapshot(op, format!("cannot copy index: {}", e)))?;
        }

        self.stage(work_dir, op, Some(&index))?;
        let current = self.run_ok(work_dir, op, &["write-tree"], Some(&index))?;

        Ok(current != recorded)
    }
}

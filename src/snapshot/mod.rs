//! Snapshot module - Workspace content revisions
//!
//! A snapshot is an immutable record of a workspace's full content, excluding the
//! ignore-set, named by an opaque [`SnapshotId`]. The memoization core only ever
//! talks to the [`SnapshotBackend`] trait, so any content-addressable mechanism
//! can sit underneath:
//! - git: revisions are commits of a repository living in the workspace
//! - store: a native object store under `.wsmemo/`

pub mod git;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::core::error::Result;
use crate::core::logging::operations;
use crate::core::model::{ResultItem, ResultSet, Source};
use crate::core::render::{RenderConfig, Renderer};

/// Opaque identifier of a recorded workspace revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capture, restore and compare workspace content
pub trait SnapshotBackend {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Whether the backend metadata already exists in `work_dir`
    fn is_initialized(&self, work_dir: &Path) -> bool;

    /// Create backend metadata and record a baseline revision.
    ///
    /// On an already initialized workspace this records nothing and returns the
    /// most recent revision.
    fn init(&self, work_dir: &Path) -> Result<SnapshotId>;

    /// Record current content as a new revision.
    ///
    /// Always yields a fresh id, even when nothing changed since the last commit.
    fn commit(&self, work_dir: &Path) -> Result<SnapshotId>;

    /// Make the tracked content of `work_dir` exactly match `id`.
    ///
    /// Untracked files absent from `id` are removed; the ignore-set is never
    /// touched.
    fn restore(&self, work_dir: &Path, id: &SnapshotId) -> Result<()>;

    /// Whether current tracked content differs from `id`. Must not modify the
    /// working tree or any recorded revision.
    fn has_changed_since(&self, work_dir: &Path, id: &SnapshotId) -> Result<bool>;
}

/// Available snapshot backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Git,
    Store,
}

impl BackendKind {
    /// Instantiate the backend
    pub fn open(self) -> Box<dyn SnapshotBackend> {
        match self {
            BackendKind::Git => Box::new(git::GitSnapshot::new()),
            BackendKind::Store => Box::new(store::StoreSnapshot::new()),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(BackendKind::Git),
            "store" | "native" => Ok(BackendKind::Store),
            _ => Err(format!("Unknown snapshot backend: {}", s)),
        }
    }
}

fn print_one(item: ResultItem, render_config: RenderConfig) {
    let result_set: ResultSet = std::iter::once(item).collect();
    Renderer::with_config(render_config).print(&result_set);
}

/// Run the 'snapshot commit' command
pub fn run_commit(root: &Path, kind: BackendKind, render_config: RenderConfig) -> anyhow::Result<()> {
    let backend = kind.open();
    let id = backend.commit(root)?;
    print_one(
        ResultItem::snapshot(id.as_str()).with_data(serde_json::json!({ "backend": backend.name() })),
        render_config,
    );
    Ok(())
}

/// Run the 'snapshot restore' command
pub fn run_restore(
    root: &Path,
    kind: BackendKind,
    id: &str,
    render_config: RenderConfig,
) -> anyhow::Result<()> {
    let backend = kind.open();
    let id = SnapshotId::new(id);
    backend.restore(root, &id)?;
    info!(operation = operations::SNAPSHOT_RESTORE, state = %id, "workspace restored");
    print_one(
        ResultItem::snapshot(id.as_str())
            .with_data(serde_json::json!({ "backend": backend.name(), "restored": true })),
        render_config,
    );
    Ok(())
}

/// Run the 'snapshot changed' command
pub fn run_changed(
    root: &Path,
    kind: BackendKind,
    id: &str,
    render_config: RenderConfig,
) -> anyhow::Result<()> {
    let backend = kind.open();
    let id = SnapshotId::new(id);
    let changed = backend.has_changed_since(root, &id)?;
    let message = if changed {
        format!("changed since {}", id)
    } else {
        format!("unchanged since {}", id)
    };
    print_one(
        ResultItem::check(message, Source::Snapshot)
            .with_data(serde_json::json!({ "state": id, "changed": changed })),
        render_config,
    );
    Ok(())
}

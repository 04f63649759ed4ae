//! Workspace preparation
//!
//! A workspace is a directory whose top level holds the pipeline's files plus
//! the ignore-set (backend metadata, `.cache`, `.session`). These operations
//! never descend into or remove ignore-set entries.

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::error::{IoContext, MemoError, Result};
use crate::core::logging::operations;
use crate::core::model::{ResultItem, ResultSet, Source};
use crate::core::paths::{is_ignored, is_importable, make_relative};
use crate::core::render::{RenderConfig, Renderer};
use crate::snapshot::{BackendKind, SnapshotBackend, SnapshotId};

/// Create `work_dir` if needed, optionally clean it, and initialize the backend
pub fn prepare(work_dir: &Path, backend: &dyn SnapshotBackend, clean_first: bool) -> Result<SnapshotId> {
    fs::create_dir_all(work_dir)
        .io_context(|| format!("Failed to create workspace: {}", work_dir.display()))?;

    if clean_first {
        clean(work_dir)?;
    }

    let baseline = backend.init(work_dir)?;
    info!(
        operation = operations::SNAPSHOT_INIT,
        backend = backend.name(),
        state = %baseline,
        "workspace ready"
    );
    Ok(baseline)
}

/// Remove every top-level entry outside the ignore-set; returns the names removed
pub fn clean(work_dir: &Path) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    let entries = fs::read_dir(work_dir)
        .io_context(|| format!("Failed to list workspace: {}", work_dir.display()))?;

    for entry in entries {
        let entry = entry.io_context(|| format!("Failed to list workspace: {}", work_dir.display()))?;
        let name = entry.file_name();
        if is_ignored(&name) {
            continue;
        }

        let path = entry.path();
        let file_type = entry
            .file_type()
            .io_context(|| format!("Failed to stat {}", path.display()))?;
        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.io_context(|| format!("Failed to remove {}", path.display()))?;

        debug!(path = %path.display(), "removed");
        removed.push(name.to_string_lossy().into_owned());
    }

    removed.sort();
    Ok(removed)
}

/// Copy importable top-level entries of `src` into `work_dir`.
///
/// Directories are copied recursively; existing files are overwritten.
/// Returns the copied file paths, relative to `work_dir`.
pub fn import(src: &Path, work_dir: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    let entries =
        fs::read_dir(src).io_context(|| format!("Failed to list source: {}", src.display()))?;

    let mut top_level: Vec<_> = entries
        .collect::<std::io::Result<Vec<_>>>()
        .io_context(|| format!("Failed to list source: {}", src.display()))?;
    top_level.sort_by_key(|e| e.file_name());

    for entry in top_level {
        if !is_importable(&entry.file_name()) {
            continue;
        }

        for item in WalkDir::new(entry.path()).sort_by_file_name() {
            let item = item.map_err(|e| {
                let message = e.to_string();
                MemoError::io(
                    format!("Failed to walk {}", src.display()),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, message)),
                )
            })?;

            let relative = match make_relative(item.path(), src) {
                Some(r) => r,
                None => continue,
            };
            let target = work_dir.join(item.path().strip_prefix(src).unwrap_or(item.path()));

            if item.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .io_context(|| format!("Failed to create {}", target.display()))?;
            } else if item.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .io_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::copy(item.path(), &target)
                    .io_context(|| format!("Failed to copy {}", item.path().display()))?;
                copied.push(relative);
            }
        }
    }

    Ok(copied)
}

/// Run the 'init' command
pub fn run_init(
    root: &Path,
    backend: BackendKind,
    clean_first: bool,
    render_config: RenderConfig,
) -> anyhow::Result<()> {
    let backend = backend.open();
    let baseline = prepare(root, backend.as_ref(), clean_first)
        .with_context(|| format!("Failed to prepare workspace {}", root.display()))?;

    let item = ResultItem::snapshot(baseline.as_str())
        .with_data(serde_json::json!({ "backend": backend.name(), "baseline": true }));
    let result_set: ResultSet = std::iter::once(item).collect();
    Renderer::with_config(render_config).print(&result_set);
    Ok(())
}

/// Run the 'import' command
pub fn run_import(root: &Path, src: &Path, render_config: RenderConfig) -> anyhow::Result<()> {
    let copied = import(src, root)
        .with_context(|| format!("Failed to import {} into {}", src.display(), root.display()))?;

    let mut result_set: ResultSet = copied.into_iter().map(ResultItem::file).collect();
    result_set.sort();
    Renderer::with_config(render_config).print(&result_set);
    Ok(())
}

/// Run the 'clean' command
pub fn run_clean(root: &Path, render_config: RenderConfig) -> anyhow::Result<()> {
    let removed = clean(root)?;

    let result_set: ResultSet = removed
        .into_iter()
        .map(|name| ResultItem::check(format!("removed {}", name), Source::Fs).with_data(
            serde_json::json!({ "path": name }),
        ))
        .collect();
    Renderer::with_config(render_config).print(&result_set);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::store::StoreSnapshot;
    use tempfile::tempdir;

    #[test]
    fn test_clean_keeps_ignore_set() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join(".cache"), "[]").unwrap();
        fs::write(root.join(".session"), "SID").unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join("case.struct"), "Fe").unwrap();
        fs::create_dir_all(root.join("sub/deep")).unwrap();
        fs::write(root.join("sub/deep/file"), "x").unwrap();

        let removed = clean(root).unwrap();
        assert_eq!(removed, vec!["case.struct", "sub"]);
        assert!(root.join(".cache").exists());
        assert!(root.join(".session").exists());
        assert!(root.join(".git").is_dir());
        assert!(!root.join("sub").exists());
    }

    #[test]
    fn test_import_skips_private_entries() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("case.struct"), "Fe3O4").unwrap();
        fs::write(src.path().join(".hidden"), "h").unwrap();
        fs::write(src.path().join(":log"), "l").unwrap();
        fs::write(src.path().join(".cache"), "[]").unwrap();
        fs::create_dir_all(src.path().join("inputs/k")).unwrap();
        fs::write(src.path().join("inputs/k/mesh"), "4 4 4").unwrap();
        // Nested dot-files are part of the copied directory
        fs::write(src.path().join("inputs/.keep"), "").unwrap();

        let copied = import(src.path(), dst.path()).unwrap();
        assert_eq!(copied, vec!["case.struct", "inputs/.keep", "inputs/k/mesh"]);
        assert_eq!(
            fs::read_to_string(dst.path().join("inputs/k/mesh")).unwrap(),
            "4 4 4"
        );
        assert!(!dst.path().join(".hidden").exists());
        assert!(!dst.path().join(":log").exists());
        assert!(!dst.path().join(".cache").exists());
    }

    #[test]
    fn test_prepare_creates_and_initializes() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("work");
        let backend = StoreSnapshot::new();

        let baseline = prepare(&root, &backend, false).unwrap();
        assert!(backend.is_initialized(&root));
        assert!(!backend.has_changed_since(&root, &baseline).unwrap());

        // Re-preparing an initialized workspace keeps its history
        let again = prepare(&root, &backend, false).unwrap();
        assert_eq!(again, baseline);
    }

    #[test]
    fn test_prepare_clean_empties_workspace() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let backend = StoreSnapshot::new();
        fs::write(root.join("stale.out"), "old").unwrap();
        fs::write(root.join(".session"), "SID").unwrap();

        prepare(root, &backend, true).unwrap();
        assert!(!root.join("stale.out").exists());
        assert!(root.join(".session").exists());
    }
}

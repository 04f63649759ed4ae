//! Native snapshot store
//!
//! A small content-addressed store kept in `.wsmemo/` inside the workspace:
//!
//! ```text
//! .wsmemo/
//!   HEAD                  id of the most recent revision
//!   objects/<sha1>        file contents
//!   snapshots/<id>.json   manifest: relative path -> file record
//! ```
//!
//! Regular files are recorded with their content hash and permission bits,
//! symlinks with their target. Directories exist implicitly through the paths
//! of the entries they contain. Change detection is a straight comparison of
//! records and never spawns a process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::error::{MemoError, Result};
use crate::core::logging::operations;
use crate::core::paths::{is_ignored, join_normalized, make_relative, store_dir};
use crate::core::util::{hash_bytes, hash_file, HashAlgorithm};
use crate::snapshot::{SnapshotBackend, SnapshotId};

const HEAD_FILE: &str = "HEAD";
const OBJECTS_DIR: &str = "objects";
const SNAPSHOTS_DIR: &str = "snapshots";

/// Recorded revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: SnapshotId,

    /// Monotonic commit counter; makes ids of identical content distinct
    pub sequence: u64,

    pub created_at: DateTime<Utc>,

    /// Relative path ('/'-separated) -> recorded entry
    pub files: BTreeMap<String, FileRecord>,
}

/// One tracked path in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileRecord {
    /// Regular file: SHA1 of content plus permission bits
    File { hash: String, mode: u32 },
    Symlink { target: String },
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &str, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot create symlink {}", link.display()),
    ))
}

/// Remove whatever occupies `path`, without following symlinks
fn remove_entry(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Default)]
pub struct StoreSnapshot;

fn fail(operation: &'static str) -> impl Fn(io::Error) -> MemoError {
    move |e| MemoError::snapshot(operation, e.to_string())
}

impl StoreSnapshot {
    pub fn new() -> Self {
        Self
    }

    fn manifest_path(work_dir: &Path, id: &SnapshotId) -> PathBuf {
        store_dir(work_dir)
            .join(SNAPSHOTS_DIR)
            .join(format!("{}.json", id.as_str()))
    }

    fn object_path(work_dir: &Path, hash: &str) -> PathBuf {
        store_dir(work_dir).join(OBJECTS_DIR).join(hash)
    }

    /// List tracked files and symlinks: relative path -> absolute path
    fn tracked_files(
        work_dir: &Path,
        operation: &'static str,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        let walker = WalkDir::new(work_dir)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && is_ignored(e.file_name())));

        for entry in walker {
            let entry = entry.map_err(|e| MemoError::snapshot(operation, e.to_string()))?;
            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }
            if let Some(relative) = make_relative(entry.path(), work_dir) {
                files.insert(relative, entry.into_path());
            }
        }
        Ok(files)
    }

    /// Symlink record for `path`, or None for a regular file
    fn link_record(path: &Path) -> io::Result<Option<FileRecord>> {
        if !fs::symlink_metadata(path)?.file_type().is_symlink() {
            return Ok(None);
        }
        let target = fs::read_link(path)?;
        Ok(Some(FileRecord::Symlink {
            target: target.to_string_lossy().into_owned(),
        }))
    }

    fn record_of(path: &Path) -> io::Result<FileRecord> {
        if let Some(link) = Self::link_record(path)? {
            return Ok(link);
        }
        Ok(FileRecord::File {
            hash: hash_file(path, HashAlgorithm::Sha1)?,
            mode: file_mode(&fs::metadata(path)?),
        })
    }

    /// Record every tracked path without writing anything
    fn current_state(
        work_dir: &Path,
        operation: &'static str,
    ) -> Result<BTreeMap<String, FileRecord>> {
        Self::tracked_files(work_dir, operation)?
            .into_iter()
            .map(|(relative, path)| {
                Self::record_of(&path)
                    .map(|record| (relative, record))
                    .map_err(fail(operation))
            })
            .collect()
    }

    fn load_manifest(
        work_dir: &Path,
        operation: &'static str,
        id: &SnapshotId,
    ) -> Result<Manifest> {
        let path = Self::manifest_path(work_dir, id);
        if !path.exists() {
            return Err(MemoError::snapshot(operation, format!("unknown snapshot {}", id)));
        }
        let content = fs::read_to_string(&path).map_err(fail(operation))?;
        serde_json::from_str(&content).map_err(|e| {
            MemoError::snapshot(operation, format!("corrupted manifest {}: {}", id, e))
        })
    }

    fn head(work_dir: &Path, operation: &'static str) -> Result<Option<Manifest>> {
        let head_path = store_dir(work_dir).join(HEAD_FILE);
        if !head_path.exists() {
            return Ok(None);
        }
        let id = fs::read_to_string(&head_path).map_err(fail(operation))?;
        Self::load_manifest(work_dir, operation, &SnapshotId::new(id.trim())).map(Some)
    }

    /// Remove now-empty parent directories of a deleted file, up to the root
    fn prune_empty_parents(work_dir: &Path, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(d) = dir {
            if d == work_dir || !d.starts_with(work_dir) {
                break;
            }
            if fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

impl SnapshotBackend for StoreSnapshot {
    fn name(&self) -> &'static str {
        "store"
    }

    fn is_initialized(&self, work_dir: &Path) -> bool {
        store_dir(work_dir).join(HEAD_FILE).exists()
    }

    fn init(&self, work_dir: &Path) -> Result<SnapshotId> {
        let op = operations::SNAPSHOT_INIT;
        if let Some(head) = Self::head(work_dir, op)? {
            return Ok(head.id);
        }

        let root = store_dir(work_dir);
        fs::create_dir_all(root.join(OBJECTS_DIR)).map_err(fail(op))?;
        fs::create_dir_all(root.join(SNAPSHOTS_DIR)).map_err(fail(op))?;
        self.commit(work_dir)
    }

    fn commit(&self, work_dir: &Path) -> Result<SnapshotId> {
        let op = operations::SNAPSHOT_COMMIT;
        let root = store_dir(work_dir);
        if !root.join(OBJECTS_DIR).is_dir() {
            return Err(MemoError::snapshot(
                op,
                format!("{} has no snapshot store (run init)", work_dir.display()),
            ));
        }

        let sequence = Self::head(work_dir, op)?.map(|m| m.sequence + 1).unwrap_or(0);

        let mut files = BTreeMap::new();
        for (relative, path) in Self::tracked_files(work_dir, op)? {
            if let Some(link) = Self::link_record(&path).map_err(fail(op))? {
                files.insert(relative, link);
                continue;
            }
            let data = fs::read(&path).map_err(fail(op))?;
            let mode = file_mode(&fs::metadata(&path).map_err(fail(op))?);
            let hash = hash_bytes(&data, HashAlgorithm::Sha1);
            let object = Self::object_path(work_dir, &hash);
            if !object.exists() {
                fs::write(&object, &data).map_err(fail(op))?;
            }
            files.insert(relative, FileRecord::File { hash, mode });
        }

        let listing = serde_json::to_string(&files)
            .map_err(|e| MemoError::snapshot(op, e.to_string()))?;
        let id = SnapshotId::new(format!(
            "{:08x}{}",
            sequence,
            hash_bytes(listing.as_bytes(), HashAlgorithm::Xxh3)
        ));

        let manifest = Manifest {
            id: id.clone(),
            sequence,
            created_at: Utc::now(),
            files,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| MemoError::snapshot(op, e.to_string()))?;
        fs::write(Self::manifest_path(work_dir, &id), json).map_err(fail(op))?;
        fs::write(root.join(HEAD_FILE), id.as_str()).map_err(fail(op))?;

        Ok(id)
    }

    fn restore(&self, work_dir: &Path, id: &SnapshotId) -> Result<()> {
        let op = operations::SNAPSHOT_RESTORE;
        let manifest = Self::load_manifest(work_dir, op, id)?;

        // Every object must be present before the working tree is touched
        for record in manifest.files.values() {
            let FileRecord::File { hash, .. } = record else {
                continue;
            };
            if !Self::object_path(work_dir, hash).exists() {
                return Err(MemoError::snapshot(
                    op,
                    format!("snapshot {} references missing object {}", id, hash),
                ));
            }
        }

        let current = Self::current_state(work_dir, op)?;

        for relative in current.keys() {
            if !manifest.files.contains_key(relative) {
                let path = join_normalized(work_dir, relative);
                remove_entry(&path).map_err(fail(op))?;
                Self::prune_empty_parents(work_dir, &path);
            }
        }

        for (relative, record) in &manifest.files {
            let existing = current.get(relative);
            if existing == Some(record) {
                continue;
            }
            let path = join_normalized(work_dir, relative);

            // Same content, different permissions: only the mode needs fixing
            if let (
                Some(FileRecord::File { hash: old, .. }),
                FileRecord::File { hash, mode },
            ) = (existing, record)
            {
                if old == hash {
                    set_file_mode(&path, *mode).map_err(fail(op))?;
                    continue;
                }
            }

            remove_entry(&path).map_err(fail(op))?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(fail(op))?;
            }
            match record {
                FileRecord::File { hash, mode } => {
                    fs::copy(Self::object_path(work_dir, hash), &path).map_err(fail(op))?;
                    set_file_mode(&path, *mode).map_err(fail(op))?;
                }
                FileRecord::Symlink { target } => {
                    create_symlink(target, &path).map_err(fail(op))?;
                }
            }
        }

        Ok(())
    }

    fn has_changed_since(&self, work_dir: &Path, id: &SnapshotId) -> Result<bool> {
        let op = operations::CACHE_LOOKUP;
        let manifest = Self::load_manifest(work_dir, op, id)?;
        let current = Self::current_state(work_dir, op)?;
        Ok(current != manifest.files)
    }
}

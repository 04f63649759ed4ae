//! Workspace path helpers
//!
//! Paths recorded in snapshots are relative to the workspace root and always use
//! '/' as separator.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Cache file name (inside the workspace)
pub const CACHE_FILE: &str = ".cache";

/// Session marker written by pipeline stages
pub const SESSION_FILE: &str = ".session";

/// Metadata directory of the native snapshot store
pub const STORE_DIR: &str = ".wsmemo";

/// Top-level names excluded from every snapshot, restore, diff, clean and import
pub const IGNORE_SET: &[&str] = &[".git", ".gitignore", CACHE_FILE, SESSION_FILE, STORE_DIR];

/// Normalize a path to use '/' as separator
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Make a path relative to the root directory
pub fn make_relative(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(normalize_path)
}

/// Join a '/'-separated relative path onto a base directory
pub fn join_normalized(base: &Path, relative: &str) -> PathBuf {
    base.join(relative.replace('/', std::path::MAIN_SEPARATOR_STR))
}

/// Whether a top-level workspace entry belongs to the ignore-set
pub fn is_ignored(name: &OsStr) -> bool {
    name.to_str()
        .map(|n| IGNORE_SET.contains(&n))
        .unwrap_or(false)
}

/// Whether a source entry may be copied into a workspace
///
/// Hidden (`.`) and colon-prefixed names are treated as private to the source
/// directory.
pub fn is_importable(name: &OsStr) -> bool {
    if is_ignored(name) {
        return false;
    }
    match name.to_str() {
        Some(n) => !n.is_empty() && !n.starts_with('.') && !n.starts_with(':'),
        None => true,
    }
}

/// Get the cache file path for a workspace
pub fn cache_file(root: &Path) -> PathBuf {
    root.join(CACHE_FILE)
}

/// Get the native snapshot store directory for a workspace
pub fn store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        let path = Path::new("case/case.struct");
        assert_eq!(normalize_path(path), "case/case.struct");
    }

    #[test]
    fn test_make_relative() {
        let root = Path::new("/work");
        let path = Path::new("/work/case/case.in1");
        assert_eq!(make_relative(path, root), Some("case/case.in1".to_string()));
    }

    #[test]
    fn test_make_relative_not_under_root() {
        let root = Path::new("/work");
        let path = Path::new("/other/file");
        assert_eq!(make_relative(path, root), None);
    }

    #[test]
    fn test_join_normalized() {
        let base = Path::new("/work");
        let result = join_normalized(base, "a/b.txt");
        assert!(result.ends_with("a/b.txt"));
    }

    #[test]
    fn test_ignore_set_membership() {
        assert!(is_ignored(OsStr::new(".git")));
        assert!(is_ignored(OsStr::new(".cache")));
        assert!(is_ignored(OsStr::new(".session")));
        assert!(is_ignored(OsStr::new(".wsmemo")));
        assert!(!is_ignored(OsStr::new("case.struct")));
        assert!(!is_ignored(OsStr::new(".hidden")));
    }

    #[test]
    fn test_is_importable() {
        assert!(is_importable(OsStr::new("case.struct")));
        assert!(!is_importable(OsStr::new(".cache")));
        assert!(!is_importable(OsStr::new(".bashrc")));
        assert!(!is_importable(OsStr::new(":log")));
    }

    #[test]
    fn test_cache_file() {
        let root = Path::new("/work");
        assert_eq!(cache_file(root), PathBuf::from("/work/.cache"));
        assert_eq!(store_dir(root), PathBuf::from("/work/.wsmemo"));
    }
}

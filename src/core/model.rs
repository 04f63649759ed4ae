//! Unified Result Model
//!
//! Every command maps its outcome to this model before rendering output.

use serde::{Deserialize, Serialize};

/// The kind of result item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Run,
    Entry,
    Snapshot,
    Check,
    File,
    Error,
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Replayed from the memoization cache
    Cache,
    /// Produced by executing an external command
    Exec,
    /// Produced by the snapshot backend
    Snapshot,
    /// Workspace filesystem operation
    Fs,
    /// Host environment inspection
    System,
}

/// Metadata for a result item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Size in bytes (captured output or file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Content hash (XXH3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Whether the excerpt was truncated
    #[serde(default)]
    pub truncated: bool,
}

/// Error information for a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl ItemError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The unified result item that all commands produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    /// The kind of this result
    pub kind: Kind,

    /// Path relative to the workspace root, using '/' as separator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Text payload (captured output, messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    /// Structured data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// How this result was obtained
    pub source: Source,

    /// Metadata
    pub meta: Meta,

    /// Errors associated with this result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ItemError>,
}

impl ResultItem {
    fn base(kind: Kind, source: Source) -> Self {
        Self {
            kind,
            path: None,
            excerpt: None,
            data: None,
            source,
            meta: Meta::default(),
            errors: Vec::new(),
        }
    }

    /// Create a run result carrying captured output
    pub fn run(output: impl Into<String>, source: Source) -> Self {
        let output = output.into();
        let mut item = Self::base(Kind::Run, source);
        item.meta.size = Some(output.len() as u64);
        item.excerpt = Some(output);
        item
    }

    /// Create a cache entry result
    pub fn entry(excerpt: impl Into<String>) -> Self {
        let mut item = Self::base(Kind::Entry, Source::Cache);
        item.excerpt = Some(excerpt.into());
        item
    }

    /// Create a snapshot result
    pub fn snapshot(id: impl Into<String>) -> Self {
        let mut item = Self::base(Kind::Snapshot, Source::Snapshot);
        item.excerpt = Some(id.into());
        item
    }

    /// Create a check result (doctor, lookup)
    pub fn check(message: impl Into<String>, source: Source) -> Self {
        let mut item = Self::base(Kind::Check, source);
        item.excerpt = Some(message.into());
        item
    }

    /// Create a file result
    pub fn file(path: impl Into<String>) -> Self {
        let mut item = Self::base(Kind::File, Source::Fs);
        item.path = Some(path.into());
        item
    }

    /// Create an error result
    pub fn error(error: ItemError) -> Self {
        let mut item = Self::base(Kind::Error, Source::System);
        item.errors.push(error);
        item
    }

    /// Set metadata
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Set structured data payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add an error
    pub fn with_error(mut self, error: ItemError) -> Self {
        self.errors.push(error);
        self
    }
}

/// Result set containing multiple result items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub items: Vec<ResultItem>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: ResultItem) {
        self.items.push(item);
    }

    /// Sort path-carrying items by path for stable output
    pub fn sort(&mut self) {
        self.items.sort_by(|a, b| match (&a.path, &b.path) {
            (Some(pa), Some(pb)) => pa.cmp(pb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<ResultItem> for ResultSet {
    fn from_iter<T: IntoIterator<Item = ResultItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

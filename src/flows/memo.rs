//! Memoized command runs
//!
//! A run looks up the workspace's cache for an entry recorded for the same
//! command whose input snapshot equals the current content:
//! - hit: the entry's output snapshot is restored and its output replayed; the
//!   command is not executed
//! - miss: the workspace is committed, the command executed, the result
//!   committed, and a new entry appended
//!
//! Failed executions are never recorded.

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backends::executor::{CommandExecutor, ExecOutcome, ExecRequest, ShellExecutor};
use crate::cache::entry::CacheEntry;
use crate::cache::store::CacheStore;
use crate::core::error::{IoContext, MemoError, Result};
use crate::core::logging::{operations, status};
use crate::core::model::{ItemError, ResultItem, ResultSet, Source};
use crate::core::render::{RenderConfig, Renderer};
use crate::core::util::{hash_bytes, short_id, HashAlgorithm};
use crate::snapshot::{BackendKind, SnapshotBackend, SnapshotId};

/// Separator written before every debug log record
const RECORD_SEPARATOR: &str = "\
================================================================================
================================================================================
================================================================================
===============================================================================-
";

/// How much of the captured output the debug log keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugDetail {
    #[default]
    Full,
    Size,
}

/// Settings for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Whether `run` consults and fills the cache
    pub memoize: bool,

    /// Debug log file; created (truncated) when the runner is built
    pub debug_log: Option<PathBuf>,

    pub debug_detail: DebugDetail,
}

impl RunConfig {
    pub fn memoized() -> Self {
        Self {
            memoize: true,
            ..Self::default()
        }
    }
}

/// Append-only record of every invocation of a run
#[derive(Debug)]
pub struct DebugLog {
    file: File,
    detail: DebugDetail,
}

impl DebugLog {
    /// Open `path` for appending; each invocation starts with a header line
    pub fn create(path: &Path, detail: DebugDetail) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .io_context(|| format!("Failed to open debug log: {}", path.display()))?;
        writeln!(file, "wsmemo debug log {}", Utc::now().to_rfc3339())
            .io_context(|| format!("Failed to write debug log: {}", path.display()))?;
        Ok(Self { file, detail })
    }

    pub fn record(&mut self, command: &str, status: RunStatus, output: &str) -> std::io::Result<()> {
        let mut record = String::with_capacity(RECORD_SEPARATOR.len() + command.len() + 64);
        record.push_str(RECORD_SEPARATOR);
        record.push_str(command);
        record.push('\n');
        record.push_str(&format!("status = {}\n", status.as_str()));
        match self.detail {
            DebugDetail::Full => {
                record.push_str(output);
                record.push('\n');
            }
            DebugDetail::Size => record.push_str(&format!("output size = {}\n", output.len())),
        }
        self.file.write_all(record.as_bytes())?;
        self.file.flush()
    }
}

/// How an invocation was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Replayed from the cache
    Hit,
    /// Executed and recorded
    Miss,
    /// Executed with memoization disabled
    Uncached,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Hit => status::HIT,
            RunStatus::Miss => status::MISS,
            RunStatus::Uncached => status::UNCACHED,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: String,
    pub status: RunStatus,
    pub input_state: Option<SnapshotId>,
    pub output_state: Option<SnapshotId>,
}

/// Runs commands against one workspace, skipping those already recorded
pub struct MemoizedRunner<E: CommandExecutor = ShellExecutor> {
    backend: Box<dyn SnapshotBackend>,
    executor: E,
    memoize: bool,
    debug_log: Option<DebugLog>,
}

impl MemoizedRunner<ShellExecutor> {
    pub fn new(backend: Box<dyn SnapshotBackend>, config: &RunConfig) -> Result<Self> {
        Self::with_executor(backend, ShellExecutor::new(), config)
    }
}

impl<E: CommandExecutor> MemoizedRunner<E> {
    pub fn with_executor(
        backend: Box<dyn SnapshotBackend>,
        executor: E,
        config: &RunConfig,
    ) -> Result<Self> {
        let debug_log = match &config.debug_log {
            Some(path) => Some(DebugLog::create(path, config.debug_detail)?),
            None => None,
        };
        Ok(Self {
            backend,
            executor,
            memoize: config.memoize,
            debug_log,
        })
    }

    #[cfg(test)]
    pub fn backend(&self) -> &dyn SnapshotBackend {
        self.backend.as_ref()
    }

    /// Run with the configured memoization setting
    pub fn run(&mut self, request: &ExecRequest) -> Result<RunOutcome> {
        let memoize = self.memoize;
        self.run_with(request, memoize)
    }

    /// Run, choosing memoization for this call only
    pub fn run_with(&mut self, request: &ExecRequest, memoize: bool) -> Result<RunOutcome> {
        if !memoize {
            let outcome = self.executor.execute(request)?;
            self.record(&request.command, RunStatus::Uncached, &outcome.output);
            let output = Self::check(request, outcome)?;
            return Ok(RunOutcome {
                output,
                status: RunStatus::Uncached,
                input_state: None,
                output_state: None,
            });
        }

        let work_dir = request.work_dir.as_path();
        let mut store = CacheStore::load(work_dir)?;

        if let Some(entry) = self.find_entry(&store, work_dir, &request.command)? {
            info!(
                operation = operations::CACHE_LOOKUP,
                status = status::HIT,
                command = %request.command,
                state = short_id(entry.output_state.as_str()),
                "command found in cache"
            );
            self.backend.restore(work_dir, &entry.output_state)?;
            self.record(&request.command, RunStatus::Hit, &entry.output);
            return Ok(RunOutcome {
                output: entry.output,
                status: RunStatus::Hit,
                input_state: Some(entry.input_state),
                output_state: Some(entry.output_state),
            });
        }

        info!(
            operation = operations::CACHE_LOOKUP,
            status = status::MISS,
            command = %request.command,
            "command not found in cache"
        );

        let input_state = self.backend.commit(work_dir)?;
        let outcome = self.executor.execute(request)?;
        self.record(&request.command, RunStatus::Miss, &outcome.output);
        let output = Self::check(request, outcome)?;
        let output_state = self.backend.commit(work_dir)?;

        store.append(CacheEntry::new(
            request.command.clone(),
            input_state.clone(),
            output_state.clone(),
            output.clone(),
        ))?;

        Ok(RunOutcome {
            output,
            status: RunStatus::Miss,
            input_state: Some(input_state),
            output_state: Some(output_state),
        })
    }

    /// The entry a memoized run of `command` would replay right now.
    /// Touches neither the workspace nor the cache file.
    pub fn lookup(&self, work_dir: &Path, command: &str) -> Result<Option<CacheEntry>> {
        let store = CacheStore::read(work_dir)?;
        self.find_entry(&store, work_dir, command)
    }

    fn find_entry(
        &self,
        store: &CacheStore,
        work_dir: &Path,
        command: &str,
    ) -> Result<Option<CacheEntry>> {
        let backend = self.backend.as_ref();
        let found = store.find_match(command, |id| {
            backend.has_changed_since(work_dir, id).map(|changed| !changed)
        })?;
        Ok(found.cloned())
    }

    fn check(request: &ExecRequest, outcome: ExecOutcome) -> Result<String> {
        if outcome.success() {
            return Ok(outcome.output);
        }
        warn!(
            operation = operations::EXEC_RUN,
            status = status::FAILED,
            command = %request.command,
            exit_code = outcome.exit_code,
            "command failed"
        );
        Err(MemoError::Execution {
            command: request.command.clone(),
            output: outcome.output,
            exit_code: outcome.exit_code,
        })
    }

    fn record(&mut self, command: &str, status: RunStatus, output: &str) {
        if let Some(log) = self.debug_log.as_mut() {
            if let Err(e) = log.record(command, status, output) {
                warn!("failed to write debug log: {}", e);
            }
        }
    }
}

fn run_item(command: &str, outcome: &RunOutcome) -> ResultItem {
    let source = match outcome.status {
        RunStatus::Hit => Source::Cache,
        RunStatus::Miss | RunStatus::Uncached => Source::Exec,
    };
    let mut item = ResultItem::run(outcome.output.clone(), source).with_data(serde_json::json!({
        "command": command,
        "status": outcome.status,
        "input_state": outcome.input_state,
        "output_state": outcome.output_state,
    }));
    item.meta.hash = Some(hash_bytes(outcome.output.as_bytes(), HashAlgorithm::Xxh3));
    item
}

/// Run the 'run' command
pub fn run_run(
    root: &Path,
    backend: BackendKind,
    config: &RunConfig,
    request: ExecRequest,
    render_config: RenderConfig,
) -> anyhow::Result<()> {
    let mut runner = MemoizedRunner::new(backend.open(), config)?;
    let renderer = Renderer::with_config(render_config);

    match runner.run(&request) {
        Ok(outcome) => {
            let result_set: ResultSet = std::iter::once(run_item(&request.command, &outcome)).collect();
            renderer.print(&result_set);
            Ok(())
        }
        Err(e @ MemoError::Execution { .. }) => {
            let item = ResultItem::error(ItemError::new(e.code(), e.to_string()));
            let result_set: ResultSet = std::iter::once(item).collect();
            renderer.print(&result_set);
            Err(e).with_context(|| format!("Command failed in workspace {}", root.display()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Run the 'cache lookup' command
pub fn run_lookup(
    root: &Path,
    backend: BackendKind,
    command: &str,
    render_config: RenderConfig,
) -> anyhow::Result<()> {
    let runner = MemoizedRunner::new(backend.open(), &RunConfig::memoized())?;
    let found = runner.lookup(root, command)?;

    let item = match found {
        Some(entry) => ResultItem::check(format!("hit: {}", command), Source::Cache).with_data(
            serde_json::json!({
                "command": command,
                "status": status::HIT,
                "input_state": entry.input_state,
                "output_state": entry.output_state,
                "output_size": entry.output.len(),
            }),
        ),
        None => ResultItem::check(format!("miss: {}", command), Source::Cache).with_data(
            serde_json::json!({ "command": command, "status": status::MISS }),
        ),
    };

    let result_set: ResultSet = std::iter::once(item).collect();
    Renderer::with_config(render_config).print(&result_set);
    Ok(())
}

//! Command executor - runs one external command and captures its output
//!
//! Two launchers are supported:
//! - Direct: the command runs inline under `sh -c`; stdout and stderr go to one
//!   private temp file which is read back and deleted.
//! - ClusterSubmission: the command is handed to a job-submission wrapper that
//!   waits for the job. The wrapper keeps its own log, so the output is taken
//!   from the newest job-log file in the working directory, cut at the job
//!   footer.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::core::error::{IoContext, MemoError, Result};
use crate::core::logging::operations;

/// Wrapper used when none is configured
pub const DEFAULT_WRAPPER: &str = "run-cluster";

/// Job footer appended by the batch system after the job's own output
pub const DEFAULT_FOOTER_MARKER: &str = "================================= SLURM INFO";

pub const DEFAULT_JOB_LOG_PATTERN: &str = r"^slurm.*\.out$";

static DEFAULT_JOB_LOG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_JOB_LOG_PATTERN).expect("Invalid DEFAULT_JOB_LOG_RE regex"));

/// Cluster submission settings
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Submission wrapper; the command is appended as one quoted argument
    pub wrapper: String,

    /// File names (not paths) of job logs in the working directory
    pub job_log_pattern: Regex,

    /// Output is cut at the first occurrence of this marker
    pub footer_marker: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            wrapper: DEFAULT_WRAPPER.to_string(),
            job_log_pattern: DEFAULT_JOB_LOG_RE.clone(),
            footer_marker: DEFAULT_FOOTER_MARKER.to_string(),
        }
    }
}

/// How a command is launched
#[derive(Debug, Clone, Default)]
pub enum Launcher {
    #[default]
    Direct,
    ClusterSubmission(ClusterConfig),
}

impl Launcher {
    pub fn name(&self) -> &'static str {
        match self {
            Launcher::Direct => "direct",
            Launcher::ClusterSubmission(_) => "cluster",
        }
    }
}

/// One command invocation
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: String,
    pub work_dir: PathBuf,
    /// Overrides layered on top of the inherited environment
    pub environment: Vec<(String, String)>,
    pub launcher: Launcher,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
            environment: Vec::new(),
            launcher: Launcher::Direct,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub output: String,
    /// Process exit status; -1 when terminated by a signal
    pub exit_code: i32,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands, blocking until they finish
pub trait CommandExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Executes commands through `sh -c`
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn shell(request: &ExecRequest, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).current_dir(&request.work_dir);
        for (key, value) in &request.environment {
            cmd.env(key, value);
        }
        cmd
    }

    fn run_direct(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let capture =
            NamedTempFile::new().io_context(|| "Failed to create output capture file")?;
        let stdout = capture
            .as_file()
            .try_clone()
            .io_context(|| "Failed to redirect stdout")?;
        let stderr = capture
            .as_file()
            .try_clone()
            .io_context(|| "Failed to redirect stderr")?;

        let status = Self::shell(request, &request.command)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .io_context(|| format!("Failed to start command: {}", request.command))?;

        let bytes = fs::read(capture.path()).io_context(|| "Failed to read captured output")?;
        capture
            .close()
            .io_context(|| "Failed to remove output capture file")?;

        Ok(ExecOutcome {
            output: String::from_utf8_lossy(&bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        })
    }

    fn run_cluster(&self, request: &ExecRequest, cluster: &ClusterConfig) -> Result<ExecOutcome> {
        let script = format!("{} {}", cluster.wrapper.trim(), shell_quote(&request.command));

        // The wrapper's console chatter must not end up on our stdout
        let status = Self::shell(request, &script)
            .stdout(Stdio::from(std::io::stderr()))
            .status()
            .io_context(|| format!("Failed to start submission wrapper: {}", script))?;

        let log = find_job_log(&request.work_dir, &cluster.job_log_pattern)?.ok_or_else(|| {
            MemoError::MissingJobOutput {
                work_dir: request.work_dir.clone(),
                pattern: cluster.job_log_pattern.as_str().to_string(),
            }
        })?;
        debug!(log = %log.display(), "reading job log");

        let bytes =
            fs::read(&log).io_context(|| format!("Failed to read job log: {}", log.display()))?;
        let text = String::from_utf8_lossy(&bytes);

        Ok(ExecOutcome {
            output: strip_job_footer(&text, &cluster.footer_marker).to_string(),
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        info!(
            operation = operations::EXEC_RUN,
            launcher = request.launcher.name(),
            command = %request.command,
            "executing"
        );

        let outcome = match &request.launcher {
            Launcher::Direct => self.run_direct(request)?,
            Launcher::ClusterSubmission(cluster) => self.run_cluster(request, cluster)?,
        };

        debug!(
            operation = operations::EXEC_RUN,
            exit_code = outcome.exit_code,
            size_bytes = outcome.output.len(),
            "finished"
        );
        Ok(outcome)
    }
}

/// Quote `text` as one single-quoted `sh` word
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// Newest file in `dir` whose name matches `pattern` (ties broken by name)
pub fn find_job_log(dir: &Path, pattern: &Regex) -> Result<Option<PathBuf>> {
    let entries =
        fs::read_dir(dir).io_context(|| format!("Failed to list {}", dir.display()))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.io_context(|| format!("Failed to list {}", dir.display()))?;
        let name = entry.file_name();
        let matched = name.to_str().map(|n| pattern.is_match(n)).unwrap_or(false);
        if !matched || !entry.path().is_file() {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let candidate = (modified, entry.path());
        if newest.as_ref().map(|best| candidate > *best).unwrap_or(true) {
            newest = Some(candidate);
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Cut job-log text at the footer marker, if present
pub fn strip_job_footer<'a>(text: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return text;
    }
    match text.find(marker) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_direct_captures_stdout_and_stderr() {
        let temp = tempdir().unwrap();
        let request = ExecRequest::new("echo out; echo err 1>&2", temp.path());
        let outcome = ShellExecutor::new().execute(&request).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, "out\nerr\n");
    }

    #[test]
    fn test_direct_reports_exit_code() {
        let temp = tempdir().unwrap();
        let request = ExecRequest::new("echo failing; exit 3", temp.path());
        let outcome = ShellExecutor::new().execute(&request).unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.output, "failing\n");
        assert!(!outcome.success());
    }

    #[test]
    fn test_direct_runs_in_work_dir_with_env() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("case.struct"), "Fe").unwrap();
        let request =
            ExecRequest::new("cat case.struct; echo \" $CASE\"", temp.path()).with_env("CASE", "FeSiO4");
        let outcome = ShellExecutor::new().execute(&request).unwrap();
        assert_eq!(outcome.output, "Fe FeSiO4\n");
    }

    #[test]
    fn test_cluster_reads_newest_job_log() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("slurm-1.out"), "old job\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let cluster = ClusterConfig {
            wrapper: "sh -c".to_string(),
            ..ClusterConfig::default()
        };
        let command = format!(
            "echo job output > slurm-2.out; echo '{}' >> slurm-2.out; echo node01 >> slurm-2.out",
            DEFAULT_FOOTER_MARKER
        );
        let request =
            ExecRequest::new(command, root).with_launcher(Launcher::ClusterSubmission(cluster));

        let outcome = ShellExecutor::new().execute(&request).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, "job output\n");
    }

    #[test]
    fn test_cluster_command_reaches_wrapper_verbatim() {
        let temp = tempdir().unwrap();
        let cluster = ClusterConfig {
            wrapper: "sh -c".to_string(),
            ..ClusterConfig::default()
        };
        // Expanded only by the wrapper's shell, never by the outer one
        let command = r#"V=inner; echo "$V" 'it'\''s' `echo tick` > slurm-3.out"#;
        let request =
            ExecRequest::new(command, temp.path()).with_launcher(Launcher::ClusterSubmission(cluster));

        let outcome = ShellExecutor::new().execute(&request).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, "inner it's tick\n");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("x lapw0"), "'x lapw0'");
        assert_eq!(shell_quote(r#"it's "$HOME""#), r#"'it'\''s "$HOME"'"#);
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_cluster_without_job_log_is_missing_output() {
        let temp = tempdir().unwrap();
        let cluster = ClusterConfig {
            wrapper: "sh -c".to_string(),
            ..ClusterConfig::default()
        };
        let request = ExecRequest::new("true", temp.path())
            .with_launcher(Launcher::ClusterSubmission(cluster));

        let err = ShellExecutor::new().execute(&request).unwrap_err();
        assert_eq!(err.code(), "MISSING_JOB_OUTPUT");
    }

    #[test]
    fn test_find_job_log_ignores_non_matching() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("case.output"), "x").unwrap();
        fs::create_dir(temp.path().join("slurm-dir.out")).unwrap();
        let found = find_job_log(temp.path(), &DEFAULT_JOB_LOG_RE).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_strip_job_footer() {
        let text = format!("result\n{}\nJobId=1\n", DEFAULT_FOOTER_MARKER);
        assert_eq!(strip_job_footer(&text, DEFAULT_FOOTER_MARKER), "result\n");
        assert_eq!(strip_job_footer("no footer", DEFAULT_FOOTER_MARKER), "no footer");
        assert_eq!(strip_job_footer("keep", ""), "keep");
    }

    #[test]
    fn test_launcher_names() {
        assert_eq!(Launcher::Direct.name(), "direct");
        assert_eq!(
            Launcher::ClusterSubmission(ClusterConfig::default()).name(),
            "cluster"
        );
    }
}

//! CLI module - Command-line interface definitions and handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

use crate::backends::executor::{ClusterConfig, ExecRequest, Launcher};
use crate::core::render::{OutputFormat, RenderConfig};
use crate::flows::memo::{DebugDetail, RunConfig};
use crate::snapshot::BackendKind;

/// wsmemo - run pipeline commands in a workspace, skipping those already done.
#[derive(Parser, Debug)]
#[command(name = "wsmemo")]
#[command(
    author,
    version,
    about,
    long_about = r#"wsmemo records, for every command run in a workspace, the workspace content
before and after the run together with the command's output. Running the same
command again from identical content restores the recorded result instead of
executing it.

Each command prints a ResultSet in the selected format (default: jsonl).

Output formats:
- jsonl: one JSON object per line
- json: a single JSON array
- md: human-friendly Markdown
- raw: excerpts only (for `run`: the captured output, unchanged)

Examples:
    wsmemo --root work init
    wsmemo --root work import ./inputs
    wsmemo --root work --format raw run -- x lapw0
    wsmemo --root work run --launcher cluster -- x lapw1 -p
    wsmemo --root work cache list
"#
)]
pub struct Cli {
    /// Workspace directory.
    #[arg(
        long,
        global = true,
        default_value = ".",
        value_name = "ROOT",
        long_help = "Workspace directory (defaults to the current directory).\n\n\
Commands run with ROOT as their working directory, and ROOT holds the\n\
cache file (.cache) and the snapshot backend metadata."
    )]
    pub root: PathBuf,

    /// Output format (jsonl/json/md/raw).
    #[arg(
        long,
        global = true,
        default_value = "jsonl",
        value_name = "FORMAT",
        long_help = "Select the output format for ResultSet.\n\n\
Supported values:\n\
- jsonl (default)\n\
- json\n\
- md (markdown)\n\
- raw\n\n\
Tip: use raw with `run` to get exactly the command's output on stdout."
    )]
    pub format: String,

    /// Quiet mode (warnings and errors only).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Only log warnings and errors to stderr. Results are still printed\n\
to stdout."
    )]
    pub quiet: bool,

    /// Verbose mode (more diagnostics).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Enable debug diagnostics on stderr. WSMEMO_LOG overrides both\n\
--quiet and --verbose."
    )]
    pub verbose: bool,

    /// Pretty-print JSON/JSONL output with indentation.
    #[arg(
        long,
        global = true,
        long_help = "Pretty-print JSON and JSONL output with indentation for human readability.\n\n\
Has no effect on md/raw formats."
    )]
    pub pretty: bool,

    /// Snapshot backend (git/store).
    #[arg(
        long,
        global = true,
        default_value = "git",
        env = "WSMEMO_BACKEND",
        value_name = "BACKEND",
        long_help = "Mechanism recording workspace content.\n\n\
Supported values:\n\
- git (default): a git repository inside the workspace\n\
- store: a content-addressed object store under .wsmemo/ (no git needed)\n\n\
A workspace must be used with the backend it was initialized with."
    )]
    pub backend: String,

    /// Write a record of every run invocation to FILE.
    #[arg(
        long,
        global = true,
        env = "WSMEMO_DEBUG_LOG",
        value_name = "FILE",
        long_help = "Append one record per invocation (command, hit/miss, output) to FILE.\n\n\
Each invocation starts with a timestamp header; earlier records are kept."
    )]
    pub debug_log: Option<PathBuf>,

    /// Only log output sizes in the debug log.
    #[arg(long, global = true, requires = "debug_log")]
    pub debug_log_sizes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare the workspace and record the baseline snapshot.
    #[command(
        long_about = "Create ROOT if needed and initialize the snapshot backend, recording the\n\
current content as the baseline. On an initialized workspace this only\n\
reports the latest snapshot.\n\n\
Examples:\n\
  wsmemo --root work init\n\
  wsmemo --root work --backend store init --clean\n"
    )]
    Init {
        /// Remove everything outside the ignore-set first.
        #[arg(long)]
        clean: bool,
    },

    /// Copy input files into the workspace.
    #[command(
        long_about = "Copy every top-level entry of SRC into ROOT (directories recursively).\n\
Entries starting with '.' or ':' and the ignore-set (.git, .gitignore,\n\
.cache, .session, .wsmemo) are skipped.\n\n\
Example:\n\
  wsmemo --root work import ./inputs\n"
    )]
    Import {
        /// Source directory.
        #[arg(value_name = "SRC")]
        src: PathBuf,
    },

    /// Remove everything in the workspace outside the ignore-set.
    Clean,

    /// Run a command, replaying its recorded result when available.
    #[command(long_about = "Run COMMAND in ROOT through `sh -c`.\n\n\
If the cache holds an entry for the same command string whose input snapshot\n\
equals the current workspace content, that entry's output snapshot is restored\n\
and its output printed; the command is not executed. Otherwise the command runs,\n\
and on success the before/after snapshots and output are recorded.\n\n\
A nonzero exit status is reported as an error and nothing is recorded.\n\n\
Examples:\n\
  wsmemo run -- x lapw0\n\
  wsmemo --format raw run -e SCRATCH=/tmp -- x lapw1 -up\n\
  wsmemo run --launcher cluster --wrapper 'run-cluster -N 2' -- x lapw2\n")]
    Run {
        /// Execute without consulting or filling the cache.
        #[arg(long, env = "WSMEMO_NO_CACHE")]
        no_cache: bool,

        /// How to launch the command (direct/cluster).
        #[arg(
            long,
            default_value = "direct",
            env = "WSMEMO_LAUNCHER",
            value_name = "LAUNCHER",
            long_help = "How to launch the command.\n\n\
Supported values:\n\
- direct (default): run inline, capturing stdout and stderr\n\
- cluster: hand the command to a submission wrapper that waits for the job;\n\
  the output is read from the newest job log in ROOT"
        )]
        launcher: String,

        /// Submission wrapper for the cluster launcher.
        #[arg(long, env = "WSMEMO_WRAPPER", value_name = "CMD")]
        wrapper: Option<String>,

        /// Regex matching job log file names (cluster launcher).
        #[arg(long, value_name = "REGEX")]
        job_log_pattern: Option<String>,

        /// Job log is cut at the first occurrence of TEXT (cluster launcher).
        #[arg(long, value_name = "TEXT")]
        job_footer: Option<String>,

        /// Extra environment variable for the command (repeatable).
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// The command line; its words are joined with single spaces.
        #[arg(
            value_name = "COMMAND",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },

    /// Inspect the cache file.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Work with workspace snapshots directly.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommands,
    },

    /// Check external tools.
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List recorded entries, oldest first.
    List,

    /// Report whether a run of COMMAND would be a hit, without running anything.
    #[command(
        long_about = "Report whether `run COMMAND` would replay a recorded entry right now.\n\
Neither the workspace nor the cache file is modified.\n\n\
Example:\n\
  wsmemo cache lookup -- x lapw0\n"
    )]
    Lookup {
        #[arg(
            value_name = "COMMAND",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Record the current workspace content.
    Commit,

    /// Make the workspace content exactly match snapshot ID.
    Restore {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Report whether the workspace differs from snapshot ID.
    Changed {
        #[arg(value_name = "ID")]
        id: String,
    },
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn build_launcher(
    launcher: &str,
    wrapper: Option<String>,
    job_log_pattern: Option<String>,
    job_footer: Option<String>,
) -> Result<Launcher> {
    match launcher.to_lowercase().as_str() {
        "direct" => Ok(Launcher::Direct),
        "cluster" => {
            let mut cluster = ClusterConfig::default();
            if let Some(wrapper) = wrapper {
                cluster.wrapper = wrapper;
            }
            if let Some(pattern) = job_log_pattern {
                cluster.job_log_pattern = Regex::new(&pattern)
                    .with_context(|| format!("Invalid job log pattern: {}", pattern))?;
            }
            if let Some(footer) = job_footer {
                cluster.footer_marker = footer;
            }
            Ok(Launcher::ClusterSubmission(cluster))
        }
        other => anyhow::bail!("Unknown launcher: {} (expected direct or cluster)", other),
    }
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    let format: OutputFormat = cli.format.parse().unwrap_or_default();
    let render_config = RenderConfig::with_pretty(format, cli.pretty);
    let backend: BackendKind = cli.backend.parse().map_err(anyhow::Error::msg)?;

    // Get absolute root path
    let root = cli.root.canonicalize().unwrap_or(cli.root);

    match cli.command {
        Commands::Init { clean } => {
            crate::flows::workspace::run_init(&root, backend, clean, render_config)
        }

        Commands::Import { src } => crate::flows::workspace::run_import(&root, &src, render_config),

        Commands::Clean => crate::flows::workspace::run_clean(&root, render_config),

        Commands::Run {
            no_cache,
            launcher,
            wrapper,
            job_log_pattern,
            job_footer,
            env,
            command,
        } => {
            let launcher = build_launcher(&launcher, wrapper, job_log_pattern, job_footer)?;
            let mut request = ExecRequest::new(command.join(" "), &root).with_launcher(launcher);
            for (key, value) in env {
                request = request.with_env(key, value);
            }

            let config = RunConfig {
                memoize: !no_cache,
                debug_log: cli.debug_log,
                debug_detail: if cli.debug_log_sizes {
                    DebugDetail::Size
                } else {
                    DebugDetail::Full
                },
            };
            crate::flows::memo::run_run(&root, backend, &config, request, render_config)
        }

        Commands::Cache { action } => match action {
            CacheCommands::List => crate::cache::store::run_cache_list(&root, render_config),
            CacheCommands::Lookup { command } => {
                crate::flows::memo::run_lookup(&root, backend, &command.join(" "), render_config)
            }
        },

        Commands::Snapshot { action } => match action {
            SnapshotCommands::Commit => crate::snapshot::run_commit(&root, backend, render_config),
            SnapshotCommands::Restore { id } => {
                crate::snapshot::run_restore(&root, backend, &id, render_config)
            }
            SnapshotCommands::Changed { id } => {
                crate::snapshot::run_changed(&root, backend, &id, render_config)
            }
        },

        Commands::Doctor => crate::backends::doctor::run_doctor(backend, render_config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("SCRATCH=/tmp/a=b").unwrap(),
            ("SCRATCH".to_string(), "/tmp/a=b".to_string())
        );
        assert_eq!(
            parse_env_pair("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_env_pair("NOEQUALS").is_err());
        assert!(parse_env_pair("=value").is_err());
    }

    #[test]
    fn test_build_launcher() {
        assert!(matches!(
            build_launcher("direct", None, None, None).unwrap(),
            Launcher::Direct
        ));

        let launcher = build_launcher(
            "cluster",
            Some("run-cluster -N 2".to_string()),
            Some(r"^job-\d+\.log$".to_string()),
            Some("--- END".to_string()),
        )
        .unwrap();
        match launcher {
            Launcher::ClusterSubmission(cluster) => {
                assert_eq!(cluster.wrapper, "run-cluster -N 2");
                assert!(cluster.job_log_pattern.is_match("job-17.log"));
                assert_eq!(cluster.footer_marker, "--- END");
            }
            Launcher::Direct => panic!("expected cluster launcher"),
        }

        assert!(build_launcher("cluster", None, Some("(".to_string()), None).is_err());
        assert!(build_launcher("pbs", None, None, None).is_err());
    }

    #[test]
    fn test_cli_parses_run_after_separator() {
        let cli = Cli::try_parse_from([
            "wsmemo", "--root", "work", "run", "-e", "A=1", "--", "x", "lapw1", "-up",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { command, env, .. } => {
                assert_eq!(command, vec!["x", "lapw1", "-up"]);
                assert_eq!(env, vec![("A".to_string(), "1".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

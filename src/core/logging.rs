//! Diagnostic logging
//!
//! All diagnostics go to stderr through `tracing`, so stdout stays reserved for
//! rendered results. Events carry an `operation` field (`cache.lookup`,
//! `snapshot.commit`, `exec.run`, ...) and, where meaningful, a `status`
//! (`hit`, `miss`, `uncached`, `failed`).
//!
//! # Environment Variables
//!
//! - `WSMEMO_LOG`: filter directive (e.g. "debug", "wsmemo=trace"); overrides
//!   `--quiet` / `--verbose`.

use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "WSMEMO_LOG";

/// Pick the default filter directive for the CLI verbosity flags
pub fn default_directive(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Initialize the global tracing subscriber
pub fn init(quiet: bool, verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbose)));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(io::stderr),
        )
        .try_init();
}

/// Operation names for consistent logging
pub mod operations {
    pub const CACHE_LOAD: &str = "cache.load";
    pub const CACHE_SAVE: &str = "cache.save";
    pub const CACHE_LOOKUP: &str = "cache.lookup";
    pub const SNAPSHOT_INIT: &str = "snapshot.init";
    pub const SNAPSHOT_COMMIT: &str = "snapshot.commit";
    pub const SNAPSHOT_RESTORE: &str = "snapshot.restore";
    pub const EXEC_RUN: &str = "exec.run";
}

/// Status values for consistent logging
pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const UNCACHED: &str = "uncached";
    pub const FAILED: &str = "failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true, true), "warn");
        assert_eq!(default_directive(false, true), "debug");
        assert_eq!(default_directive(false, false), "info");
    }
}

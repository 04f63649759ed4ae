//! Flows module - Operations combining snapshots, the cache and execution
//!
//! Provides:
//! - memo: The memoized runner (hit/miss/uncached runs, lookups, debug log)
//! - workspace: Preparing, cleaning and importing into a workspace

pub mod memo;
pub mod workspace;

//! Cache module - Memoization records of a workspace
//!
//! Provides:
//! - CacheEntry: command + input/output snapshot + captured output
//! - CacheStore: the ordered, persisted list of entries (`.cache`)

pub mod entry;
pub mod store;

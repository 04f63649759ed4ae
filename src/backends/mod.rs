//! Backends module - External processes
//!
//! Provides:
//! - executor: Running commands inline or through a cluster submission wrapper
//! - doctor: External tool checks

pub mod doctor;
pub mod executor;

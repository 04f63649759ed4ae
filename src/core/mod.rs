//! Core module - fundamental data structures and utilities
//!
//! This module provides:
//! - Error types shared by every layer
//! - Unified result model (ResultItem) and rendering
//! - Workspace paths and the ignore-set
//! - Logging setup
//! - Common utilities

pub mod error;
pub mod logging;
pub mod model;
pub mod paths;
pub mod render;
pub mod util;

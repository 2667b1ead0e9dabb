//! Test utilities shared across test modules
//!
//! This module provides common helper functions for testing, avoiding duplication
//! across multiple test suites.

use crate::paths::Paths;
use crate::store::Store;
use tempfile::TempDir;

/// Create a Paths struct for testing using a temporary directory as home
///
/// Nothing is created on disk; the layout mirrors the real ~/.skills-hub,
/// ~/.claude, ~/.codex and ~/.gemini directories inside the temp dir.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths::from_home(&temp_dir.path().join("home"))
}

/// Open a fresh in-memory store with the schema applied
pub fn memory_store() -> Store {
    Store::open_in_memory().unwrap()
}

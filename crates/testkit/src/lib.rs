#![warn(missing_docs)]
//! Testing surfaces: a scriptable mock relay and helpers for reading the
//! JSONL event logs written by headless runs.

mod mock_relay;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub use mock_relay::*;

/// Read back a newline-delimited JSON file, skipping blank lines.
pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<serde_json::Value>> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("invalid JSONL line"))
        .collect()
}

//! CLI command implementations

pub mod extract;
pub mod inspect;
pub mod predict;
pub mod signals;
pub mod train;

use anyhow::{Context, Result};
use std::path::Path;

/// Read an RTL source file
fn read_rtl(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read RTL file {}", path.display()))
}

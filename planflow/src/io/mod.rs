//! Side-effecting operations: subprocesses, files, the console.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod agent;
pub mod approval;
pub mod config;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod run_log;

/// Replace `path` with `contents` via a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

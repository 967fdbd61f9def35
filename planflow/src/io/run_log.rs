//! Per-run artifacts under `.planflow/runs/<run-id>/`.
//!
//! Each run keeps the captured output of every agent invocation plus a final
//! `report.json`. These files are product output and are written regardless
//! of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub plan_log: PathBuf,
    pub execute_log: PathBuf,
    /// Execution-phase stdout, teed as it arrives while the agent runs.
    pub execute_stream: PathBuf,
    pub persist_log: PathBuf,
    pub report_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_root: &Path, run_id: &str) -> Self {
        let dir = runs_root.join(run_id);
        Self {
            plan_log: dir.join("plan.log"),
            execute_log: dir.join("execute.log"),
            execute_stream: dir.join("execute.jsonl"),
            persist_log: dir.join("persist.log"),
            report_path: dir.join("report.json"),
            dir,
        }
    }
}

/// Timestamped run id (`run-YYYYmmdd_HHMMSS`), suffixed when a run directory
/// with that name already exists under `runs_root`.
pub fn generate_run_id(runs_root: &Path) -> Result<String> {
    let base = format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S"));
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !runs_root.join(&id).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to generate unique run id from base '{base}' (too many existing runs)"
    ))
}

/// Current UTC time as RFC 3339, used for report timestamps.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Write `report` as pretty JSON to `paths.report_path`.
pub fn write_report<T: Serialize>(paths: &RunPaths, report: &T) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;
    let mut payload = serde_json::to_string_pretty(report).context("serialize report")?;
    payload.push('\n');
    debug!(path = %paths.report_path.display(), "writing run report");
    fs::write(&paths.report_path, payload)
        .with_context(|| format!("write {}", paths.report_path.display()))
}

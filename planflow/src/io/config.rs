//! Workflow configuration stored under `.planflow/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".planflow/config.toml";

/// Workflow configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that drive a stock `opencode` install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanflowConfig {
    /// Approve every plan without asking.
    pub auto_approve: bool,

    /// Plan snapshot file, relative to the working directory unless absolute.
    /// Overwritten by every planning phase.
    pub plan_snapshot: PathBuf,

    /// Directory holding per-run logs and reports, relative to the working directory
    /// unless absolute.
    pub runs_dir: PathBuf,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable (looked up on `PATH` unless it contains a separator).
    pub binary: String,

    /// Agent used for the planning phase (`--agent <plan_agent>`).
    pub plan_agent: String,

    /// Agent used for the execution phase (`--agent <build_agent>`).
    pub build_agent: String,

    /// Optional `--model` passed to every `run` invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-invocation wall-clock limit; the agent is killed once exceeded.
    pub timeout_secs: u64,

    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "opencode".to_string(),
            plan_agent: "plan".to_string(),
            build_agent: "build".to_string(),
            model: None,
            timeout_secs: 30 * 60,
            output_limit_bytes: 10_000_000,
        }
    }
}

impl Default for PlanflowConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            plan_snapshot: PathBuf::from(".planflow/plan.json"),
            runs_dir: PathBuf::from(".planflow/runs"),
            agent: AgentConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PlanflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.binary.trim().is_empty() {
            return Err(anyhow!("agent.binary must be non-empty"));
        }
        if self.agent.plan_agent.trim().is_empty() {
            return Err(anyhow!("agent.plan_agent must be non-empty"));
        }
        if self.agent.build_agent.trim().is_empty() {
            return Err(anyhow!("agent.build_agent must be non-empty"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.plan_snapshot.as_os_str().is_empty() {
            return Err(anyhow!("plan_snapshot must be non-empty"));
        }
        Ok(())
    }

    pub fn plan_snapshot_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.plan_snapshot)
    }

    pub fn runs_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.runs_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlanflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlanflowConfig> {
    if !path.exists() {
        let cfg = PlanflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlanflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlanflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

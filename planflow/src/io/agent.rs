//! Agent invocation abstraction.
//!
//! The [`AgentRunner`] trait decouples workflow orchestration from the actual
//! agent backend (an `opencode`-compatible CLI). Tests use scripted runners
//! that return predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::{CommandOutput, run_command};

const JSON_FORMAT: [&str; 2] = ["--format", "json"];

/// What to ask the agent binary to do. Both commands request JSON output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// `run --agent <agent> --format json [--model <model>] <prompt>`
    Run { agent: String, prompt: String },
    /// `session list --format json`
    SessionList,
}

impl AgentCommand {
    pub fn run(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        AgentCommand::Run {
            agent: agent.into(),
            prompt: prompt.into(),
        }
    }
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    pub command: AgentCommand,
    /// Maximum time to wait before the agent is killed.
    pub timeout: Duration,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Where to write the captured stdout/stderr after the agent exits.
    pub log_path: Option<PathBuf>,
    /// When `Some`, stdout lines are appended here while the agent runs.
    pub stream_path: Option<PathBuf>,
}

/// Exit status and captured output of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    /// `None` when the process was killed by a signal (including on timeout).
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl AgentOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Human-readable reason this invocation counts as a failure.
    pub fn failure_diagnostic(&self, timeout: Duration) -> String {
        if self.timed_out {
            return format!("agent timed out after {}s", timeout.as_secs());
        }
        let stderr = strip_ansi(&String::from_utf8_lossy(&self.stderr));
        let stderr = stderr.trim();
        let code = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        if stderr.is_empty() {
            format!("{code} (no stderr)")
        } else {
            format!("{code}: {stderr}")
        }
    }
}

impl From<CommandOutput> for AgentOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
        }
    }
}

/// Abstraction over agent execution backends.
pub trait AgentRunner {
    /// Run the agent to completion (or timeout). A non-zero exit is reported
    /// through [`AgentOutput`]; `Err` means the agent could not be run at all.
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput>;
}

/// Runner that spawns an `opencode`-compatible CLI.
#[derive(Debug, Clone)]
pub struct CliAgent {
    binary: String,
    model: Option<String>,
}

impl CliAgent {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            model: config.model.clone(),
        }
    }

    /// Argument vector (excluding the binary) for `command`.
    pub fn args(&self, command: &AgentCommand) -> Vec<String> {
        let mut args = Vec::new();
        match command {
            AgentCommand::Run { agent, prompt } => {
                args.extend(["run".to_string(), "--agent".to_string(), agent.clone()]);
                args.extend(JSON_FORMAT.map(str::to_string));
                if let Some(model) = &self.model {
                    args.extend(["--model".to_string(), model.clone()]);
                }
                args.push(prompt.clone());
            }
            AgentCommand::SessionList => {
                args.extend(["session".to_string(), "list".to_string()]);
                args.extend(JSON_FORMAT.map(str::to_string));
            }
        }
        args
    }
}

impl AgentRunner for CliAgent {
    #[instrument(skip_all, fields(binary = %self.binary, timeout_secs = request.timeout.as_secs(), streaming = request.stream_path.is_some()))]
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput> {
        info!(workdir = %request.workdir.display(), "starting agent");

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(&request.command))
            .current_dir(&request.workdir);

        let output = run_command(
            cmd,
            request.timeout,
            request.output_limit_bytes,
            request.stream_path.as_deref(),
        )
        .with_context(|| format!("run {}", self.binary))?;

        if let Some(log_path) = &request.log_path {
            write_agent_log(log_path, &output, request.output_limit_bytes)?;
        }

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
        } else {
            debug!("agent completed successfully");
        }
        Ok(output.into())
    }
}

/// Remove terminal color/cursor escape sequences from agent diagnostics.
pub fn strip_ansi(text: &str) -> String {
    static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ansi pattern should be valid")
    });
    ANSI_RE.replace_all(text, "").into_owned()
}

fn write_agent_log(path: &Path, output: &CommandOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("agent"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("agent"));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }

    if buf.len() > output_limit {
        let mut cut = output_limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut);
        fs::write(path, truncated).with_context(|| format!("write agent log {}", path.display()))?;
        return Ok(());
    }

    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}

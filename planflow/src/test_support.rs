//! Test-only helpers: scripted agents, scripted approval, scratch workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::approval::ApprovalPrompt;
use crate::io::agent::{AgentOutput, AgentRequest, AgentRunner};
use crate::io::config::PlanflowConfig;
use crate::workflow::WorkflowContext;

/// What a [`ScriptedAgent`] does for one invocation.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Output(AgentOutput),
    /// The invocation itself fails (e.g. the binary cannot be spawned).
    Error(String),
}

/// Successful invocation printing `stdout`.
pub fn ok(stdout: &str) -> ScriptedResponse {
    ScriptedResponse::Output(AgentOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        timed_out: false,
    })
}

/// Invocation exiting with `code` and `stderr`.
pub fn exit(code: i32, stderr: &str) -> ScriptedResponse {
    ScriptedResponse::Output(AgentOutput {
        exit_code: Some(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        timed_out: false,
    })
}

/// Invocation killed after exceeding its timeout.
pub fn timeout() -> ScriptedResponse {
    ScriptedResponse::Output(AgentOutput {
        exit_code: None,
        stdout: Vec::new(),
        stderr: Vec::new(),
        timed_out: true,
    })
}

/// Invocation whose binary could not be started.
pub fn spawn_error() -> ScriptedResponse {
    ScriptedResponse::Error("spawn command: No such file or directory (os error 2)".to_string())
}

/// Agent runner that replays queued responses in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    responses: RefCell<VecDeque<ScriptedResponse>>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl AgentRunner for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted agent has no response left")),
        }
    }
}

/// Approval prompt answering every question with a fixed line.
#[derive(Debug, Default)]
pub struct ScriptedApproval {
    input: Option<String>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedApproval {
    pub fn new(input: &str) -> Self {
        Self {
            input: Some(input.to_string()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// A prompt whose input source is broken.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Review texts shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn times_asked(&self) -> usize {
        self.asked.borrow().len()
    }
}

impl ApprovalPrompt for ScriptedApproval {
    fn ask(&self, review: &str) -> Result<String> {
        self.asked.borrow_mut().push(review.to_string());
        self.input
            .clone()
            .ok_or_else(|| anyhow!("approval input unavailable"))
    }
}

/// Render `events` as NDJSON (one compact object per line).
pub fn ndjson(events: &[Value]) -> String {
    let mut out = String::new();
    for event in events {
        out.push_str(&event.to_string());
        out.push('\n');
    }
    out
}

/// Scratch working directory for a workflow run.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Context with default config and a fixed run id.
    pub fn context(&self, auto_approve: bool) -> WorkflowContext {
        WorkflowContext {
            workdir: self.path().to_path_buf(),
            config: PlanflowConfig {
                auto_approve,
                ..PlanflowConfig::default()
            },
            run_id: "run-test".to_string(),
        }
    }
}

//! Session persistence probe.
//!
//! After execution the agent's session store is queried through
//! `session list --format json`. The probe only checks that the store is
//! reachable and reports how much it holds; session contents stay opaque.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::io::agent::{AgentCommand, AgentRequest, AgentRunner};
use crate::io::config::AgentConfig;

/// Shape of a successful session listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeContent {
    /// A JSON array with this many entries.
    Sessions(usize),
    /// Valid JSON that is not an array.
    NotAList,
    /// Output that is not JSON at all.
    Unstructured,
}

impl ProbeContent {
    pub fn diagnostic(self) -> String {
        match self {
            ProbeContent::Sessions(n) => format!("{n} sessions"),
            ProbeContent::NotAList => "content not a list".to_string(),
            ProbeContent::Unstructured => "content not structured".to_string(),
        }
    }
}

pub fn classify_session_listing(stdout: &str) -> ProbeContent {
    match serde_json::from_str::<Value>(stdout.trim()) {
        Ok(Value::Array(items)) => ProbeContent::Sessions(items.len()),
        Ok(_) => ProbeContent::NotAList,
        Err(_) => ProbeContent::Unstructured,
    }
}

/// Result of one probe: `Ok` carries the content shape, `Err` a failure diagnostic.
pub type ProbeResult = std::result::Result<ProbeContent, String>;

/// Query the session store. Only an I/O failure around the agent (spawn,
/// log write) is returned as `Err`; a non-zero exit or timeout is a failed probe.
pub fn run_probe<A: AgentRunner + ?Sized>(
    agent: &A,
    config: &AgentConfig,
    workdir: &Path,
    log_path: Option<&Path>,
) -> Result<ProbeResult> {
    let output = agent.invoke(&AgentRequest {
        workdir: workdir.to_path_buf(),
        command: AgentCommand::SessionList,
        timeout: config.timeout(),
        output_limit_bytes: config.output_limit_bytes,
        log_path: log_path.map(Path::to_path_buf),
        stream_path: None,
    })?;

    if !output.success() {
        let diagnostic = output.failure_diagnostic(config.timeout());
        warn!(%diagnostic, "session list failed");
        return Ok(Err(diagnostic));
    }
    let content = classify_session_listing(&output.stdout_text());
    debug!(?content, "session list classified");
    Ok(Ok(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_listings() {
        assert_eq!(
            classify_session_listing(r#"[{"id": "a"}, {"id": "b"}]"#),
            ProbeContent::Sessions(2)
        );
        assert_eq!(classify_session_listing("[]\n"), ProbeContent::Sessions(0));
        assert_eq!(
            classify_session_listing(r#"{"sessions": []}"#),
            ProbeContent::NotAList
        );
        assert_eq!(
            classify_session_listing("Session  Title\nabc  hello"),
            ProbeContent::Unstructured
        );
        assert_eq!(classify_session_listing(""), ProbeContent::Unstructured);
    }

    #[test]
    fn diagnostics_read_naturally() {
        assert_eq!(ProbeContent::Sessions(3).diagnostic(), "3 sessions");
        assert_eq!(ProbeContent::NotAList.diagnostic(), "content not a list");
        assert_eq!(
            ProbeContent::Unstructured.diagnostic(),
            "content not structured"
        );
    }
}

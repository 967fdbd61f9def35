//! Investigation tests for the `opencode run --format json` event stream and
//! `opencode session list --format json`.
//!
//! # Prerequisites
//!
//! - `opencode` installed and on `PATH`
//! - A provider configured with valid credentials
//!
//! # Running
//!
//! ```bash
//! cargo test --test investigation opencode_cli_available -- --ignored
//! ```

use std::process::Command;
use std::time::Duration;

use planflow::core::event::Event;
use planflow::core::plan::PlanAccumulator;
use planflow::core::stream::EventStream;
use planflow::io::agent::{AgentCommand, AgentRequest, AgentRunner, CliAgent};
use planflow::io::config::AgentConfig;
use planflow::probe::run_probe;
use tempfile::tempdir;

/// Generous timeout for real model calls.
const OPENCODE_TIMEOUT: Duration = Duration::from_secs(180);

fn request(workdir: &std::path::Path, command: AgentCommand) -> AgentRequest {
    AgentRequest {
        workdir: workdir.to_path_buf(),
        command,
        timeout: OPENCODE_TIMEOUT,
        output_limit_bytes: 10_000_000,
        log_path: None,
        stream_path: None,
    }
}

/// Verifies that the opencode CLI is available in PATH.
#[test]
#[ignore]
fn opencode_cli_available() {
    let output = Command::new("opencode")
        .arg("--version")
        .output()
        .expect("opencode not in PATH");
    assert!(
        output.status.success(),
        "opencode --version failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    println!(
        "opencode version: {}",
        String::from_utf8_lossy(&output.stdout).trim()
    );
}

/// Every stdout line of a planning run decodes to an object event, and at
/// least one `text` event carries narrative.
#[test]
#[ignore]
fn plan_agent_emits_decodable_ndjson() {
    let tmp = tempdir().expect("tempdir");
    let agent = CliAgent::new(&AgentConfig::default());
    let output = agent
        .invoke(&request(
            tmp.path(),
            AgentCommand::run("plan", "Describe in two steps how to add two numbers in Rust."),
        ))
        .expect("invoke opencode");
    assert!(
        output.success(),
        "{}",
        output.failure_diagnostic(OPENCODE_TIMEOUT)
    );

    let mut stream = EventStream::new(output.stdout.as_slice());
    let mut acc = PlanAccumulator::new("investigation");
    let mut kinds = Vec::new();
    for event in stream.by_ref() {
        kinds.push(event.kind().to_string());
        acc.push(event);
    }
    let plan = acc.finish(stream.faults().len());

    println!("event kinds: {kinds:?}");
    println!("token usage: {:?}", plan.token_usage);
    assert!(stream.faults().is_empty(), "faults: {:?}", stream.faults());
    assert!(plan.events.iter().any(|e| matches!(e, Event::Text { .. })));
    assert!(!plan.narrative_text.trim().is_empty());
}

/// `session list --format json` returns a JSON array.
#[test]
#[ignore]
fn session_list_is_a_json_array() {
    let tmp = tempdir().expect("tempdir");
    let config = AgentConfig::default();
    let agent = CliAgent::new(&config);
    let result = run_probe(&agent, &config, tmp.path(), None).expect("probe");
    let content = result.expect("session list succeeded");
    println!("probe: {}", content.diagnostic());
    assert!(content.diagnostic().ends_with("sessions"));
}

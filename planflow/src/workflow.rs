//! Plan → Approve → Execute → Verify-Persistence orchestration.
//!
//! Phases run strictly in sequence on the calling thread. Every phase ends in
//! exactly one [`PhaseOutcome`]; a failure (or a rejected plan) marks all later
//! phases skipped and aborts the run. Errors never escape: they are rendered
//! with their full context chain into the failed phase's diagnostic, and the
//! caller always receives a [`WorkflowReport`].

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::approval::{ApprovalGate, ApprovalPrompt};
use crate::core::event::Event;
use crate::core::phase::{
    AbortReason, Phase, PhaseLedger, PhaseOutcome, PhaseStatus, WorkflowState,
};
use crate::core::plan::{Plan, PlanAccumulator};
use crate::core::stream::EventStream;
use crate::exit_codes;
use crate::io::agent::{AgentCommand, AgentRequest, AgentRunner};
use crate::io::config::PlanflowConfig;
use crate::io::plan_store::{load_plan_snapshot, write_plan_snapshot};
use crate::io::prompt::render_execute_prompt;
use crate::io::run_log::{RunPaths, generate_run_id, timestamp, write_report};
use crate::probe::run_probe;

/// Where and how a run executes.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Working directory handed to the agent; relative config paths resolve here.
    pub workdir: PathBuf,
    pub config: PlanflowConfig,
    pub run_id: String,
}

impl WorkflowContext {
    /// Build a context with a fresh run id.
    pub fn new(workdir: PathBuf, config: PlanflowConfig) -> Result<Self> {
        config.validate()?;
        let run_id = generate_run_id(&config.runs_path(&workdir))?;
        Ok(Self {
            workdir,
            config,
            run_id,
        })
    }

    pub fn run_paths(&self) -> RunPaths {
        RunPaths::new(&self.config.runs_path(&self.workdir), &self.run_id)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.config.plan_snapshot_path(&self.workdir)
    }

    fn agent_request(
        &self,
        command: AgentCommand,
        log_path: &Path,
        stream_path: Option<&Path>,
    ) -> AgentRequest {
        AgentRequest {
            workdir: self.workdir.clone(),
            command,
            timeout: self.config.agent.timeout(),
            output_limit_bytes: self.config.agent.output_limit_bytes,
            log_path: Some(log_path.to_path_buf()),
            stream_path: stream_path.map(Path::to_path_buf),
        }
    }
}

/// Observer notifications emitted while a run progresses.
#[derive(Debug)]
pub enum Progress<'a> {
    PhaseStarted(Phase),
    /// A decoded event from the plan or execute agent, in arrival order.
    AgentEvent { phase: Phase, event: &'a Event },
    /// The plan is complete and, for fresh plans, snapshotted.
    PlanReady {
        plan: &'a Plan,
        snapshot_path: &'a Path,
    },
    PhaseFinished(&'a PhaseOutcome),
}

/// Final record of one run (also written to `report.json`).
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub run_id: String,
    pub task: String,
    pub phases: Vec<PhaseOutcome>,
    pub final_state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    pub started_at: String,
    pub finished_at: String,
    /// The plan, when the plan phase produced one.
    #[serde(skip)]
    pub plan: Option<Plan>,
}

impl WorkflowReport {
    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|o| o.phase == phase)
    }

    pub fn statuses(&self) -> Vec<(Phase, PhaseStatus)> {
        self.phases.iter().map(|o| (o.phase, o.status)).collect()
    }

    /// One line per phase, e.g. `execute: failed (exit code 1: boom)`.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.phases.len());
        for outcome in &self.phases {
            match &outcome.diagnostic {
                Some(diagnostic) => lines.push(format!(
                    "{}: {} ({diagnostic})",
                    outcome.phase, outcome.status
                )),
                None => lines.push(format!("{}: {}", outcome.phase, outcome.status)),
            }
        }
        lines.join("\n")
    }

    pub fn exit_code(&self) -> i32 {
        match (self.final_state, self.abort_reason) {
            (WorkflowState::Done, _) => exit_codes::OK,
            (_, Some(AbortReason::Rejected)) => exit_codes::REJECTED,
            _ => exit_codes::FAILED,
        }
    }
}

/// Full run: plan `task`, ask for approval, execute, probe the session store.
pub fn run_workflow<A, P, F>(
    ctx: &WorkflowContext,
    task: &str,
    agent: &A,
    prompt: &P,
    mut on_progress: F,
) -> WorkflowReport
where
    A: AgentRunner + ?Sized,
    P: ApprovalPrompt + ?Sized,
    F: FnMut(Progress<'_>),
{
    let mut tally = Tally::new(ctx, task, &mut on_progress);

    tally.begin(Phase::Plan);
    let plan = match plan_phase(ctx, task, agent, tally.observer()) {
        Ok(plan) => plan,
        Err(err) => {
            tally.finish(PhaseOutcome::failed(Phase::Plan, format!("{err:#}")));
            return tally.abort(AbortReason::PhaseFailed { phase: Phase::Plan });
        }
    };
    let snapshot_path = ctx.snapshot_path();
    (tally.observer())(Progress::PlanReady {
        plan: &plan,
        snapshot_path: &snapshot_path,
    });
    tally.finish(PhaseOutcome::succeeded(Phase::Plan, Some(plan_summary(&plan))));

    approve_execute_persist(ctx, plan, agent, prompt, tally)
}

/// Approve, execute and probe a previously stored plan snapshot.
pub fn execute_saved_plan<A, P, F>(
    ctx: &WorkflowContext,
    snapshot_path: &Path,
    agent: &A,
    prompt: &P,
    mut on_progress: F,
) -> WorkflowReport
where
    A: AgentRunner + ?Sized,
    P: ApprovalPrompt + ?Sized,
    F: FnMut(Progress<'_>),
{
    let mut tally = Tally::new(ctx, "", &mut on_progress);

    tally.begin(Phase::Plan);
    let plan = match load_plan_snapshot(snapshot_path) {
        Ok(plan) => plan,
        Err(err) => {
            tally.finish(PhaseOutcome::failed(Phase::Plan, format!("{err:#}")));
            return tally.abort(AbortReason::PhaseFailed { phase: Phase::Plan });
        }
    };
    tally.task = plan.task.clone();
    (tally.observer())(Progress::PlanReady {
        plan: &plan,
        snapshot_path,
    });
    tally.finish(PhaseOutcome::succeeded(
        Phase::Plan,
        Some(format!("loaded from {}", snapshot_path.display())),
    ));

    approve_execute_persist(ctx, plan, agent, prompt, tally)
}

/// Diagnostic on the phases `run_plan_only` leaves out.
pub const PLAN_ONLY_NOTE: &str = "plan-only run";

/// Plan phase only. Later phases are recorded as skipped with
/// [`PLAN_ONLY_NOTE`] and the run ends `Done` when the plan was produced.
pub fn run_plan_only<A, F>(
    ctx: &WorkflowContext,
    task: &str,
    agent: &A,
    mut on_progress: F,
) -> WorkflowReport
where
    A: AgentRunner + ?Sized,
    F: FnMut(Progress<'_>),
{
    let mut tally = Tally::new(ctx, task, &mut on_progress);

    tally.begin(Phase::Plan);
    let plan = match plan_phase(ctx, task, agent, tally.observer()) {
        Ok(plan) => plan,
        Err(err) => {
            tally.finish(PhaseOutcome::failed(Phase::Plan, format!("{err:#}")));
            return tally.abort(AbortReason::PhaseFailed { phase: Phase::Plan });
        }
    };
    let snapshot_path = ctx.snapshot_path();
    (tally.observer())(Progress::PlanReady {
        plan: &plan,
        snapshot_path: &snapshot_path,
    });
    tally.finish(PhaseOutcome::succeeded(Phase::Plan, Some(plan_summary(&plan))));
    tally.plan = Some(plan);
    tally.skip_remaining_noted(PLAN_ONLY_NOTE);
    tally.done()
}

fn approve_execute_persist<A, P, F>(
    ctx: &WorkflowContext,
    plan: Plan,
    agent: &A,
    prompt: &P,
    mut tally: Tally<'_, F>,
) -> WorkflowReport
where
    A: AgentRunner + ?Sized,
    P: ApprovalPrompt + ?Sized,
    F: FnMut(Progress<'_>),
{
    tally.begin(Phase::Approve);
    let gate = ApprovalGate::new(ctx.config.auto_approve);
    let decision = gate
        .decide(&plan, prompt)
        .map(|decision| (decision.approved, decision.input));
    let approved = match decision {
        Ok((true, _)) => {
            let diagnostic = gate.auto_approve().then(|| "auto-approved".to_string());
            tally.finish(PhaseOutcome::succeeded(Phase::Approve, diagnostic));
            true
        }
        Ok((false, input)) => {
            info!(?input, "plan rejected");
            tally.finish(PhaseOutcome::failed(Phase::Approve, "plan rejected"));
            false
        }
        Err(err) => {
            tally.finish(PhaseOutcome::failed(Phase::Approve, format!("{err:#}")));
            tally.plan = Some(plan);
            return tally.abort(AbortReason::PhaseFailed {
                phase: Phase::Approve,
            });
        }
    };
    if !approved {
        tally.plan = Some(plan);
        return tally.abort(AbortReason::Rejected);
    }

    tally.begin(Phase::Execute);
    let executed = execute_phase(ctx, &plan, agent, tally.observer());
    tally.plan = Some(plan);
    match executed {
        Ok(decoded) => tally.finish(PhaseOutcome::succeeded(
            Phase::Execute,
            Some(format!("{decoded} events")),
        )),
        Err(err) => {
            tally.finish(PhaseOutcome::failed(Phase::Execute, format!("{err:#}")));
            return tally.abort(AbortReason::PhaseFailed {
                phase: Phase::Execute,
            });
        }
    }

    tally.begin(Phase::Persist);
    let paths = ctx.run_paths();
    let outcome = match run_probe(agent, &ctx.config.agent, &ctx.workdir, Some(&paths.persist_log))
    {
        Ok(Ok(content)) => PhaseOutcome::succeeded(Phase::Persist, Some(content.diagnostic())),
        Ok(Err(diagnostic)) => PhaseOutcome::failed(Phase::Persist, diagnostic),
        Err(err) => PhaseOutcome::failed(Phase::Persist, format!("{err:#}")),
    };
    tally.finish(outcome);
    tally.done()
}

fn plan_phase<A, F>(
    ctx: &WorkflowContext,
    task: &str,
    agent: &A,
    observe: &mut F,
) -> Result<Plan>
where
    A: AgentRunner + ?Sized,
    F: FnMut(Progress<'_>),
{
    let paths = ctx.run_paths();
    let request = ctx.agent_request(
        AgentCommand::run(&ctx.config.agent.plan_agent, task),
        &paths.plan_log,
        None,
    );
    let output = agent.invoke(&request).context("invoke plan agent")?;
    if !output.success() {
        bail!(output.failure_diagnostic(request.timeout));
    }

    let mut stream = EventStream::new(output.stdout.as_slice());
    let mut acc = PlanAccumulator::new(task);
    for event in stream.by_ref() {
        observe(Progress::AgentEvent {
            phase: Phase::Plan,
            event: &event,
        });
        acc.push(event);
    }
    log_stream_faults(Phase::Plan, &stream);
    let plan = acc.finish(stream.faults().len());

    let snapshot_path = ctx.snapshot_path();
    write_plan_snapshot(&snapshot_path, &plan)
        .with_context(|| format!("write plan snapshot {}", snapshot_path.display()))?;
    info!(
        events = plan.events.len(),
        decode_faults = plan.decode_faults,
        snapshot = %snapshot_path.display(),
        "plan ready"
    );
    Ok(plan)
}

/// Run the build agent on the approved plan. Returns the number of decoded
/// trace events; the phase is judged by exit status alone.
fn execute_phase<A, F>(
    ctx: &WorkflowContext,
    plan: &Plan,
    agent: &A,
    observe: &mut F,
) -> Result<usize>
where
    A: AgentRunner + ?Sized,
    F: FnMut(Progress<'_>),
{
    let paths = ctx.run_paths();
    let prompt = render_execute_prompt(plan).context("render execute prompt")?;
    let request = ctx.agent_request(
        AgentCommand::run(&ctx.config.agent.build_agent, prompt),
        &paths.execute_log,
        Some(&paths.execute_stream),
    );
    let output = agent.invoke(&request).context("invoke build agent")?;
    if !output.success() {
        bail!(output.failure_diagnostic(request.timeout));
    }

    let mut stream = EventStream::new(output.stdout.as_slice());
    for event in stream.by_ref() {
        observe(Progress::AgentEvent {
            phase: Phase::Execute,
            event: &event,
        });
    }
    log_stream_faults(Phase::Execute, &stream);
    Ok(stream.decoded())
}

fn log_stream_faults<R: BufRead>(phase: Phase, stream: &EventStream<R>) {
    for fault in stream.faults() {
        warn!(
            %phase,
            line = fault.line_number,
            excerpt = %fault.excerpt,
            error = %fault.error,
            "skipping malformed agent output line"
        );
    }
    if let Some(err) = stream.read_error() {
        warn!(%phase, err, "agent output ended early");
    }
}

fn plan_summary(plan: &Plan) -> String {
    match plan.decode_faults {
        0 => format!("{} events", plan.events.len()),
        faults => format!(
            "{} events, {faults} malformed lines skipped",
            plan.events.len()
        ),
    }
}

/// Bookkeeping shared by the entry points: the ledger, the observer, and the
/// report metadata.
struct Tally<'a, F> {
    ctx: &'a WorkflowContext,
    task: String,
    started_at: String,
    ledger: PhaseLedger,
    plan: Option<Plan>,
    on_progress: &'a mut F,
}

impl<'a, F> Tally<'a, F>
where
    F: FnMut(Progress<'_>),
{
    fn new(ctx: &'a WorkflowContext, task: &str, on_progress: &'a mut F) -> Self {
        info!(run_id = %ctx.run_id, workdir = %ctx.workdir.display(), "workflow started");
        Self {
            ctx,
            task: task.to_string(),
            started_at: timestamp(),
            ledger: PhaseLedger::new(),
            plan: None,
            on_progress,
        }
    }

    fn observer(&mut self) -> &mut F {
        &mut *self.on_progress
    }

    fn begin(&mut self, phase: Phase) {
        info!(%phase, state = ?phase.state(), "phase started");
        (self.on_progress)(Progress::PhaseStarted(phase));
    }

    fn finish(&mut self, outcome: PhaseOutcome) {
        match outcome.status {
            PhaseStatus::Failed => warn!(
                phase = %outcome.phase,
                diagnostic = outcome.diagnostic.as_deref().unwrap_or_default(),
                "phase failed"
            ),
            _ => info!(phase = %outcome.phase, status = %outcome.status, "phase finished"),
        }
        (self.on_progress)(Progress::PhaseFinished(&outcome));
        if let Err(err) = self.ledger.record(outcome) {
            error!(err = %format!("{err:#}"), "phase outcome dropped");
        }
    }

    fn skip_remaining(&mut self) {
        let recorded = self.ledger.outcomes().len();
        self.ledger.skip_remaining();
        self.announce_from(recorded);
    }

    fn skip_remaining_noted(&mut self, note: &str) {
        let recorded = self.ledger.outcomes().len();
        self.ledger.skip_remaining_noted(note);
        self.announce_from(recorded);
    }

    fn announce_from(&mut self, recorded: usize) {
        for outcome in &self.ledger.outcomes()[recorded..] {
            (self.on_progress)(Progress::PhaseFinished(outcome));
        }
    }

    fn abort(mut self, reason: AbortReason) -> WorkflowReport {
        self.skip_remaining();
        info!(?reason, "workflow aborted");
        self.into_report(WorkflowState::Aborted, Some(reason))
    }

    fn done(self) -> WorkflowReport {
        info!("workflow done");
        self.into_report(WorkflowState::Done, None)
    }

    fn into_report(self, final_state: WorkflowState, abort_reason: Option<AbortReason>) -> WorkflowReport {
        let report = WorkflowReport {
            run_id: self.ctx.run_id.clone(),
            task: self.task,
            phases: self.ledger.into_outcomes(),
            final_state,
            abort_reason,
            started_at: self.started_at,
            finished_at: timestamp(),
            plan: self.plan,
        };
        if let Err(err) = write_report(&self.ctx.run_paths(), &report) {
            warn!(err = %format!("{err:#}"), "failed to write run report");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedAgent, ScriptedApproval, TestWorkspace, exit, ndjson, ok, spawn_error, timeout,
    };
    use serde_json::json;
    use std::fs;

    fn plan_stdout() -> String {
        ndjson(&[
            json!({"type": "text", "part": {"text": "Step 1: define function\n"}}),
            json!({"type": "step_finish", "part": {"tokens": {"input": 10, "output": 5}}}),
        ])
    }

    /// Drives a full auto-approved run and checks each agent invocation.
    #[test]
    fn full_run_invokes_plan_build_and_session_list() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(true);
        let agent = ScriptedAgent::new(vec![
            ok(&plan_stdout()),
            ok(&ndjson(&[json!({"type": "tool_call", "part": {"tool": {"name": "write"}}})])),
            ok("[]"),
        ]);
        let approval = ScriptedApproval::new("no");

        let report = run_workflow(&ctx, "add two numbers", &agent, &approval, |_| {});

        assert_eq!(report.final_state, WorkflowState::Done);
        assert_eq!(report.exit_code(), exit_codes::OK);
        assert_eq!(approval.times_asked(), 0);

        let requests = agent.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0].command,
            AgentCommand::run("plan", "add two numbers")
        );
        assert_eq!(
            requests[1].command,
            AgentCommand::run(
                "build",
                "Execute this plan:\nStep 1: define function\n\n\nOriginal task: add two numbers"
            )
        );
        assert_eq!(requests[2].command, AgentCommand::SessionList);
        assert_eq!(requests[0].stream_path, None);
        assert_eq!(
            requests[1].stream_path.as_deref(),
            Some(ctx.run_paths().execute_stream.as_path())
        );
        assert_eq!(
            report.outcome(Phase::Persist).and_then(|o| o.diagnostic.as_deref()),
            Some("0 sessions")
        );
    }

    /// Progress notifications arrive in phase order with the plan in between.
    #[test]
    fn progress_reports_phases_events_and_plan() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(true);
        let agent = ScriptedAgent::new(vec![ok(&plan_stdout()), ok(""), ok("[1]")]);

        let mut seen = Vec::new();
        run_workflow(&ctx, "t", &agent, &ScriptedApproval::new(""), |progress| {
            seen.push(match progress {
                Progress::PhaseStarted(phase) => format!("start {phase}"),
                Progress::AgentEvent { phase, event } => format!("{phase} {}", event.kind()),
                Progress::PlanReady { plan, .. } => format!("plan {}", plan.events.len()),
                Progress::PhaseFinished(outcome) => {
                    format!("end {} {}", outcome.phase, outcome.status)
                }
            });
        });

        assert_eq!(
            seen,
            vec![
                "start plan",
                "plan text",
                "plan step_finish",
                "plan 2",
                "end plan succeeded",
                "start approve",
                "end approve succeeded",
                "start execute",
                "end execute succeeded",
                "start persist",
                "end persist succeeded",
            ]
        );
    }

    #[test]
    fn plan_snapshot_and_report_are_written() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(false);
        let agent = ScriptedAgent::new(vec![ok(&plan_stdout())]);

        let report = run_workflow(&ctx, "add two numbers", &agent, &ScriptedApproval::new("nope"), |_| {});
        assert_eq!(report.exit_code(), exit_codes::REJECTED);

        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ctx.snapshot_path()).expect("snapshot"))
                .expect("json");
        assert_eq!(snapshot["task"], "add two numbers");
        assert_eq!(snapshot["plan_text"], "Step 1: define function\n");
        assert_eq!(snapshot["events"].as_array().map(Vec::len), Some(2));

        let written: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(ctx.run_paths().report_path).expect("report"),
        )
        .expect("json");
        assert_eq!(written["final_state"], "aborted");
        assert_eq!(written["abort_reason"], json!({"kind": "rejected"}));
        assert_eq!(written["phases"][1]["diagnostic"], "plan rejected");
        assert_eq!(written["phases"][3]["status"], "skipped");
    }

    #[test]
    fn timeout_and_spawn_failure_fail_the_plan_phase() {
        for (response, expected) in [
            (timeout(), "agent timed out after 1800s"),
            (spawn_error(), "spawn command"),
        ] {
            let ws = TestWorkspace::new().expect("workspace");
            let ctx = ws.context(true);
            let agent = ScriptedAgent::new(vec![response]);
            let report = run_workflow(&ctx, "t", &agent, &ScriptedApproval::new(""), |_| {});

            let plan = report.outcome(Phase::Plan).expect("plan outcome");
            assert_eq!(plan.status, PhaseStatus::Failed);
            let diagnostic = plan.diagnostic.as_deref().unwrap_or_default();
            assert!(diagnostic.contains(expected), "{diagnostic}");
            assert_eq!(
                report.abort_reason,
                Some(AbortReason::PhaseFailed { phase: Phase::Plan })
            );
            assert_eq!(agent.requests().len(), 1);
            assert!(!ctx.snapshot_path().exists());
        }
    }

    #[test]
    fn approval_prompt_failure_fails_approve_phase() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(false);
        let agent = ScriptedAgent::new(vec![ok(&plan_stdout())]);
        let report = run_workflow(&ctx, "t", &agent, &ScriptedApproval::failing(), |_| {});

        assert_eq!(
            report.statuses(),
            vec![
                (Phase::Plan, PhaseStatus::Succeeded),
                (Phase::Approve, PhaseStatus::Failed),
                (Phase::Execute, PhaseStatus::Skipped),
                (Phase::Persist, PhaseStatus::Skipped),
            ]
        );
        assert_eq!(report.exit_code(), exit_codes::FAILED);
    }

    #[test]
    fn probe_failure_still_finishes_done() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(true);
        let agent = ScriptedAgent::new(vec![
            ok(&plan_stdout()),
            ok(""),
            exit(1, "no session store"),
        ]);
        let report = run_workflow(&ctx, "t", &agent, &ScriptedApproval::new(""), |_| {});

        assert_eq!(report.final_state, WorkflowState::Done);
        let persist = report.outcome(Phase::Persist).expect("persist");
        assert_eq!(persist.status, PhaseStatus::Failed);
        assert_eq!(
            persist.diagnostic.as_deref(),
            Some("exit code 1: no session store")
        );
        assert!(report.summary().ends_with("persist: failed (exit code 1: no session store)"));
    }

    #[test]
    fn saved_plan_skips_the_plan_agent() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(true);
        let planning = ScriptedAgent::new(vec![ok(&plan_stdout())]);
        run_plan_only(&ctx, "add two numbers", &planning, |_| {});

        let agent = ScriptedAgent::new(vec![ok(""), ok("{}")]);
        let snapshot_path = ctx.snapshot_path();
        let report = execute_saved_plan(&ctx, &snapshot_path, &agent, &ScriptedApproval::new(""), |_| {});

        assert_eq!(report.task, "add two numbers");
        let plan = report.outcome(Phase::Plan).expect("plan");
        assert_eq!(plan.status, PhaseStatus::Succeeded);
        assert_eq!(
            plan.diagnostic,
            Some(format!("loaded from {}", snapshot_path.display()))
        );
        assert_eq!(
            report.outcome(Phase::Persist).and_then(|o| o.diagnostic.as_deref()),
            Some("content not a list")
        );
        assert_eq!(agent.requests().len(), 2);
    }

    #[test]
    fn missing_saved_plan_fails_without_invoking_agent() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(true);
        let agent = ScriptedAgent::new(Vec::new());
        let report = execute_saved_plan(
            &ctx,
            &ws.path().join("missing.json"),
            &agent,
            &ScriptedApproval::new(""),
            |_| {},
        );
        assert_eq!(report.final_state, WorkflowState::Aborted);
        assert!(agent.requests().is_empty());
        assert_eq!(report.task, "");
    }

    #[test]
    fn plan_only_run_skips_later_phases() {
        let ws = TestWorkspace::new().expect("workspace");
        let ctx = ws.context(false);
        let agent = ScriptedAgent::new(vec![ok(&plan_stdout())]);
        let report = run_plan_only(&ctx, "t", &agent, |_| {});

        assert_eq!(report.final_state, WorkflowState::Done);
        assert_eq!(report.phases.len(), 4);
        for outcome in &report.phases[1..] {
            assert_eq!(outcome.status, PhaseStatus::Skipped);
            assert_eq!(outcome.diagnostic.as_deref(), Some(PLAN_ONLY_NOTE));
        }
        assert_eq!(report.abort_reason, None);
        let plan = report.plan.as_ref().expect("plan");
        assert_eq!(plan.narrative_text, "Step 1: define function\n");
        assert_eq!(plan.token_usage.get("output"), Some(&5));
    }
}

//! Plan → Approve → Execute driver for `opencode`-compatible coding agents.
//!
//! Runs the agent once to produce a plan (snapshotted to `.planflow/plan.json`),
//! asks the operator to approve it, runs the agent again to execute it, and
//! finally checks that the agent's session store is reachable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use planflow::core::event::excerpt;
use planflow::exit_codes;
use planflow::io::agent::CliAgent;
use planflow::io::approval::ConsolePrompt;
use planflow::io::config::{DEFAULT_CONFIG_PATH, PlanflowConfig, load_config, write_config};
use planflow::logging;
use planflow::probe::run_probe;
use planflow::workflow::{
    Progress, WorkflowContext, WorkflowReport, execute_saved_plan, run_plan_only, run_workflow,
};

#[derive(Parser)]
#[command(
    name = "planflow",
    version,
    about = "Plan, approve, and execute coding-agent tasks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Directory the agent works in; relative config paths resolve against it.
    #[arg(short = 'C', long, default_value = ".")]
    workdir: PathBuf,

    /// Config file (default: `<workdir>/.planflow/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Plan the task, ask for approval, execute, and verify session persistence.
    Run {
        task: String,
        /// Skip the approval checkpoint.
        #[arg(long)]
        auto_approve: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the planning phase only and print the plan.
    Plan {
        task: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Approve and execute a previously saved plan snapshot.
    Execute {
        /// Snapshot to execute (default: the configured `plan_snapshot`).
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Skip the approval checkpoint.
        #[arg(long)]
        auto_approve: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Query the agent's session store and report how many sessions it holds.
    Sessions {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write the default config to `.planflow/config.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
        /// Directory to initialize.
        #[arg(short = 'C', long, default_value = ".")]
        workdir: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            task,
            auto_approve,
            common,
        } => cmd_run(&task, auto_approve, &common),
        Command::Plan { task, common } => cmd_plan(&task, &common),
        Command::Execute {
            plan,
            auto_approve,
            common,
        } => cmd_execute(plan.as_deref(), auto_approve, &common),
        Command::Sessions { common } => cmd_sessions(&common),
        Command::Init { force, workdir } => cmd_init(&workdir, force),
    }
}

fn cmd_run(task: &str, auto_approve: bool, common: &CommonArgs) -> Result<i32> {
    let ctx = context(common, auto_approve)?;
    let agent = CliAgent::new(&ctx.config.agent);
    let report = run_workflow(&ctx, task, &agent, &ConsolePrompt, print_progress);
    Ok(finish(&ctx, &report))
}

fn cmd_plan(task: &str, common: &CommonArgs) -> Result<i32> {
    let ctx = context(common, false)?;
    let agent = CliAgent::new(&ctx.config.agent);
    let report = run_plan_only(&ctx, task, &agent, print_progress);
    if let Some(plan) = &report.plan {
        println!();
        println!("{}", plan.narrative_text.trim_end());
    }
    Ok(finish(&ctx, &report))
}

fn cmd_execute(plan: Option<&Path>, auto_approve: bool, common: &CommonArgs) -> Result<i32> {
    let ctx = context(common, auto_approve)?;
    let snapshot_path = match plan {
        Some(path) => path.to_path_buf(),
        None => ctx.snapshot_path(),
    };
    let agent = CliAgent::new(&ctx.config.agent);
    let report = execute_saved_plan(&ctx, &snapshot_path, &agent, &ConsolePrompt, print_progress);
    Ok(finish(&ctx, &report))
}

fn cmd_sessions(common: &CommonArgs) -> Result<i32> {
    let config = config_for(common)?;
    let agent = CliAgent::new(&config.agent);
    match run_probe(&agent, &config.agent, &common.workdir, None)? {
        Ok(content) => {
            println!("{}", content.diagnostic());
            Ok(exit_codes::OK)
        }
        Err(diagnostic) => {
            eprintln!("session list failed: {diagnostic}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_init(workdir: &Path, force: bool) -> Result<i32> {
    let path = workdir.join(DEFAULT_CONFIG_PATH);
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &PlanflowConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn config_for(common: &CommonArgs) -> Result<PlanflowConfig> {
    let path = common
        .config
        .clone()
        .unwrap_or_else(|| common.workdir.join(DEFAULT_CONFIG_PATH));
    load_config(&path)
}

fn context(common: &CommonArgs, auto_approve: bool) -> Result<WorkflowContext> {
    let mut config = config_for(common)?;
    config.auto_approve |= auto_approve;
    WorkflowContext::new(common.workdir.clone(), config)
}

fn print_progress(progress: Progress<'_>) {
    match progress {
        Progress::PhaseStarted(phase) => println!("==> {phase}"),
        Progress::AgentEvent { phase, event } => println!("  [{phase}] {}", event.describe()),
        Progress::PlanReady {
            plan,
            snapshot_path,
        } => {
            println!(
                "  plan: {} events, {} chars of narrative, saved to {}",
                plan.events.len(),
                plan.narrative_text.chars().count(),
                snapshot_path.display()
            );
            if !plan.token_usage.is_empty() {
                let usage: Vec<String> = plan
                    .token_usage
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                println!("  tokens: {}", usage.join(" "));
            }
        }
        Progress::PhaseFinished(outcome) => match &outcome.diagnostic {
            Some(diagnostic) => println!(
                "<== {} {}: {}",
                outcome.phase,
                outcome.status,
                excerpt(diagnostic, 200)
            ),
            None => println!("<== {} {}", outcome.phase, outcome.status),
        },
    }
}

fn finish(ctx: &WorkflowContext, report: &WorkflowReport) -> i32 {
    println!();
    println!("{}", report.summary());
    println!("report: {}", ctx.run_paths().report_path.display());
    report.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_flags() {
        let cli = Cli::parse_from([
            "planflow",
            "run",
            "add two numbers",
            "--auto-approve",
            "--workdir",
            "/tmp/w",
        ]);
        match cli.command {
            Command::Run {
                task,
                auto_approve,
                common,
            } => {
                assert_eq!(task, "add two numbers");
                assert!(auto_approve);
                assert_eq!(common.workdir, PathBuf::from("/tmp/w"));
                assert_eq!(common.config, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_execute_defaults() {
        let cli = Cli::parse_from(["planflow", "execute"]);
        assert!(matches!(
            cli.command,
            Command::Execute {
                plan: None,
                auto_approve: false,
                ..
            }
        ));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["planflow", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn config_flag_overrides_default_location() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[agent]\nbinary = \"my-agent\"\n").expect("write");
        let common = CommonArgs {
            workdir: temp.path().to_path_buf(),
            config: Some(path),
        };
        let config = config_for(&common).expect("config");
        assert_eq!(config.agent.binary, "my-agent");
    }

    #[test]
    fn cli_flag_enables_auto_approve() {
        let temp = tempfile::tempdir().expect("tempdir");
        let common = CommonArgs {
            workdir: temp.path().to_path_buf(),
            config: None,
        };
        assert!(!context(&common, false).expect("ctx").config.auto_approve);
        assert!(context(&common, true).expect("ctx").config.auto_approve);
    }
}

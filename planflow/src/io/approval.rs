//! Console implementation of the approval prompt.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::core::approval::{APPROVE_TOKEN, ApprovalPrompt};

const SEPARATOR: &str = "============================================================";

/// Prints the plan review to stdout and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl ApprovalPrompt for ConsolePrompt {
    fn ask(&self, review: &str) -> Result<String> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        render_review(&mut out, review).context("write plan review")?;
        read_response(io::stdin().lock()).context("read approval input")
    }
}

fn render_review<W: Write>(out: &mut W, review: &str) -> io::Result<()> {
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "PLAN")?;
    writeln!(out, "{SEPARATOR}")?;
    writeln!(out, "{}", review.trim_end())?;
    writeln!(out, "{SEPARATOR}")?;
    write!(
        out,
        "Type '{APPROVE_TOKEN}' to execute the plan; any other input rejects it: "
    )?;
    out.flush()
}

/// Read exactly one line. End of input yields an empty string.
pub fn read_response<R: BufRead>(mut reader: R) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

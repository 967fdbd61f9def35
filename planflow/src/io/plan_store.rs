//! Plan snapshot storage (`.planflow/plan.json` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::plan::{Plan, PlanSnapshot};

/// JSON Schema every stored snapshot must satisfy.
pub const PLAN_SNAPSHOT_SCHEMA: &str = include_str!("../../schemas/plan_snapshot.schema.json");

/// Atomically write the snapshot of `plan` (pretty JSON, trailing newline).
pub fn write_plan_snapshot(path: &Path, plan: &Plan) -> Result<()> {
    debug!(path = %path.display(), events = plan.events.len(), "writing plan snapshot");
    let mut buf = serde_json::to_string_pretty(&plan.snapshot()).context("serialize plan")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

/// Load a snapshot, validate it against [`PLAN_SNAPSHOT_SCHEMA`], and rebuild the plan.
pub fn load_plan_snapshot(path: &Path) -> Result<Plan> {
    debug!(path = %path.display(), "loading plan snapshot");
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let instance: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let schema: Value =
        serde_json::from_str(PLAN_SNAPSHOT_SCHEMA).context("parse plan snapshot schema")?;
    validate_schema(&instance, &schema).with_context(|| format!("validate {}", path.display()))?;
    let snapshot: PlanSnapshot = serde_json::from_value(instance)
        .with_context(|| format!("decode plan snapshot {}", path.display()))?;
    Ok(Plan::from_snapshot(snapshot))
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

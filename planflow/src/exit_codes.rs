//! Stable exit codes for planflow CLI commands.

/// The workflow reached `done` (or the command succeeded).
pub const OK: i32 = 0;
/// A phase failed, or configuration/arguments were invalid.
pub const FAILED: i32 = 1;
/// The operator did not approve the plan.
pub const REJECTED: i32 = 2;

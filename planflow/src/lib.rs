//! Plan → Approve → Execute → Verify-Persistence driver for `opencode`-style agents.
//!
//! The agent is treated as a black box that speaks newline-delimited JSON on
//! stdout. This crate runs it once to produce a plan, gates execution behind
//! an approval checkpoint, runs it again to carry the plan out, and finally
//! checks that the agent's session store is reachable. The architecture keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (event decoding, plan
//!   accumulation, approval rules, phase bookkeeping). No I/O.
//! - **[`io`]**: Side-effecting operations (subprocesses, files, the console).
//!   Isolated behind traits so tests can script them.
//!
//! [`workflow`] and [`probe`] combine the two to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod probe;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;

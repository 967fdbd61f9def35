//! Deterministic, pure logic shared by the workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (or caller-supplied readers) and return deterministic outputs suitable
//! for tests.

pub mod approval;
pub mod event;
pub mod phase;
pub mod plan;
pub mod stream;

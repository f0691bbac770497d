//! Deterministic plan execution engine.
//!
//! This crate drives a multi-step plan through a single-in-flight dispatch
//! loop: select a step, hand its task spec to a controller, apply the
//! reported outcome, and revise the plan on failure until the run completes
//! or halts. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (lifecycle, scheduling,
//!   validation, budgets). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, the controller
//!   boundary, artifact persistence). Isolated to enable mocking in tests.
//!
//! Orchestration modules ([`start`], [`dispatch`], [`looping`], [`replay`])
//! coordinate core logic with I/O to implement full runs.

pub mod core;
pub mod dispatch;
pub mod io;
pub mod logging;
pub mod looping;
pub mod plan;
pub mod replay;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

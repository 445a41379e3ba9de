//! Chain-routing conversational agent.
//!
//! An LLM-driven controller turns each user message into an ordered plan of
//! delegations to named chains (FRED data retrieval, Python code editing,
//! sandboxed execution, general Q&A), runs them, and folds their results back
//! into a persistent controller state. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan parsing, plan building,
//!   result aggregation, code extraction, outcome classification).
//! - **[`io`]**: Side-effecting operations (completion backends, subprocess
//!   execution, config, prompts, round logs).
//!
//! [`skills`] assembles chains out of skills, [`controller`] owns the
//! planning state, and [`session`] drives whole conversational turns.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod skills;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

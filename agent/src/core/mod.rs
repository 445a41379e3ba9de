//! Deterministic, pure logic shared by the agent core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod aggregator;
pub mod classify;
pub mod extract;
pub mod plan_parser;
pub mod planner;
pub mod types;

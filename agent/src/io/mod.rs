//! I/O helpers: completion backends, subprocesses, config, prompts, logs.

pub mod completion;
pub mod config;
pub mod iteration_log;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod syntax;

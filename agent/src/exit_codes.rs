//! Stable exit codes for agent CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config or arguments, or any other error.
pub const INVALID: i32 = 1;
/// `agent exec` could not produce a successful run, or a turn failed.
pub const EXECUTION_FAILED: i32 = 2;

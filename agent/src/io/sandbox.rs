//! Subprocess execution of generated code.
//!
//! [`PythonSandbox`] runs `<interpreter> -c <code>` with stdin closed, a
//! wall-clock timeout and bounded output. It guards against runaway or
//! accidental misuse only. It is not a trust boundary: the code runs with
//! the agent's own user, filesystem and network access.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::ExecOutcome;
use crate::io::config::SandboxConfig;
use crate::io::process::{CommandLimits, run_command_with_timeout};

/// Runs a code string and reports what happened.
///
/// `Err` means the run could not happen at all (spawn or I/O failure); a
/// failing program is still `Ok` with its exit status and stderr.
pub trait CodeRunner {
    fn run(&self, code: &str) -> Result<ExecOutcome>;
}

#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: PathBuf,
    workdir: Option<PathBuf>,
    limits: CommandLimits,
}

impl PythonSandbox {
    pub fn new(interpreter: PathBuf, workdir: Option<PathBuf>, limits: CommandLimits) -> Self {
        Self {
            interpreter,
            workdir,
            limits,
        }
    }

    pub fn from_config(cfg: &SandboxConfig) -> Self {
        Self::new(cfg.interpreter.clone(), cfg.workdir.clone(), cfg.limits())
    }
}

impl CodeRunner for PythonSandbox {
    #[instrument(skip_all, fields(interpreter = %self.interpreter.display(), code_bytes = code.len()))]
    fn run(&self, code: &str) -> Result<ExecOutcome> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(code);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = run_command_with_timeout(cmd, None, self.limits)
            .with_context(|| format!("run {}", self.interpreter.display()))?;

        debug!(exit_code = ?output.status.code(), timed_out = output.timed_out, "code finished");
        Ok(ExecOutcome {
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            returncode: output.status.code(),
            timed_out: output.timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // `sh -c` stands in for the interpreter so tests do not depend on Python.
    fn sandbox(timeout_secs: u64) -> PythonSandbox {
        PythonSandbox::new(
            PathBuf::from("sh"),
            None,
            CommandLimits {
                timeout: Duration::from_secs(timeout_secs),
                output_limit_bytes: 10_000,
            },
        )
    }

    #[test]
    fn captures_successful_run() {
        let outcome = sandbox(5).run("echo 42").expect("run");
        assert_eq!(outcome.stdout, "42\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.returncode, Some(0));
        assert!(!outcome.timed_out);
    }

    #[test]
    fn captures_failure_output() {
        let outcome = sandbox(5).run("echo 'Traceback' >&2; exit 1").expect("run");
        assert_eq!(outcome.stderr, "Traceback\n");
        assert_eq!(outcome.returncode, Some(1));
    }

    #[test]
    fn runs_in_configured_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let mut sandbox = sandbox(5);
        sandbox.workdir = Some(temp.path().to_path_buf());

        let outcome = sandbox.run("cat marker.txt").expect("run");
        assert_eq!(outcome.stdout, "here");
    }

    #[test]
    fn timeout_is_reported_not_raised() {
        let outcome = sandbox(1).run("exec sleep 5").expect("run");
        assert!(outcome.timed_out);
    }

    #[test]
    fn missing_interpreter_is_an_error() {
        let sandbox = PythonSandbox::new(
            PathBuf::from("/nonexistent/bin/python"),
            None,
            CommandLimits {
                timeout: Duration::from_secs(1),
                output_limit_bytes: 100,
            },
        );
        let err = sandbox.run("print(1)").unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }
}

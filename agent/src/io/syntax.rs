//! Python syntax checks via the configured interpreter.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

use crate::core::extract::SyntaxCheck;
use crate::io::config::SandboxConfig;
use crate::io::process::{CommandLimits, run_command_with_timeout};

/// Parses (never runs) the candidate source read from stdin.
const PARSE_SCRIPT: &str = "import ast, sys\nast.parse(sys.stdin.read())";

/// Asks the interpreter whether text is a valid program.
///
/// Any failure to run the check counts as "not valid", which sends the text
/// on to fenced-block extraction.
#[derive(Debug, Clone)]
pub struct PythonSyntaxCheck {
    interpreter: PathBuf,
    limits: CommandLimits,
}

impl PythonSyntaxCheck {
    pub fn new(interpreter: PathBuf, limits: CommandLimits) -> Self {
        Self {
            interpreter,
            limits,
        }
    }

    pub fn from_config(cfg: &SandboxConfig) -> Self {
        Self::new(cfg.interpreter.clone(), cfg.limits())
    }
}

impl SyntaxCheck for PythonSyntaxCheck {
    fn is_valid(&self, code: &str) -> bool {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(PARSE_SCRIPT);
        match run_command_with_timeout(cmd, Some(code.as_bytes()), self.limits) {
            Ok(output) => {
                let valid = !output.timed_out && output.status.success();
                debug!(valid, "syntax check finished");
                valid
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "syntax check could not run");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unavailable_interpreter_means_invalid() {
        let check = PythonSyntaxCheck::new(
            PathBuf::from("/nonexistent/bin/python"),
            CommandLimits {
                timeout: Duration::from_secs(1),
                output_limit_bytes: 100,
            },
        );
        assert!(!check.is_valid("print(1)"));
    }

    #[test]
    fn nonzero_exit_means_invalid() {
        // `sh` rejects the Python parse script, standing in for a SyntaxError.
        let check = PythonSyntaxCheck::new(
            PathBuf::from("sh"),
            CommandLimits {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 100,
            },
        );
        assert!(!check.is_valid("```python\nprint(1)\n```"));
    }
}

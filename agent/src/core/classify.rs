//! Success/failure classification of a code execution.

use crate::core::types::ExecOutcome;

/// Message reported for successful runs that print nothing.
pub const EMPTY_OUTPUT_MESSAGE: &str = "Python code executed successfully.";

/// Classified execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Exit status zero and nothing on stderr.
    Succeeded { message: String },
    /// Anything else. `error` is the text handed to the corrector.
    Failed { error: String },
}

/// Classify a captured run.
///
/// Success requires both a zero exit status and empty stderr, so warnings
/// count as failures.
pub fn classify(outcome: &ExecOutcome) -> Verdict {
    if !outcome.timed_out && outcome.returncode == Some(0) && outcome.stderr.is_empty() {
        let stdout = outcome.stdout.trim();
        let message = if stdout.is_empty() {
            EMPTY_OUTPUT_MESSAGE.to_string()
        } else {
            stdout.to_string()
        };
        return Verdict::Succeeded { message };
    }
    Verdict::Failed {
        error: failure_text(outcome),
    }
}

fn failure_text(outcome: &ExecOutcome) -> String {
    let mut text = outcome.stderr.clone();
    if outcome.timed_out {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("Execution timed out and was killed.");
        return text;
    }
    if text.is_empty() {
        return match outcome.returncode {
            Some(code) => format!("Process exited with status {code} and no error output."),
            None => "Process was terminated by a signal.".to_string(),
        };
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stdout: &str, stderr: &str, returncode: Option<i32>) -> ExecOutcome {
        ExecOutcome {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            returncode,
            timed_out: false,
        }
    }

    #[test]
    fn zero_exit_and_empty_stderr_succeeds_with_trimmed_stdout() {
        let verdict = classify(&outcome("  42\n", "", Some(0)));
        assert_eq!(
            verdict,
            Verdict::Succeeded {
                message: "42".to_string()
            }
        );
    }

    #[test]
    fn empty_stdout_uses_generic_message() {
        let verdict = classify(&outcome("\n", "", Some(0)));
        assert_eq!(
            verdict,
            Verdict::Succeeded {
                message: EMPTY_OUTPUT_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn warning_on_stderr_is_failure() {
        let verdict = classify(&outcome("ok", "DeprecationWarning: old\n", Some(0)));
        assert_eq!(
            verdict,
            Verdict::Failed {
                error: "DeprecationWarning: old\n".to_string()
            }
        );
    }

    #[test]
    fn nonzero_exit_with_empty_stderr_is_failure() {
        let verdict = classify(&outcome("", "", Some(3)));
        match verdict {
            Verdict::Failed { error } => assert!(error.contains("status 3")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn timeout_is_failure() {
        let mut run = outcome("partial", "", None);
        run.timed_out = true;
        match classify(&run) {
            Verdict::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

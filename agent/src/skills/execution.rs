//! Run generated code, asking the model to fix it after each failure.
//!
//! Every attempt goes through extraction first, so a corrector reply wrapped
//! in prose or a fenced block still runs. An attempt that yields no code ends
//! the loop at once. A failed run is always followed by one corrector call,
//! so a program that never succeeds costs exactly `retries` runs and
//! `retries` corrections; the last failure is the reported result, even when
//! that final correction call fails.

use std::rc::Rc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::core::classify::{Verdict, classify};
use crate::core::extract::{SyntaxCheck, extract_code};
use crate::core::types::{CODE_KEY, ExecOutcome};
use crate::io::completion::Completion;
use crate::io::prompt::{CORRECTION_SYSTEM, CorrectionInputs, render_correction};
use crate::io::sandbox::CodeRunner;
use crate::skills::{ChainContext, Skill, SkillMessage};

const NAME: &str = "python_execution";

/// Result of one pass through extract and run.
enum Attempt {
    Succeeded(SkillMessage),
    /// No runnable code; ends the loop without a correction.
    Unparseable(SkillMessage),
    Failed {
        message: SkillMessage,
        code: String,
        error: String,
    },
}

pub struct PythonExecutionSkill {
    completion: Rc<dyn Completion>,
    runner: Rc<dyn CodeRunner>,
    checker: Rc<dyn SyntaxCheck>,
    code_header: String,
    retries: u32,
}

impl PythonExecutionSkill {
    pub fn new(
        completion: Rc<dyn Completion>,
        runner: Rc<dyn CodeRunner>,
        checker: Rc<dyn SyntaxCheck>,
        code_header: &str,
        retries: u32,
    ) -> Self {
        Self {
            completion,
            runner,
            checker,
            code_header: code_header.to_string(),
            retries: retries.max(1),
        }
    }

    fn attempt(&self, data: &Map<String, Value>, text: &str) -> Attempt {
        let code = match extract_code(text, self.checker.as_ref()) {
            Ok(code) => code,
            Err(err) => {
                debug!(error = %err, "no code to run");
                let mut data = data.clone();
                data.insert(CODE_KEY.to_string(), Value::String(text.to_string()));
                return Attempt::Unparseable(SkillMessage::error(NAME, "Parsing failed.", data));
            }
        };

        let outcome = match self.runner.run(&code) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "code could not be run");
                let error = format!("Exception while executing Python code:\n{err:#}");
                let data = run_data(data, &code, None);
                return Attempt::Failed {
                    message: SkillMessage::error(NAME, error.clone(), data),
                    code,
                    error,
                };
            }
        };

        let verdict = classify(&outcome);
        let data = run_data(data, &code, Some(&outcome));
        match verdict {
            Verdict::Succeeded { message } => {
                Attempt::Succeeded(SkillMessage::new(NAME, message, data))
            }
            Verdict::Failed { error } => Attempt::Failed {
                message: SkillMessage::error(
                    NAME,
                    format!("Python code execution failed. There was an error: {error}"),
                    data,
                ),
                code,
                error,
            },
        }
    }

    fn correct(&self, context: &ChainContext<'_>, code: &str, error: &str) -> Result<String> {
        let prompt = render_correction(&CorrectionInputs {
            history: &context.history_text(),
            task: context.instruction,
            code_header: &self.code_header,
            code,
            error,
        })?;
        let corrected = self
            .completion
            .complete(CORRECTION_SYSTEM, &prompt)
            .map_err(anyhow::Error::new)?;
        debug!(corrected_bytes = corrected.len(), "corrector replied");
        Ok(corrected)
    }
}

/// `data` updated with the code that ran and what it printed.
fn run_data(
    data: &Map<String, Value>,
    code: &str,
    outcome: Option<&ExecOutcome>,
) -> Map<String, Value> {
    let mut data = data.clone();
    data.insert(CODE_KEY.to_string(), Value::String(code.to_string()));
    let (stdout, stderr, returncode) = match outcome {
        Some(outcome) => (
            outcome.stdout.clone(),
            outcome.stderr.clone(),
            outcome.returncode.map(Value::from).unwrap_or(Value::Null),
        ),
        None => (String::new(), String::new(), Value::Null),
    };
    data.insert("stdout".to_string(), Value::String(stdout));
    data.insert("stderr".to_string(), Value::String(stderr));
    data.insert("returncode".to_string(), returncode);
    data
}

impl Skill for PythonExecutionSkill {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(retries = self.retries))]
    fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage> {
        let data = context.data();
        let mut text = context.code().unwrap_or_default().to_string();
        let mut attempt = 1;
        loop {
            match self.attempt(&data, &text) {
                Attempt::Succeeded(message) => {
                    info!(attempt, "code succeeded");
                    return Ok(message);
                }
                Attempt::Unparseable(message) => return Ok(message),
                Attempt::Failed {
                    message,
                    code,
                    error,
                } => {
                    warn!(attempt, "code failed");
                    if attempt >= self.retries {
                        // Reply is unused; a transport failure still reports the run.
                        if let Err(err) = self.correct(context, &code, &error) {
                            warn!(error = %format!("{err:#}"), "final correction failed");
                        }
                        info!(attempt, "retries exhausted");
                        return Ok(message);
                    }
                    text = self.correct(context, &code, &error)?;
                    attempt += 1;
                }
            }
        }
    }
}

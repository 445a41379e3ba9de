//! Test-only fakes for completion, code execution and syntax checks.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::extract::SyntaxCheck;
use crate::core::types::{ChainSpec, DelegationResult, ExecOutcome, ITERATION_KEY};
use crate::io::completion::{Completion, CompletionError};
use crate::io::sandbox::CodeRunner;

/// Catalogue entry with a deterministic description.
pub fn chain_spec(name: &str) -> ChainSpec {
    ChainSpec {
        name: name.to_string(),
        description: format!("{name} chain"),
    }
}

/// Result whose `data` is `data` tagged with `iteration`.
pub fn result_at(chain: &str, iteration: u64, score: f64, data: Value) -> DelegationResult {
    let mut map = data.as_object().cloned().unwrap_or_default();
    map.insert(ITERATION_KEY.to_string(), Value::from(iteration));
    DelegationResult {
        chain: chain.to_string(),
        score,
        message: format!("{chain} done"),
        data: Value::Object(map),
        is_error: false,
    }
}

/// One recorded completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCall {
    pub system: String,
    pub user: String,
}

/// Completion that replays scripted responses in order.
///
/// Once the script is exhausted it returns `default` if set, else an error.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    responses: RefCell<VecDeque<Result<String, CompletionError>>>,
    default: Option<String>,
    calls: RefCell<Vec<CompletionCall>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            default: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Always answer `text`.
    pub fn repeating(text: &str) -> Self {
        Self {
            default: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.borrow().clone()
    }
}

impl Completion for ScriptedCompletion {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        self.calls.borrow_mut().push(CompletionCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        match self.responses.borrow_mut().pop_front() {
            Some(response) => response,
            None => self
                .default
                .clone()
                .ok_or_else(|| CompletionError::new("scripted", "script exhausted")),
        }
    }
}

/// A scripted code run: an outcome, or a failure to run at all.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Outcome(ExecOutcome),
    SpawnError(String),
}

impl ScriptedRun {
    pub fn ok(stdout: &str) -> Self {
        Self::Outcome(ExecOutcome {
            stdout: stdout.to_string(),
            stderr: String::new(),
            returncode: Some(0),
            timed_out: false,
        })
    }

    pub fn failed(stderr: &str, returncode: i32) -> Self {
        Self::Outcome(ExecOutcome {
            stdout: String::new(),
            stderr: stderr.to_string(),
            returncode: Some(returncode),
            timed_out: false,
        })
    }
}

/// Code runner that replays scripted runs and records the code it was given.
///
/// Once the script is exhausted the last run repeats.
#[derive(Debug)]
pub struct ScriptedRunner {
    runs: RefCell<VecDeque<ScriptedRun>>,
    last: RefCell<Option<ScriptedRun>>,
    codes: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            last: RefCell::new(None),
            codes: RefCell::new(Vec::new()),
        }
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.borrow().clone()
    }
}

impl CodeRunner for ScriptedRunner {
    fn run(&self, code: &str) -> Result<ExecOutcome> {
        self.codes.borrow_mut().push(code.to_string());
        let next = self.runs.borrow_mut().pop_front();
        let run = match next {
            Some(run) => {
                *self.last.borrow_mut() = Some(run.clone());
                run
            }
            None => self
                .last
                .borrow()
                .clone()
                .ok_or_else(|| anyhow!("no scripted runs"))?,
        };
        match run {
            ScriptedRun::Outcome(outcome) => Ok(outcome),
            ScriptedRun::SpawnError(message) => Err(anyhow!(message)),
        }
    }
}

/// Syntax check with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticSyntax(pub bool);

impl SyntaxCheck for StaticSyntax {
    fn is_valid(&self, _code: &str) -> bool {
        self.0
    }
}

/// Treats any text without a code fence as a valid program. Like
/// `ast.parse`, it accepts empty text.
#[derive(Debug, Clone, Copy)]
pub struct FenceOnlySyntax;

impl SyntaxCheck for FenceOnlySyntax {
    fn is_valid(&self, code: &str) -> bool {
        !code.contains("```")
    }
}

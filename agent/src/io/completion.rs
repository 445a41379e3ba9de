//! Completion backends for controller and skill prompts.
//!
//! The [`Completion`] trait decouples planning and skills from the model
//! provider. [`CommandCompletion`] shells out to a CLI (the prompt goes to
//! stdin); [`FallbackCompletion`] adds transient-error retries and a secondary
//! backend. Tests use scripted completions that never spawn processes.

use std::fmt;
use std::process::Command;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::io::config::CompletionConfig;
use crate::io::process::{CommandLimits, run_command_with_timeout};

/// A completion backend failed (unreachable, quota, non-zero exit, timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionError {
    /// Backend that failed, e.g. the program name.
    pub backend: String,
    pub message: String,
}

impl CompletionError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Service-unavailable errors are worth retrying on the same backend.
    pub fn is_transient(&self) -> bool {
        self.message.contains("503")
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completion via {} failed: {}", self.backend, self.message)
    }
}

impl std::error::Error for CompletionError {}

/// Send a system and user message, get the completion text back.
pub trait Completion {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

impl<T: Completion + ?Sized> Completion for Rc<T> {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        (**self).complete(system, user)
    }
}

/// Completion backed by an external command such as the `llm` CLI.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    program: String,
    args: Vec<String>,
    system_flag: Option<String>,
    limits: CommandLimits,
}

impl CommandCompletion {
    /// Build from an argv (`command[0]` is the program).
    pub fn new(command: &[String], system_flag: Option<String>, limits: CommandLimits) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args,
            system_flag,
            limits,
        }
    }

    pub fn from_config(cfg: &CompletionConfig) -> Self {
        Self::new(&cfg.command, cfg.system_flag.clone(), cfg.limits())
    }

    fn error(&self, message: impl Into<String>) -> CompletionError {
        CompletionError::new(self.program.clone(), message)
    }
}

impl Completion for CommandCompletion {
    #[instrument(skip_all, fields(program = %self.program, prompt_bytes = user.len()))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let stdin = match &self.system_flag {
            Some(flag) => {
                cmd.arg(flag).arg(system);
                user.to_string()
            }
            None => format!("{system}\n\n{user}"),
        };

        let output = run_command_with_timeout(cmd, Some(stdin.as_bytes()), self.limits)
            .map_err(|err| self.error(format!("{err:#}")))?;

        if output.timed_out {
            warn!(
                timeout_secs = self.limits.timeout.as_secs(),
                "completion command timed out"
            );
            return Err(self.error(format!("timed out after {:?}", self.limits.timeout)));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(self.error(format!(
                "exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let text = output.stdout_text().trim().to_string();
        debug!(response_bytes = text.len(), "completion received");
        Ok(text)
    }
}

/// Retry a primary backend on transient failures, then try a fallback.
pub struct FallbackCompletion {
    primary: Box<dyn Completion>,
    fallback: Box<dyn Completion>,
    retry_before_fallback: u32,
    backoff: Duration,
}

impl FallbackCompletion {
    pub fn new(
        primary: Box<dyn Completion>,
        fallback: Box<dyn Completion>,
        retry_before_fallback: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry_before_fallback,
            backoff,
        }
    }

    fn complete_with_retry(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let mut attempt = 0u32;
        loop {
            match self.primary.complete(system, user) {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt + 1 < self.retry_before_fallback => {
                    let delay = self.backoff.mul_f64(1.25f64.powi(attempt as i32));
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient completion error, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Completion for FallbackCompletion {
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        match self.complete_with_retry(system, user) {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                info!(err = %primary_err, "primary completion failed, using fallback");
                self.fallback.complete(system, user).map_err(|fallback_err| {
                    warn!(err = %fallback_err, "fallback completion failed");
                    primary_err
                })
            }
        }
    }
}

/// Build the configured backend stack.
pub fn completion_from_config(cfg: &CompletionConfig) -> Box<dyn Completion> {
    let primary = CommandCompletion::from_config(cfg);
    match &cfg.fallback_command {
        Some(fallback) => Box::new(FallbackCompletion::new(
            Box::new(primary),
            Box::new(CommandCompletion::new(
                fallback,
                cfg.system_flag.clone(),
                cfg.limits(),
            )),
            cfg.retry_before_fallback,
            Duration::from_millis(cfg.retry_backoff_ms),
        )),
        None => Box::new(primary),
    }
}

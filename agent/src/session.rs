//! A conversation: chat history, the controller and the chains it delegates to.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::controller::Controller;
use crate::core::types::{ChainSpec, ChatMessage, ControllerState, DelegationResult};
use crate::io::completion::{Completion, CompletionError, completion_from_config};
use crate::io::config::AgentConfig;
use crate::io::iteration_log::write_round;
use crate::io::sandbox::PythonSandbox;
use crate::io::syntax::PythonSyntaxCheck;
use crate::skills::{Chain, SkillDeps, build_chains};

/// Reply when no round produced anything to show.
pub const NO_ANSWER_REPLY: &str = "I don't know how to help with that.";

/// Reply when the completion backend failed mid-turn.
pub const FAILURE_REPLY: &str =
    "Sorry, the language model is unavailable right now. Please try again later.";

/// What one user message produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Planning rounds attempted, including one that returned an empty plan.
    pub rounds: u32,
    /// Results selected in the last round that selected any.
    pub results: Vec<DelegationResult>,
    /// The completion backend failed; `reply` is [`FAILURE_REPLY`].
    pub failed: bool,
}

pub struct Session {
    controller: Controller,
    chains: Vec<Chain>,
    catalogue: Vec<ChainSpec>,
    history: Vec<ChatMessage>,
    max_rounds: u32,
    log_dir: Option<PathBuf>,
}

impl Session {
    pub fn new(cfg: &AgentConfig, completion: Rc<dyn Completion>, deps: &SkillDeps) -> Self {
        let chains = build_chains(cfg, deps);
        let catalogue = chains.iter().map(Chain::spec).collect();
        Self {
            controller: Controller::new(completion, cfg),
            chains,
            catalogue,
            history: Vec::new(),
            max_rounds: cfg.max_rounds,
            log_dir: cfg.log_dir.clone(),
        }
    }

    /// Wire the configured completion command, sandbox and syntax check.
    pub fn from_config(cfg: &AgentConfig) -> Result<Self> {
        cfg.validate()?;
        let completion: Rc<dyn Completion> = Rc::from(completion_from_config(&cfg.completion));
        let deps = SkillDeps {
            completion: completion.clone(),
            runner: Rc::new(PythonSandbox::from_config(&cfg.sandbox)),
            checker: Rc::new(PythonSyntaxCheck::from_config(&cfg.sandbox)),
            code_header: cfg.code_header.clone(),
            retries: cfg.sandbox.retries,
        };
        Ok(Self::new(cfg, completion, &deps))
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state(&self) -> &ControllerState {
        self.controller.state()
    }

    pub fn code(&self) -> Option<&str> {
        self.controller.state().code()
    }

    pub fn set_code(&mut self, code: Option<String>) {
        self.controller.set_code(code);
    }

    /// Start over with empty history and fresh controller state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.controller.reset();
    }

    /// Answer one user message.
    ///
    /// Completion failures end the turn with [`FAILURE_REPLY`] and leave the
    /// session usable; the failed reply is not added to history. Other errors
    /// (prompt rendering, round logs) are returned.
    #[instrument(skip_all, fields(max_rounds = self.max_rounds))]
    pub fn interact(&mut self, message: &str) -> Result<TurnOutcome> {
        self.history.push(ChatMessage::user(message));

        let mut outcome = TurnOutcome {
            reply: String::new(),
            rounds: 0,
            results: Vec::new(),
            failed: false,
        };
        while outcome.rounds < self.max_rounds {
            let round = match self.run_round() {
                Ok(round) => round,
                Err(err) => {
                    if let Some(transport) = err.downcast_ref::<CompletionError>() {
                        warn!(error = %transport, "turn aborted");
                        outcome.failed = true;
                        outcome.reply = FAILURE_REPLY.to_string();
                        return Ok(outcome);
                    }
                    return Err(err);
                }
            };
            outcome.rounds += 1;

            let Some(selected) = round else {
                info!("empty plan");
                break;
            };
            let answered = selected.iter().any(|result| !result.is_error);
            if !selected.is_empty() {
                outcome.results = selected;
            }
            if answered {
                break;
            }
        }

        outcome.reply = outcome
            .results
            .last()
            .map(|result| result.message.clone())
            .unwrap_or_else(|| NO_ANSWER_REPLY.to_string());
        self.history.push(ChatMessage::agent(outcome.reply.clone()));
        Ok(outcome)
    }

    /// Plan, run every delegation in order, then aggregate.
    ///
    /// `None` means the plan was empty; state is left untouched.
    fn run_round(&mut self) -> Result<Option<Vec<DelegationResult>>> {
        let plan = self.controller.plan(&self.history, &self.catalogue)?;
        if plan.is_empty() {
            return Ok(None);
        }

        let iteration = self.controller.state().iteration();
        let mut results = Vec::with_capacity(plan.len());
        for delegation in &plan {
            let Some(chain) = self.chains.iter().find(|c| c.name() == delegation.target) else {
                warn!(chain = %delegation.target, "no chain for delegation");
                continue;
            };
            results.push(chain.run(delegation, &self.history)?);
        }

        if let Some(dir) = &self.log_dir {
            write_round(dir, iteration, &plan, &results)?;
        }
        Ok(Some(self.controller.select_responses(results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::test_support::{FenceOnlySyntax, ScriptedCompletion, ScriptedRun, ScriptedRunner};

    struct Fixture {
        completion: Rc<ScriptedCompletion>,
        runner: Rc<ScriptedRunner>,
        session: Session,
    }

    fn fixture(
        cfg: &AgentConfig,
        completion: ScriptedCompletion,
        runs: Vec<ScriptedRun>,
    ) -> Fixture {
        let completion = Rc::new(completion);
        let runner = Rc::new(ScriptedRunner::new(runs));
        let deps = SkillDeps {
            completion: completion.clone(),
            runner: runner.clone(),
            checker: Rc::new(FenceOnlySyntax),
            code_header: String::new(),
            retries: 3,
        };
        let session = Session::new(cfg, completion.clone(), &deps);
        Fixture {
            completion,
            runner,
            session,
        }
    }

    fn answers(texts: &[&str]) -> ScriptedCompletion {
        ScriptedCompletion::new(texts.iter().map(|t| Ok((*t).to_string())).collect())
    }

    #[test]
    fn general_chain_answers() {
        let mut f = fixture(
            &AgentConfig::default(),
            answers(&["general;1;greet the user", "Hello!"]),
            Vec::new(),
        );
        let outcome = f.session.interact("hi").expect("interact");

        assert_eq!(outcome.reply, "Hello!");
        assert_eq!(outcome.rounds, 1);
        assert!(!outcome.failed);
        assert_eq!(f.session.state().iteration(), 1);
        let roles: Vec<Role> = f.session.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Agent]);
        assert_eq!(f.completion.calls().len(), 2);
    }

    #[test]
    fn empty_plan_gets_fallback_reply_without_advancing() {
        let mut f = fixture(&AgentConfig::default(), answers(&["unknown"]), Vec::new());
        let outcome = f.session.interact("unknown request").expect("interact");

        assert_eq!(outcome.reply, NO_ANSWER_REPLY);
        assert!(outcome.results.is_empty());
        assert_eq!(f.session.state().iteration(), 0);
    }

    #[test]
    fn transport_failure_keeps_session_usable() {
        let completion = ScriptedCompletion::new(vec![
            Err(CompletionError::new("llm", "quota exceeded")),
            Ok("general;1;greet".to_string()),
            Ok("Hi again.".to_string()),
        ]);
        let mut f = fixture(&AgentConfig::default(), completion, Vec::new());

        let outcome = f.session.interact("hi").expect("interact");
        assert!(outcome.failed);
        assert_eq!(outcome.reply, FAILURE_REPLY);
        assert_eq!(f.session.history().len(), 1);

        let outcome = f.session.interact("hi").expect("interact");
        assert!(!outcome.failed);
        assert_eq!(outcome.reply, "Hi again.");
    }

    #[test]
    fn error_round_is_followed_by_another_round() {
        let cfg = AgentConfig {
            max_rounds: 2,
            ..AgentConfig::default()
        };
        let mut f = fixture(
            &cfg,
            answers(&[
                "code_execution_and_correction;1;run the code",
                "general;1;explain there is no code",
                "There is no code yet.",
            ]),
            Vec::new(),
        );
        let outcome = f.session.interact("run it").expect("interact");

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.reply, "There is no code yet.");
        assert_eq!(f.session.state().iteration(), 2);
        assert!(f.runner.codes().is_empty());
    }

    #[test]
    fn max_rounds_bounds_error_rounds() {
        let mut f = fixture(
            &AgentConfig::default(),
            answers(&["code_execution_and_correction;1;run the code"]),
            Vec::new(),
        );
        let outcome = f.session.interact("run it").expect("interact");

        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.reply, "Parsing failed.");
        assert!(outcome.results[0].is_error);
    }

    #[test]
    fn execution_result_updates_code() {
        let mut f = fixture(
            &AgentConfig::default(),
            answers(&["code_execution_and_correction;1;run the code"]),
            vec![ScriptedRun::ok("3\n")],
        );
        f.session.set_code(Some("```python\nprint(1 + 2)\n```".to_string()));

        let outcome = f.session.interact("run it").expect("interact");

        assert_eq!(outcome.reply, "3");
        assert_eq!(f.session.code(), Some("print(1 + 2)"));
        assert_eq!(f.runner.codes(), vec!["print(1 + 2)"]);
    }

    #[test]
    fn rounds_are_logged_when_configured() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = AgentConfig {
            log_dir: Some(temp.path().to_path_buf()),
            ..AgentConfig::default()
        };
        let mut f = fixture(&cfg, answers(&["general;1;greet", "Hello!"]), Vec::new());
        f.session.interact("hi").expect("interact");

        assert!(temp.path().join("0").join("plan.json").is_file());
        assert!(temp.path().join("0").join("results.json").is_file());
    }

    #[test]
    fn reset_clears_history_and_state() {
        let mut f = fixture(
            &AgentConfig::default(),
            answers(&["general;1;greet", "Hello!"]),
            Vec::new(),
        );
        f.session.interact("hi").expect("interact");
        f.session.set_code(Some("x = 1".to_string()));

        f.session.reset();

        assert!(f.session.history().is_empty());
        assert_eq!(f.session.code(), None);
        assert_eq!(f.session.state().iteration(), 0);
    }
}

//! Chains and the skills they are built from.
//!
//! A [`Chain`] runs its skills in order. Each skill sees the messages produced
//! so far and returns one [`SkillMessage`]; the data map flows from skill to
//! skill, so code written by one step is parsed and run by the next. A skill
//! reporting `is_error` ends the chain early.

use std::rc::Rc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::core::extract::SyntaxCheck;
use crate::core::types::{
    CODE_KEY, ChainSpec, ChatMessage, Delegation, DelegationResult, SkillKind,
};
use crate::io::completion::Completion;
use crate::io::config::{AgentConfig, ChainConfig};
use crate::io::sandbox::CodeRunner;
use crate::io::prompt::CodeTask;

pub mod code_writer;
pub mod execution;
pub mod general;
pub mod parse_python;

pub use code_writer::CodeWriterSkill;
pub use execution::PythonExecutionSkill;
pub use general::GeneralSkill;
pub use parse_python::ParsePythonSkill;

/// Source name of the message that seeds every chain.
const CONTROLLER_SOURCE: &str = "controller";

/// Output of one skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillMessage {
    /// Skill that produced the message.
    pub source: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub is_error: bool,
}

impl SkillMessage {
    pub fn new(source: &str, message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            source: source.to_string(),
            message: message.into(),
            data,
            is_error: false,
        }
    }

    pub fn error(source: &str, message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            is_error: true,
            ..Self::new(source, message, data)
        }
    }
}

/// What a skill can see while it runs.
#[derive(Debug, Clone)]
pub struct ChainContext<'a> {
    /// Conversation so far, ending with the current user message.
    pub history: &'a [ChatMessage],
    /// Instruction the controller gave this delegation.
    pub instruction: &'a str,
    /// Messages produced in this chain, starting with the controller seed.
    pub messages: Vec<SkillMessage>,
}

impl ChainContext<'_> {
    pub fn last_message(&self) -> Option<&SkillMessage> {
        self.messages.last()
    }

    /// Data carried by the latest message.
    pub fn data(&self) -> Map<String, Value> {
        self.last_message()
            .map(|message| message.data.clone())
            .unwrap_or_default()
    }

    /// Code carried by the latest message, if it is a string.
    pub fn code(&self) -> Option<&str> {
        self.last_message()
            .and_then(|message| message.data.get(CODE_KEY))
            .and_then(Value::as_str)
    }

    /// Conversation history rendered as `role: text` lines.
    pub fn history_text(&self) -> String {
        self.history
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `data` with `code` replaced.
pub(crate) fn with_code(mut data: Map<String, Value>, code: &str) -> Map<String, Value> {
    data.insert(CODE_KEY.to_string(), Value::String(code.to_string()));
    data
}

/// One processing step of a chain.
pub trait Skill {
    fn name(&self) -> &str;

    /// Run the step. `Err` is reserved for failures that must end the turn
    /// (completion transport errors); everything else is an error message.
    fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage>;
}

/// A named, ordered pipeline of skills.
pub struct Chain {
    name: String,
    description: String,
    skills: Vec<Box<dyn Skill>>,
}

impl Chain {
    pub fn new(name: &str, description: &str, skills: Vec<Box<dyn Skill>>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            skills,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> ChainSpec {
        ChainSpec {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    /// Run a delegation through every skill and report the final message.
    ///
    /// Score is the delegation's order on success and 0 when the chain ends
    /// in an error.
    #[instrument(skip_all, fields(chain = %self.name, order = delegation.order))]
    pub fn run(
        &self,
        delegation: &Delegation,
        history: &[ChatMessage],
    ) -> Result<DelegationResult> {
        let mut context = ChainContext {
            history,
            instruction: &delegation.instruction,
            messages: vec![SkillMessage::new(
                CONTROLLER_SOURCE,
                delegation.instruction.clone(),
                delegation.state.clone().into_map(),
            )],
        };

        for skill in &self.skills {
            let message = skill.execute(&context)?;
            debug!(skill = skill.name(), is_error = message.is_error, "skill finished");
            let stop = message.is_error;
            context.messages.push(message);
            if stop {
                break;
            }
        }

        let last = context
            .messages
            .pop()
            .unwrap_or_else(|| SkillMessage::new(CONTROLLER_SOURCE, "", Map::new()));
        Ok(DelegationResult {
            chain: self.name.clone(),
            score: if last.is_error {
                0.0
            } else {
                delegation.order as f64
            },
            message: last.message,
            data: Value::Object(last.data),
            is_error: last.is_error,
        })
    }
}

/// Shared collaborators handed to every skill.
#[derive(Clone)]
pub struct SkillDeps {
    pub completion: Rc<dyn Completion>,
    pub runner: Rc<dyn CodeRunner>,
    pub checker: Rc<dyn SyntaxCheck>,
    pub code_header: String,
    pub retries: u32,
}

impl SkillDeps {
    pub fn skill(&self, kind: SkillKind) -> Box<dyn Skill> {
        match kind {
            SkillKind::FredData => Box::new(CodeWriterSkill::new(
                CodeTask::FredData,
                self.completion.clone(),
                &self.code_header,
            )),
            SkillKind::CodeEditor => Box::new(CodeWriterSkill::new(
                CodeTask::Edit,
                self.completion.clone(),
                &self.code_header,
            )),
            SkillKind::ParsePython => Box::new(ParsePythonSkill::new(self.checker.clone())),
            SkillKind::PythonExecution => Box::new(PythonExecutionSkill::new(
                self.completion.clone(),
                self.runner.clone(),
                self.checker.clone(),
                &self.code_header,
                self.retries,
            )),
            SkillKind::General => Box::new(GeneralSkill::new(self.completion.clone())),
        }
    }

    pub fn chain(&self, cfg: &ChainConfig) -> Chain {
        let skills = cfg.skills.iter().map(|kind| self.skill(*kind)).collect();
        Chain::new(&cfg.name, &cfg.description, skills)
    }
}

/// Assemble every configured chain.
pub fn build_chains(cfg: &AgentConfig, deps: &SkillDeps) -> Vec<Chain> {
    cfg.chains.iter().map(|chain| deps.chain(chain)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ControllerState;
    use serde_json::json;

    struct Echo {
        name: &'static str,
        fail: bool,
    }

    impl Skill for Echo {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage> {
            let mut data = context.data();
            data.insert(self.name.to_string(), json!(true));
            let message = format!("{} saw {}", self.name, context.messages.len());
            if self.fail {
                Ok(SkillMessage::error(self.name, message, data))
            } else {
                Ok(SkillMessage::new(self.name, message, data))
            }
        }
    }

    fn delegation(order: i64) -> Delegation {
        Delegation {
            target: "test".to_string(),
            order,
            instruction: "do it".to_string(),
            state: ControllerState::default(),
        }
    }

    #[test]
    fn data_flows_through_skills() {
        let chain = Chain::new(
            "test",
            "test chain",
            vec![
                Box::new(Echo { name: "a", fail: false }),
                Box::new(Echo { name: "b", fail: false }),
            ],
        );
        let result = chain.run(&delegation(4), &[]).expect("run");

        assert_eq!(result.chain, "test");
        assert_eq!(result.message, "b saw 2");
        assert_eq!(result.score, 4.0);
        assert!(!result.is_error);
        assert_eq!(result.data["a"], json!(true));
        assert_eq!(result.data["b"], json!(true));
        assert_eq!(result.iteration_tag(), Some(0));
    }

    #[test]
    fn error_stops_chain_and_zeroes_score() {
        let chain = Chain::new(
            "test",
            "test chain",
            vec![
                Box::new(Echo { name: "a", fail: true }),
                Box::new(Echo { name: "b", fail: false }),
            ],
        );
        let result = chain.run(&delegation(4), &[]).expect("run");

        assert!(result.is_error);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.message, "a saw 1");
        assert!(result.data.get("b").is_none());
    }

    #[test]
    fn default_config_builds_every_chain() {
        use crate::test_support::{ScriptedCompletion, ScriptedRunner, StaticSyntax};

        let deps = SkillDeps {
            completion: Rc::new(ScriptedCompletion::repeating("ok")),
            runner: Rc::new(ScriptedRunner::new(Vec::new())),
            checker: Rc::new(StaticSyntax(true)),
            code_header: String::new(),
            retries: 3,
        };
        let cfg = AgentConfig::default();
        let chains = build_chains(&cfg, &deps);
        let names: Vec<&str> = chains.iter().map(Chain::name).collect();
        let expected: Vec<&str> = cfg.chains.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, expected);
    }
}

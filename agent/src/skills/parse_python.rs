//! Pulls a runnable program out of the previous step's output.

use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::core::extract::{SyntaxCheck, extract_code};
use crate::skills::{ChainContext, Skill, SkillMessage, with_code};

const NAME: &str = "parse_python";

pub struct ParsePythonSkill {
    checker: Rc<dyn SyntaxCheck>,
}

impl ParsePythonSkill {
    pub fn new(checker: Rc<dyn SyntaxCheck>) -> Self {
        Self { checker }
    }
}

impl Skill for ParsePythonSkill {
    fn name(&self) -> &str {
        NAME
    }

    /// On failure the original text stays in `data.code` so the user can see
    /// what the model produced.
    fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage> {
        let text = context.code().unwrap_or_default();
        match extract_code(text, self.checker.as_ref()) {
            Ok(code) => Ok(SkillMessage::new(
                NAME,
                "Parsing succeeded.",
                with_code(context.data(), &code),
            )),
            Err(err) => {
                debug!(error = %err, "parse failed");
                Ok(SkillMessage::error(NAME, "Parsing failed.", context.data()))
            }
        }
    }
}

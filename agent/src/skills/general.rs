//! Plain conversational answer.

use std::rc::Rc;

use anyhow::Result;

use crate::io::completion::Completion;
use crate::io::prompt::GENERAL_SYSTEM;
use crate::skills::{ChainContext, Skill, SkillMessage};

const NAME: &str = "general";

pub struct GeneralSkill {
    completion: Rc<dyn Completion>,
}

impl GeneralSkill {
    pub fn new(completion: Rc<dyn Completion>) -> Self {
        Self { completion }
    }
}

impl Skill for GeneralSkill {
    fn name(&self) -> &str {
        NAME
    }

    fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage> {
        let user = format!(
            "# CONVERSATION\n{}\n\n# INSTRUCTION\n{}",
            context.history_text(),
            context.instruction
        );
        let reply = self
            .completion
            .complete(GENERAL_SYSTEM, &user)
            .map_err(anyhow::Error::new)?;
        Ok(SkillMessage::new(NAME, reply, context.data()))
    }
}

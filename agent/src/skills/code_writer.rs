//! LLM-backed code generation and editing.

use std::rc::Rc;

use anyhow::Result;
use tracing::{info, instrument};

use crate::io::completion::Completion;
use crate::io::prompt::{CodeTask, render_code_task};
use crate::skills::{ChainContext, Skill, SkillMessage, with_code};

const GENERATED_MESSAGE: &str = "I've generated code for you and placed it in the 'data' field.";
const EDITED_MESSAGE: &str = "I've edited code for you and placed the result in the 'data' field.";

/// Writes code for the delegation's instruction.
///
/// The raw completion goes into `data.code`; a following parse step is
/// expected to pull the program out of any surrounding prose.
pub struct CodeWriterSkill {
    task: CodeTask,
    completion: Rc<dyn Completion>,
    code_header: String,
}

impl CodeWriterSkill {
    pub fn new(task: CodeTask, completion: Rc<dyn Completion>, code_header: &str) -> Self {
        Self {
            task,
            completion,
            code_header: code_header.to_string(),
        }
    }
}

impl Skill for CodeWriterSkill {
    fn name(&self) -> &str {
        match self.task {
            CodeTask::FredData => "fred_data",
            CodeTask::Edit => "code_editor",
        }
    }

    #[instrument(skip_all, fields(skill = self.name()))]
    fn execute(&self, context: &ChainContext<'_>) -> Result<SkillMessage> {
        let prompt = render_code_task(
            self.task,
            context.instruction,
            &self.code_header,
            context.code(),
        )?;
        let response = self
            .completion
            .complete(self.task.system(), &prompt)
            .map_err(anyhow::Error::new)?;
        info!(response_bytes = response.len(), "code written");

        let message = match self.task {
            CodeTask::FredData => GENERATED_MESSAGE,
            CodeTask::Edit => EDITED_MESSAGE,
        };
        Ok(SkillMessage::new(
            self.name(),
            message,
            with_code(context.data(), &response),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CODE_KEY;
    use crate::io::completion::CompletionError;
    use crate::test_support::ScriptedCompletion;
    use serde_json::{Map, Value, json};

    fn context_with(data: Map<String, Value>) -> ChainContext<'static> {
        ChainContext {
            history: &[],
            instruction: "plot GDP",
            messages: vec![SkillMessage::new("controller", "plot GDP", data)],
        }
    }

    #[test]
    fn edit_sends_existing_code_and_stores_response() {
        let completion = Rc::new(ScriptedCompletion::repeating("```python\nprint(2)\n```"));
        let skill = CodeWriterSkill::new(CodeTask::Edit, completion.clone(), "import pandas as pd");
        let data = json!({"iteration": 3, "code": "print(1)"})
            .as_object()
            .cloned()
            .expect("object");

        let message = skill.execute(&context_with(data)).expect("execute");

        assert_eq!(message.source, "code_editor");
        assert_eq!(message.message, EDITED_MESSAGE);
        assert!(!message.is_error);
        assert_eq!(message.data[CODE_KEY], "```python\nprint(2)\n```");
        assert_eq!(message.data["iteration"], 3);

        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, CodeTask::Edit.system());
        assert!(calls[0].user.contains("print(1)"));
        assert!(calls[0].user.contains("plot GDP"));
    }

    #[test]
    fn fred_data_extends_existing_code() {
        let completion = Rc::new(ScriptedCompletion::repeating("print('fred')"));
        let skill = CodeWriterSkill::new(CodeTask::FredData, completion.clone(), "");
        let data = json!({"code": "gdp = fred.get_series('GDP')"})
            .as_object()
            .cloned()
            .expect("object");

        let message = skill.execute(&context_with(data)).expect("execute");

        assert_eq!(message.message, GENERATED_MESSAGE);
        assert_eq!(message.data[CODE_KEY], "print('fred')");
        let calls = completion.calls();
        assert_eq!(calls[0].system, CodeTask::FredData.system());
        assert!(calls[0].user.contains("# EXISTING CODE"));
        assert!(calls[0].user.contains("gdp = fred.get_series('GDP')"));
    }

    #[test]
    fn fred_data_without_code_omits_existing_section() {
        let completion = Rc::new(ScriptedCompletion::repeating("print('fred')"));
        let skill = CodeWriterSkill::new(CodeTask::FredData, completion.clone(), "");

        skill.execute(&context_with(Map::new())).expect("execute");

        assert!(!completion.calls()[0].user.contains("# EXISTING CODE"));
    }

    #[test]
    fn completion_failure_is_an_error() {
        let completion = Rc::new(ScriptedCompletion::new(vec![Err(CompletionError::new(
            "llm", "quota",
        ))]));
        let skill = CodeWriterSkill::new(CodeTask::Edit, completion, "");

        let err = skill.execute(&context_with(Map::new())).expect_err("fails");
        assert!(err.downcast_ref::<CompletionError>().is_some());
    }
}

//! Prompt rendering for the controller and the LLM-backed skills.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::{ChainSpec, ChatMessage, ControllerState};

const CONTROLLER_TEMPLATE: &str = include_str!("prompts/controller.md");
const FRED_DATA_TEMPLATE: &str = include_str!("prompts/fred_data.md");
const CODE_EDITOR_TEMPLATE: &str = include_str!("prompts/code_editor.md");
const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");

pub const CONTROLLER_SYSTEM: &str = "You are the Controller module for an AI assistant. \
Your role is to control the execution flow by generating a plan to invoke CHAINs with \
relevant instructions using natural language.";

pub const FRED_DATA_SYSTEM: &str = "You are an expert in the FRED economic database and \
in Python data engineering. You write short, correct scripts that fetch FRED series.";

pub const CODE_EDITOR_SYSTEM: &str = "You are an expert Python data analyst. You write and \
edit concise pandas and plotly code for data analysis and visualization.";

pub const CORRECTION_SYSTEM: &str = "You are an expert Python debugger. Given failing code \
and its error output, you return a corrected version of the complete program.";

pub const GENERAL_SYSTEM: &str = "You are a friendly, helpful assistant. Generate a brief \
response according to the provided instruction; 2 sentences at most.";

/// Droppable controller sections, least important first.
const DROP_ORDER: [&str; 2] = ["history", "hints"];

/// Section truncated when dropping is not enough.
const TRUNCATE_KEY: &str = "state";

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("controller", CONTROLLER_TEMPLATE)
            .expect("controller template should be valid");
        env.add_template("fred_data", FRED_DATA_TEMPLATE)
            .expect("fred_data template should be valid");
        env.add_template("code_editor", CODE_EDITOR_TEMPLATE)
            .expect("code_editor template should be valid");
        env.add_template("correction", CORRECTION_TEMPLATE)
            .expect("correction template should be valid");
        Self { env }
    }

    fn render_controller(&self, input: &ControllerPromptInputs<'_>) -> Result<String> {
        let state = serde_json::to_string(input.state).context("serialize controller state")?;
        let history: Vec<String> = input.history.iter().map(ToString::to_string).collect();
        let user_message = input
            .history
            .last()
            .map(ToString::to_string)
            .unwrap_or_default();
        let hints: Vec<&str> = input
            .hints
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();
        let template = self.env.get_template("controller")?;
        let rendered = template.render(context! {
            chains => input.chains,
            hints => hints,
            state => state,
            history => history,
            user_message => user_message,
            max_steps => input.max_steps,
        })?;
        Ok(rendered)
    }
}

/// Everything the controller prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct ControllerPromptInputs<'a> {
    pub chains: &'a [ChainSpec],
    pub hints: &'a [String],
    pub state: &'a ControllerState,
    /// Full conversation; the last entry is the current user message.
    pub history: &'a [ChatMessage],
    pub max_steps: usize,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker pattern should be valid")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(rendered.len());
        let content = rendered[*body_start..body_end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate [`TRUNCATE_KEY`].
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    if let Some(section) = sections.iter_mut().find(|s| s.key == TRUNCATE_KEY) {
        let excess = total - budget;
        let before_len = section.content.len();
        let keep = floor_char_boundary(&section.content, before_len.saturating_sub(excess + 12));
        section.content.truncate(keep);
        section.content.push_str("\n[truncated]");
        debug!(
            section = TRUNCATE_KEY,
            before_len,
            after_len = section.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the controller prompt within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_controller(&self, input: &ControllerPromptInputs<'_>) -> Result<String> {
        let rendered = PromptEngine::new().render_controller(input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

/// Which code-writing prompt to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTask {
    FredData,
    Edit,
}

impl CodeTask {
    pub fn system(self) -> &'static str {
        match self {
            CodeTask::FredData => FRED_DATA_SYSTEM,
            CodeTask::Edit => CODE_EDITOR_SYSTEM,
        }
    }

    fn template(self) -> &'static str {
        match self {
            CodeTask::FredData => "fred_data",
            CodeTask::Edit => "code_editor",
        }
    }
}

/// Render a code-writing prompt.
pub fn render_code_task(
    kind: CodeTask,
    task: &str,
    code_header: &str,
    existing_code: Option<&str>,
) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template(kind.template())?;
    let rendered = template.render(context! {
        task => task.trim(),
        code_header => code_header.trim(),
        existing_code => existing_code.map(str::trim).filter(|s| !s.is_empty()),
    })?;
    Ok(rendered)
}

/// Inputs for the error-correction prompt.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionInputs<'a> {
    pub history: &'a str,
    pub task: &'a str,
    pub code_header: &'a str,
    pub code: &'a str,
    pub error: &'a str,
}

pub fn render_correction(input: &CorrectionInputs<'_>) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template("correction")?;
    let rendered = template.render(context! {
        history => input.history.trim(),
        task => input.task.trim(),
        code_header => input.code_header.trim(),
        code => input.code,
        error => input.error.trim_end(),
    })?;
    Ok(rendered)
}

//! Agent configuration stored in `agent.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::planner::PlanLimits;
use crate::core::types::{ChainSpec, SelectionMode, SkillKind};
use crate::io::process::CommandLimits;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "agent.toml";

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Plan lines must score strictly above this.
    pub score_threshold: f64,

    /// Maximum delegations per planning round.
    pub max_plan_len: usize,

    /// Planning rounds allowed per user message.
    pub max_rounds: u32,

    /// Which round results are returned to the user.
    pub selection: SelectionMode,

    /// Operator hints included verbatim in the controller prompt.
    pub hints: Vec<String>,

    /// Header every generated script is expected to start with.
    pub code_header: String,

    /// Byte budget for the controller prompt before sections are dropped.
    pub prompt_budget_bytes: usize,

    /// Directory for per-round plan/result logs. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    pub completion: CompletionConfig,

    pub sandbox: SandboxConfig,

    pub chains: Vec<ChainConfig>,
}

/// External command that turns a prompt into a completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Program and arguments; the prompt is written to stdin.
    pub command: Vec<String>,

    /// Flag used to pass the system message as an argument. When unset the
    /// system message is prepended to the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_flag: Option<String>,

    pub timeout_secs: u64,

    pub output_limit_bytes: usize,

    /// Secondary command tried when the primary keeps failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_command: Option<Vec<String>>,

    /// Primary attempts on transient (503) failures before falling back.
    pub retry_before_fallback: u32,

    /// Base delay between transient retries, grown by 1.25x per retry.
    pub retry_backoff_ms: u64,
}

/// Subprocess settings for running generated code.
///
/// This is a best-effort guard against accidental misuse (timeouts, bounded
/// output, no stdin), not a security boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter binary, typically a virtualenv's `bin/python`.
    pub interpreter: PathBuf,

    /// Working directory for executions. Inherited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Wall-clock cap per execution attempt.
    pub timeout_secs: u64,

    pub output_limit_bytes: usize,

    /// Execution attempts before giving up on self-correction.
    pub retries: u32,
}

/// A chain: a named, ordered list of skills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    pub name: String,
    pub description: String,
    pub skills: Vec<SkillKind>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            system_flag: None,
            timeout_secs: 120,
            output_limit_bytes: 200_000,
            fallback_command: None,
            retry_before_fallback: 2,
            retry_backoff_ms: 1_000,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            workdir: None,
            timeout_secs: 60,
            output_limit_bytes: 100_000,
            retries: 3,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            max_plan_len: 10,
            max_rounds: 1,
            selection: SelectionMode::All,
            hints: Vec::new(),
            code_header: "import pandas as pd\nimport plotly.express as px\n".to_string(),
            prompt_budget_bytes: 40_000,
            log_dir: None,
            completion: CompletionConfig::default(),
            sandbox: SandboxConfig::default(),
            chains: default_chains(),
        }
    }
}

fn chain(name: &str, description: &str, skills: &[SkillKind]) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        description: description.to_string(),
        skills: skills.to_vec(),
    }
}

/// The stock catalogue: FRED retrieval, code editing/execution, general Q&A.
pub fn default_chains() -> Vec<ChainConfig> {
    use SkillKind::{CodeEditor, FredData, General, ParsePython, PythonExecution};

    vec![
        chain(
            "fred_data_specialist",
            "Identify and access economic datasets from the FRED database. Use this chain when you need to generate or edit code for accessing or downloading data from FRED.",
            &[FredData, ParsePython],
        ),
        chain(
            "data_analysis_code_editing",
            "Generate/edit (but do not execute) Python code for data analytics and visualization. Use this chain if the user wants to generate new code or edit existing code related to data analysis.",
            &[CodeEditor, ParsePython],
        ),
        chain(
            "data_analysis_code_editing_and_execution",
            "Generate/edit and execute existing Python code for data analytics and visualization. Use this chain if the user wants to generate new code or edit existing code related to data analysis.",
            &[CodeEditor, ParsePython, PythonExecution],
        ),
        chain(
            "code_execution_and_correction",
            "Execute (but do not edit) existing Python code for data analytics and visualization. Use this chain if the user wants to run existing code.",
            &[ParsePython, PythonExecution],
        ),
        chain(
            "general",
            "Answer general questions without the use of any specialized skills. Use this when the user needs the answer to a question that doesn't require any coding.",
            &[General],
        ),
    ]
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.score_threshold.is_finite() {
            return Err(anyhow!("score_threshold must be finite"));
        }
        if self.max_plan_len == 0 {
            return Err(anyhow!("max_plan_len must be > 0"));
        }
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        self.completion.validate()?;
        self.sandbox.validate()?;

        let mut seen = HashSet::new();
        for chain in &self.chains {
            let name = chain.name.trim();
            if name.is_empty() || name != chain.name || chain.name.contains(';') {
                return Err(anyhow!(
                    "chain name '{}' must be non-empty, trimmed and free of ';'",
                    chain.name
                ));
            }
            if !seen.insert(name) {
                return Err(anyhow!("duplicate chain name '{name}'"));
            }
            if chain.skills.is_empty() {
                return Err(anyhow!("chain '{name}' must list at least one skill"));
            }
        }
        Ok(())
    }

    /// Catalogue entries shown to the controller, in config order.
    pub fn catalogue(&self) -> Vec<ChainSpec> {
        self.chains
            .iter()
            .map(|chain| ChainSpec {
                name: chain.name.clone(),
                description: chain.description.clone(),
            })
            .collect()
    }

    pub fn plan_limits(&self) -> PlanLimits {
        PlanLimits {
            score_threshold: self.score_threshold,
            max_plan_len: self.max_plan_len,
        }
    }
}

impl CompletionConfig {
    fn validate(&self) -> Result<()> {
        validate_command("completion.command", &self.command)?;
        if let Some(fallback) = &self.fallback_command {
            validate_command("completion.fallback_command", fallback)?;
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("completion.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

impl SandboxConfig {
    fn validate(&self) -> Result<()> {
        if self.interpreter.as_os_str().is_empty() {
            return Err(anyhow!("sandbox.interpreter must be set"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if self.retries == 0 {
            return Err(anyhow!("sandbox.retries must be > 0"));
        }
        Ok(())
    }

    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

fn validate_command(field: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{field} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        let cfg = AgentConfig {
            log_dir: Some(PathBuf::from("logs")),
            hints: vec!["Prefer monthly data.".to_string()],
            selection: SelectionMode::Best,
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "max_plan_len = 3\n\n[sandbox]\nretries = 5\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_plan_len, 3);
        assert_eq!(cfg.sandbox.retries, 5);
        assert_eq!(cfg.sandbox.timeout_secs, 60);
        assert_eq!(cfg.chains, default_chains());
    }

    #[test]
    fn rejects_duplicate_chain_names() {
        let mut cfg = AgentConfig::default();
        cfg.chains.push(cfg.chains[0].clone());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate chain name"));
    }

    #[test]
    fn rejects_zero_retries() {
        let mut cfg = AgentConfig::default();
        cfg.sandbox.retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn catalogue_follows_config_order() {
        let names: Vec<String> = AgentConfig::default()
            .catalogue()
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("fred_data_specialist"));
        assert_eq!(names.last().map(String::as_str), Some("general"));
    }
}

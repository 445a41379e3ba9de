//! Shared deterministic types for the controller and chains.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the controller records the current round.
pub const ITERATION_KEY: &str = "iteration";

/// Key under which chains exchange the current Python source.
pub const CODE_KEY: &str = "code";

/// Controller-owned state carried across planning rounds.
///
/// Always contains `iteration`. Delegations receive clones, so nothing outside
/// the aggregator can change the live copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerState(Map<String, Value>);

impl Default for ControllerState {
    fn default() -> Self {
        let mut map = Map::new();
        map.insert(ITERATION_KEY.to_string(), Value::from(0u64));
        Self(map)
    }
}

impl ControllerState {
    /// Build state from a raw map, inserting `iteration = 0` when missing.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        if !map.get(ITERATION_KEY).is_some_and(Value::is_u64) {
            map.insert(ITERATION_KEY.to_string(), Value::from(0u64));
        }
        Self(map)
    }

    pub fn iteration(&self) -> u64 {
        self.0
            .get(ITERATION_KEY)
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    pub(crate) fn set_iteration(&mut self, iteration: u64) {
        self.0
            .insert(ITERATION_KEY.to_string(), Value::from(iteration));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Current code, if the state holds a string under `code`.
    pub fn code(&self) -> Option<&str> {
        self.0.get(CODE_KEY).and_then(Value::as_str)
    }

    /// Replace the code held in state. `None` stores JSON null.
    pub fn set_code(&mut self, code: Option<String>) {
        let value = code.map(Value::String).unwrap_or(Value::Null);
        self.0.insert(CODE_KEY.to_string(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Catalogue entry describing a chain to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub name: String,
    pub description: String,
}

/// One scheduled invocation of a chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delegation {
    /// Name of the chain to run.
    pub target: String,
    /// Execution order declared by the controller LLM.
    pub order: i64,
    /// Natural-language instruction for the chain.
    pub instruction: String,
    /// Snapshot of controller state at planning time.
    pub state: ControllerState,
}

/// Outcome reported back by a delegation's final chain step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationResult {
    /// Chain that produced the result.
    pub chain: String,
    pub score: f64,
    pub message: String,
    /// State-shaped payload. Anything other than a JSON object is malformed.
    pub data: Value,
    pub is_error: bool,
}

impl DelegationResult {
    /// Iteration the result was produced under, read from `data.iteration`.
    pub fn iteration_tag(&self) -> Option<u64> {
        self.data.get(ITERATION_KEY).and_then(Value::as_u64)
    }
}

/// How the aggregator picks results to return after a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Every result from the current iteration.
    #[default]
    All,
    /// Only the highest-scoring result.
    Best,
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role.as_str(), self.text)
    }
}

/// Skill kinds a chain can be assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    /// LLM writes code that pulls series from FRED.
    FredData,
    /// LLM writes or edits analysis code.
    CodeEditor,
    /// Extract runnable code from LLM output.
    ParsePython,
    /// Run code with LLM self-correction.
    PythonExecution,
    /// Plain LLM answer.
    General,
}

/// Captured result of one subprocess run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when killed by a signal.
    pub returncode: Option<i32>,
    pub timed_out: bool,
}

//! Parsing of controller plan lines (`name;score;instruction`).

use crate::core::types::ChainSpec;

/// Field separator in plan lines.
pub const PLAN_DELIMITER: char = ';';

/// Line the controller LLM emits when no chain applies.
pub const NO_DELEGATION: &str = "unknown";

/// A plan line that names a known chain and carries an integer score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine {
    pub target: String,
    pub score: i64,
    pub instruction: String,
}

impl PlanLine {
    /// Render back to wire format.
    pub fn format(&self) -> String {
        format!(
            "{}{PLAN_DELIMITER}{}{PLAN_DELIMITER}{}",
            self.target, self.score, self.instruction
        )
    }
}

/// Parse one line of controller output.
///
/// Returns `None` for `unknown`, for lines with fewer than three fields, for
/// unknown chain names (exact match) and for non-integer scores. The
/// instruction is everything after the second delimiter, so it may itself
/// contain `;`.
pub fn parse_plan_line(line: &str, chains: &[ChainSpec]) -> Option<PlanLine> {
    if line == NO_DELEGATION {
        return None;
    }

    let mut fields = line.splitn(3, PLAN_DELIMITER);
    let name = fields.next()?;
    let score = fields.next()?;
    let instruction = fields.next()?;

    let chain = chains.iter().find(|chain| chain.name == name)?;
    let score = score.trim().parse::<i64>().ok()?;

    Some(PlanLine {
        target: chain.name.clone(),
        score,
        instruction: instruction.to_string(),
    })
}

//! Turning a raw controller response into an ordered plan.

use tracing::debug;

use crate::core::plan_parser::{PlanLine, parse_plan_line};
use crate::core::types::{ChainSpec, ControllerState, Delegation};

/// Limits applied while building a plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanLimits {
    /// Lines must score strictly above this to be kept.
    pub score_threshold: f64,
    /// Maximum number of delegations in a plan.
    pub max_plan_len: usize,
}

/// Parse every line of `response` and build delegations.
///
/// Malformed lines are dropped. Kept lines are sorted ascending by score
/// (stable, so equal scores keep response order) and then truncated to
/// `max_plan_len`. Each delegation gets its own clone of `state`.
pub fn build_plan(
    response: &str,
    chains: &[ChainSpec],
    state: &ControllerState,
    limits: PlanLimits,
) -> Vec<Delegation> {
    let mut accepted: Vec<PlanLine> = Vec::new();
    for raw in response.lines() {
        let line = raw.trim();
        match parse_plan_line(line, chains) {
            Some(parsed) if (parsed.score as f64) > limits.score_threshold => {
                accepted.push(parsed);
            }
            Some(parsed) => debug!(line, score = parsed.score, "plan line below threshold"),
            None => debug!(line, "plan line ignored"),
        }
    }

    accepted.sort_by_key(|line| line.score);

    accepted
        .into_iter()
        .take(limits.max_plan_len)
        .map(|line| Delegation {
            target: line.target,
            order: line.score,
            instruction: line.instruction,
            state: state.clone(),
        })
        .collect()
}

/// Render a plan as wire-format lines joined by `<SEP>`.
pub fn describe_plan(plan: &[Delegation]) -> String {
    plan.iter()
        .map(|delegation| {
            PlanLine {
                target: delegation.target.clone(),
                score: delegation.order,
                instruction: delegation.instruction.clone(),
            }
            .format()
        })
        .collect::<Vec<_>>()
        .join("<SEP>")
}

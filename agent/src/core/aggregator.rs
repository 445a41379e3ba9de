//! Folding delegation results back into controller state.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::types::{ControllerState, DelegationResult, SelectionMode};

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// State after merging, with `iteration` advanced by one.
    pub state: ControllerState,
    /// Results returned to the caller per the selection mode.
    pub selected: Vec<DelegationResult>,
    /// Results dropped because they belong to another iteration.
    pub stale: usize,
    /// Results dropped because their data is not a JSON object.
    pub malformed: usize,
}

/// Merge `updates` into `base` in order; later keys overwrite earlier ones.
pub fn merge_states<'a>(
    base: &ControllerState,
    updates: impl IntoIterator<Item = &'a Map<String, Value>>,
) -> ControllerState {
    let mut merged = base.as_map().clone();
    for update in updates {
        for (key, value) in update {
            merged.insert(key.clone(), value.clone());
        }
    }
    ControllerState::from_map(merged)
}

/// Keep current-iteration results, merge them, and advance the iteration.
///
/// The iteration is incremented even when nothing is retained.
pub fn aggregate(
    state: &ControllerState,
    results: Vec<DelegationResult>,
    mode: SelectionMode,
) -> Aggregation {
    let current = state.iteration();
    let mut retained = Vec::with_capacity(results.len());
    let mut stale = 0usize;
    let mut malformed = 0usize;

    for result in results {
        if !result.data.is_object() {
            debug!(chain = %result.chain, "skipping result with non-object data");
            malformed += 1;
            continue;
        }
        if result.iteration_tag() != Some(current) {
            debug!(
                chain = %result.chain,
                tag = ?result.iteration_tag(),
                current,
                "dropping stale result"
            );
            stale += 1;
            continue;
        }
        retained.push(result);
    }

    let mut next = merge_states(
        state,
        retained.iter().filter_map(|result| result.data.as_object()),
    );
    next.set_iteration(current + 1);

    let selected = match mode {
        SelectionMode::All => retained,
        SelectionMode::Best => best_result(retained).into_iter().collect(),
    };

    Aggregation {
        state: next,
        selected,
        stale,
        malformed,
    }
}

/// Highest score wins; the earliest result wins ties.
fn best_result(results: Vec<DelegationResult>) -> Option<DelegationResult> {
    let mut best: Option<DelegationResult> = None;
    for result in results {
        match &best {
            Some(current) if current.score >= result.score => {}
            _ => best = Some(result),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::result_at;
    use serde_json::json;

    fn state_at(iteration: u64) -> ControllerState {
        let mut state = ControllerState::default();
        state.set_iteration(iteration);
        state
    }

    #[test]
    fn increments_iteration_with_no_results() {
        let aggregation = aggregate(&state_at(3), Vec::new(), SelectionMode::All);
        assert_eq!(aggregation.state.iteration(), 4);
        assert!(aggregation.selected.is_empty());
    }

    #[test]
    fn increments_iteration_by_exactly_one() {
        for count in 0..4u64 {
            let results = (0..count)
                .map(|i| result_at("general", 2, i as f64, json!({"k": i})))
                .collect();
            let aggregation = aggregate(&state_at(2), results, SelectionMode::All);
            assert_eq!(aggregation.state.iteration(), 3);
        }
    }

    #[test]
    fn stale_results_are_never_merged() {
        let results = vec![
            result_at("general", 0, 1.0, json!({"old": true})),
            result_at("general", 1, 1.0, json!({"fresh": true})),
        ];
        let aggregation = aggregate(&state_at(1), results, SelectionMode::All);

        assert_eq!(aggregation.stale, 1);
        assert_eq!(aggregation.selected.len(), 1);
        assert_eq!(aggregation.state.get("fresh"), Some(&json!(true)));
        assert_eq!(aggregation.state.get("old"), None);
    }

    #[test]
    fn later_results_win_on_collision() {
        let results = vec![
            result_at("a", 0, 1.0, json!({"code": "first", "a": 1})),
            result_at("b", 0, 1.0, json!({"code": "second", "b": 2})),
        ];
        let aggregation = aggregate(&state_at(0), results, SelectionMode::All);

        assert_eq!(aggregation.state.code(), Some("second"));
        assert_eq!(aggregation.state.get("a"), Some(&json!(1)));
        assert_eq!(aggregation.state.get("b"), Some(&json!(2)));
    }

    #[test]
    fn malformed_data_is_skipped() {
        let mut bad = result_at("general", 0, 5.0, json!({}));
        bad.data = json!("not a map");
        let good = result_at("general", 0, 1.0, json!({"ok": 1}));

        let aggregation = aggregate(&state_at(0), vec![bad, good], SelectionMode::All);
        assert_eq!(aggregation.malformed, 1);
        assert_eq!(aggregation.selected.len(), 1);
        assert_eq!(aggregation.state.iteration(), 1);
    }

    #[test]
    fn best_mode_returns_highest_score_first_on_ties() {
        let results = vec![
            result_at("a", 0, 2.0, json!({})),
            result_at("b", 0, 7.0, json!({})),
            result_at("c", 0, 7.0, json!({})),
        ];
        let aggregation = aggregate(&state_at(0), results, SelectionMode::Best);
        assert_eq!(aggregation.selected.len(), 1);
        assert_eq!(aggregation.selected[0].chain, "b");
    }

    #[test]
    fn merge_does_not_touch_base() {
        let base = state_at(0);
        let update = json!({"x": 1});
        let merged = merge_states(&base, [update.as_object().expect("object")]);
        assert_eq!(base.get("x"), None);
        assert_eq!(merged.get("x"), Some(&json!(1)));
    }
}

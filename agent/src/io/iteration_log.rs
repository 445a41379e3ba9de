//! Per-round plan/result logs under the configured `log_dir`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{Delegation, DelegationResult};

#[derive(Debug, Clone)]
pub struct RoundPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub results_path: PathBuf,
}

impl RoundPaths {
    pub fn new(log_dir: &Path, iteration: u64) -> Self {
        let dir = log_dir.join(iteration.to_string());
        Self {
            plan_path: dir.join("plan.json"),
            results_path: dir.join("results.json"),
            dir,
        }
    }
}

/// Write the plan and raw results of one round.
pub fn write_round(
    log_dir: &Path,
    iteration: u64,
    plan: &[Delegation],
    results: &[DelegationResult],
) -> Result<RoundPaths> {
    let paths = RoundPaths::new(log_dir, iteration);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create round dir {}", paths.dir.display()))?;

    write_json(&paths.plan_path, &plan)?;
    write_json(&paths.results_path, &results)?;

    Ok(paths)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ControllerState;
    use crate::test_support::result_at;
    use serde_json::{Value, json};

    #[test]
    fn writes_plan_and_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = vec![Delegation {
            target: "general".to_string(),
            order: 1,
            instruction: "say hi".to_string(),
            state: ControllerState::default(),
        }];
        let results = vec![result_at("general", 0, 1.0, json!({"k": "v"}))];

        let paths = write_round(temp.path(), 0, &plan, &results).expect("write");
        assert!(paths.dir.ends_with("0"));

        let plan_json: Value =
            serde_json::from_str(&fs::read_to_string(&paths.plan_path).expect("read"))
                .expect("parse");
        assert_eq!(plan_json[0]["target"], "general");
        assert_eq!(plan_json[0]["state"]["iteration"], 0);

        let results_raw = fs::read_to_string(&paths.results_path).expect("read");
        assert!(results_raw.ends_with('\n'));
        let results_json: Value = serde_json::from_str(&results_raw).expect("parse");
        assert_eq!(results_json[0]["data"]["k"], "v");
    }
}

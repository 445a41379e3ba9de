//! The planning controller.
//!
//! Owns [`ControllerState`] across rounds. Planning reads it (each delegation
//! gets a snapshot); only [`Controller::select_responses`] writes it.

use std::rc::Rc;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument};

use crate::core::aggregator::aggregate;
use crate::core::planner::{PlanLimits, build_plan, describe_plan};
use crate::core::types::{
    ChainSpec, ChatMessage, ControllerState, Delegation, DelegationResult, SelectionMode,
};
use crate::io::completion::Completion;
use crate::io::config::AgentConfig;
use crate::io::prompt::{CONTROLLER_SYSTEM, ControllerPromptInputs, PromptBuilder};

pub struct Controller {
    completion: Rc<dyn Completion>,
    prompts: PromptBuilder,
    hints: Vec<String>,
    limits: PlanLimits,
    selection: SelectionMode,
    state: ControllerState,
}

impl Controller {
    pub fn new(completion: Rc<dyn Completion>, cfg: &AgentConfig) -> Self {
        Self {
            completion,
            prompts: PromptBuilder::new(cfg.prompt_budget_bytes),
            hints: cfg.hints.clone(),
            limits: cfg.plan_limits(),
            selection: cfg.selection,
            state: ControllerState::default(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn set_code(&mut self, code: Option<String>) {
        self.state.set_code(code);
    }

    /// Forget everything learned so far.
    pub fn reset(&mut self) {
        self.state = ControllerState::default();
    }

    /// Ask the model for a plan. `history` must end with the user message
    /// being answered.
    ///
    /// An empty plan means "nothing to do". Completion failures are returned
    /// as [`crate::io::completion::CompletionError`].
    #[instrument(skip_all, fields(iteration = self.state.iteration(), chains = chains.len()))]
    pub fn plan(&self, history: &[ChatMessage], chains: &[ChainSpec]) -> Result<Vec<Delegation>> {
        if history.is_empty() {
            bail!("cannot plan without a user message");
        }

        let prompt = self.prompts.build_controller(&ControllerPromptInputs {
            chains,
            hints: &self.hints,
            state: &self.state,
            history,
            max_steps: self.limits.max_plan_len,
        })?;
        debug!(prompt_bytes = prompt.len(), "controller prompt built");

        let response = self
            .completion
            .complete(CONTROLLER_SYSTEM, &prompt)
            .map_err(anyhow::Error::new)?;
        info!(response = %response, "controller llm response");

        let plan = build_plan(&response, chains, &self.state, self.limits);
        info!(delegations = plan.len(), plan = %describe_plan(&plan), "controller plan");
        Ok(plan)
    }

    /// Fold a round's results into state and return the ones to show.
    ///
    /// Always advances the iteration, so results from this round are stale
    /// from now on.
    pub fn select_responses(&mut self, results: Vec<DelegationResult>) -> Vec<DelegationResult> {
        let aggregation = aggregate(&self.state, results, self.selection);
        debug!(
            iteration = aggregation.state.iteration(),
            selected = aggregation.selected.len(),
            stale = aggregation.stale,
            malformed = aggregation.malformed,
            "round aggregated"
        );
        self.state = aggregation.state;
        aggregation.selected
    }
}

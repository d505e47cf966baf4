//! Loop budgets and termination tracking

use serde::{Deserialize, Serialize};

use crate::domain::retrieval::{Context, Passage};

/// Why a loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Still running, or the strategy has no loop
    #[default]
    None,
    BudgetExhausted,
    ExplicitStop,
    RelevantFound,
    /// Caller cancellation or deadline
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BudgetExhausted => "budget_exhausted",
            Self::ExplicitStop => "explicit_stop",
            Self::RelevantFound => "relevant_found",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Loop progress for a single workflow run.
///
/// Steps read it freely; all mutation goes through [`IterationController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    iteration: u32,
    max_iterations: u32,
    history: Context,
    termination: TerminationReason,
}

impl IterationState {
    /// Completed iterations
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Every passage seen across iterations, without duplicates
    pub fn history(&self) -> &Context {
        &self.history
    }

    pub fn termination(&self) -> TerminationReason {
        self.termination
    }

    pub fn is_terminated(&self) -> bool {
        self.termination != TerminationReason::None
    }

    /// Whether another iteration may start
    pub fn can_continue(&self) -> bool {
        !self.is_terminated() && self.iteration < self.max_iterations
    }
}

impl Default for IterationState {
    fn default() -> Self {
        IterationController::start(1)
    }
}

/// Sole mutator of [`IterationState`]
pub struct IterationController;

impl IterationController {
    /// Fresh state with the given budget (at least one iteration)
    pub fn start(max_iterations: u32) -> IterationState {
        IterationState {
            iteration: 0,
            max_iterations: max_iterations.max(1),
            history: Context::new(),
            termination: TerminationReason::None,
        }
    }

    /// Mark one iteration complete.
    ///
    /// Returns whether another iteration may run; when the budget is spent
    /// the termination reason becomes `BudgetExhausted`.
    pub fn complete_iteration(state: &mut IterationState) -> bool {
        if state.is_terminated() {
            return false;
        }

        state.iteration += 1;
        if state.iteration >= state.max_iterations {
            state.termination = TerminationReason::BudgetExhausted;
            return false;
        }
        true
    }

    /// Stop the loop for `reason`. An earlier reason is kept.
    pub fn stop(state: &mut IterationState, reason: TerminationReason) {
        if !state.is_terminated() {
            state.termination = reason;
        }
    }

    /// Add passages to the history. Returns how many were new.
    pub fn record(state: &mut IterationState, passages: impl IntoIterator<Item = Passage>) -> usize {
        state.history.merge(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows_exactly_n_iterations() {
        let mut state = IterationController::start(3);
        let mut runs = 0;

        loop {
            assert!(state.can_continue());
            runs += 1;
            if !IterationController::complete_iteration(&mut state) {
                break;
            }
        }

        assert_eq!(runs, 3);
        assert_eq!(state.iteration(), 3);
        assert_eq!(state.termination(), TerminationReason::BudgetExhausted);
        assert!(!state.can_continue());
    }

    #[test]
    fn test_stop_keeps_first_reason() {
        let mut state = IterationController::start(5);
        IterationController::stop(&mut state, TerminationReason::ExplicitStop);
        IterationController::stop(&mut state, TerminationReason::RelevantFound);

        assert_eq!(state.termination(), TerminationReason::ExplicitStop);
        assert!(!IterationController::complete_iteration(&mut state));
        assert_eq!(state.iteration(), 0);
    }

    #[test]
    fn test_zero_budget_is_raised_to_one() {
        let state = IterationController::start(0);
        assert_eq!(state.max_iterations(), 1);
    }

    #[test]
    fn test_record_deduplicates_history() {
        let mut state = IterationController::start(2);
        let added = IterationController::record(
            &mut state,
            vec![Passage::new("a", "1"), Passage::new("a", "2")],
        );
        assert_eq!(added, 1);
        assert_eq!(state.history().len(), 1);
    }
}

//! Stop criteria: predicates that close a node without expanding it.

use stpn_core::Time;
use stpn_math::ExactReal;
use stpn_state::{Marking, State};

/// Decides whether a popped node should be expanded.
pub trait StopCriterion {
    /// True when the node must not be expanded.
    fn should_stop(&self, state: &State) -> bool;
}

/// Never stops (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl StopCriterion for Never {
    fn should_stop(&self, _state: &State) -> bool {
        false
    }
}

/// Stops on states whose marking satisfies a condition.
pub struct MarkingConditionStop<F>(pub F);

impl<F: Fn(&Marking) -> bool> StopCriterion for MarkingConditionStop<F> {
    fn should_stop(&self, state: &State) -> bool {
        state.marking().is_some_and(|m| (self.0)(m))
    }
}

/// Stops on regenerations (used by between-regenerations trees; the root
/// regeneration itself is expanded).
#[derive(Debug, Clone, Copy, Default)]
pub struct RegenerationStop;

impl StopCriterion for RegenerationStop {
    fn should_stop(&self, state: &State) -> bool {
        state.is_regeneration()
    }
}

/// Stops once the class can only be entered after the time bound.
#[derive(Debug, Clone)]
pub struct TimeBoundStop {
    bound: ExactReal,
}

impl TimeBoundStop {
    /// Stop past the given bound.
    pub fn new(bound: Time) -> Self {
        TimeBoundStop {
            bound: ExactReal::from_f64(bound).unwrap_or_else(ExactReal::positive_infinity),
        }
    }
}

impl StopCriterion for TimeBoundStop {
    fn should_stop(&self, state: &State) -> bool {
        state
            .transient
            .as_ref()
            .is_some_and(|t| t.entering_time_lower > self.bound)
    }
}

/// Any-of combination of criteria.
pub struct AnyStop(pub Vec<Box<dyn StopCriterion>>);

impl StopCriterion for AnyStop {
    fn should_stop(&self, state: &State) -> bool {
        self.0.iter().any(|c| c.should_stop(state))
    }
}

impl<S: StopCriterion + ?Sized> StopCriterion for Box<S> {
    fn should_stop(&self, state: &State) -> bool {
        (**self).should_stop(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_condition_stop() {
        let stop = MarkingConditionStop(|m: &Marking| m.get("done") > 0);
        let mut state = State::new();
        state.petri = Some(stpn_state::PetriStateFeature {
            marking: Marking::new().with("done", 1),
            enabled: Default::default(),
            newly_enabled: Default::default(),
        });
        assert!(stop.should_stop(&state));
    }

    #[test]
    fn never_does_not_stop() {
        assert!(!Never.should_stop(&State::new()));
    }
}

//! The state feature bag.
//!
//! A state is a bag of named features. The well-known ones are typed
//! fields of [`State`]: the Petri feature (marking and enabling sets), the
//! stochastic feature (joint timer density), the transient feature
//! (reaching probability and entering-time bounds), the regeneration
//! marker, and the local-stop flag. Equality and hashing are value-based
//! over the present features; a state is never mutated after insertion
//! into a succession graph.

use crate::marking::Marking;
use crate::net::Transition;
use num_rational::BigRational;
use std::collections::{BTreeMap, BTreeSet};
use stpn_core::{Result, Time};
use stpn_math::expol::Variable;
use stpn_math::{ExactReal, StateDensity};

/// Marking, enabled transitions, and newly-enabled transitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PetriStateFeature {
    /// The current marking.
    pub marking: Marking,
    /// The transitions enabled in the marking.
    pub enabled: BTreeSet<Transition>,
    /// The subset of `enabled` that was enabled by the last firing.
    pub newly_enabled: BTreeSet<Transition>,
}

/// The joint timer density of a state class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StochasticStateFeature {
    /// Joint density over the enabled timers (plus the age clock in
    /// transient analysis).
    pub density: StateDensity,
    /// Rates of the exponential timers, by timer variable.
    pub exp_rates: BTreeMap<Variable, BigRational>,
    /// True when an immediate transition is enabled.
    pub vanishing: bool,
    /// True when no transition is enabled.
    pub absorbing: bool,
}

impl StochasticStateFeature {
    /// The rate of an exponential timer, if `v` is one.
    pub fn exp_rate(&self, v: &Variable) -> Option<&BigRational> {
        self.exp_rates.get(v)
    }

    /// The mean of a timer.
    pub fn mean_value(&self, v: &Variable) -> Result<ExactReal> {
        self.density.mean_value(v)
    }

    /// Condition the density to `v` being the first timer to expire.
    pub fn condition_to_minimum(
        &self,
        v: &Variable,
        others: &[Variable],
    ) -> Result<Option<(StateDensity, ExactReal)>> {
        self.density.condition_to_minimum(v, others)
    }

    /// The lowest value `a − b` can take.
    pub fn min_bound(&self, a: &Variable, b: &Variable) -> ExactReal {
        self.density.min_bound(a, b)
    }

    /// The timer variables, excluding the age clock.
    pub fn timers(&self) -> Vec<Variable> {
        self.density
            .variables()
            .iter()
            .filter(|v| !v.is_age())
            .cloned()
            .collect()
    }
}

/// Reaching probability and entering-time information for transient
/// analysis.
///
/// The age clock lives inside the joint density (negated, so the absolute
/// expiration of a timer `x` is the difference `x − age`); this feature
/// carries the scalar reaching probability and the entering-time bounds
/// used for kernel clipping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransientStochasticStateFeature {
    /// Probability of reaching this class from the root.
    pub reaching_probability: ExactReal,
    /// Infimum of the entering time.
    pub entering_time_lower: ExactReal,
    /// Supremum of the entering time.
    pub entering_time_upper: ExactReal,
}

impl TransientStochasticStateFeature {
    /// Probability that the class has been entered by `t`, given the
    /// class was reached: the mass of `{−age ≤ t}`.
    pub fn visited_probability(
        &self,
        stochastic: &StochasticStateFeature,
        t: Time,
    ) -> Result<ExactReal> {
        let age = Variable::age();
        if !stochastic.density.has_variable(&age) {
            return Ok(ExactReal::zero());
        }
        let bound = ExactReal::from_f64(t).unwrap_or_else(ExactReal::zero);
        stochastic
            .density
            .probability_of(&[(Variable::ground(), age.clone(), bound)])
    }

    /// Probability of being in the class at `t`, given the class was
    /// reached: the mass of `{−age ≤ t} ∩ {x − age ≥ t ∀ timers x}`.
    pub fn being_probability(
        &self,
        stochastic: &StochasticStateFeature,
        t: Time,
    ) -> Result<ExactReal> {
        let age = Variable::age();
        if !stochastic.density.has_variable(&age) {
            return Ok(ExactReal::zero());
        }
        let bound = ExactReal::from_f64(t).unwrap_or_else(ExactReal::zero);
        let mut constraints = vec![(Variable::ground(), age.clone(), bound.clone())];
        for timer in stochastic.timers() {
            // x − age ≥ t  ⟺  age − x ≤ −t
            constraints.push((age.clone(), timer, -bound.clone()));
        }
        stochastic.density.probability_of(&constraints)
    }
}

/// The deterministic enabling state that identifies a regeneration: the
/// marking plus the elapsed enabling times of the non-exponential enabled
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeterministicEnablingState {
    /// The marking at the regeneration.
    pub marking: Marking,
    /// Elapsed enabling time of each non-exponential enabled transition.
    pub enabling_times: BTreeMap<Transition, ExactReal>,
}

impl DeterministicEnablingState {
    /// A regeneration in which every non-exponential enabled transition is
    /// newly enabled.
    pub fn fresh(marking: Marking, non_exp_enabled: impl IntoIterator<Item = Transition>) -> Self {
        DeterministicEnablingState {
            marking,
            enabling_times: non_exp_enabled
                .into_iter()
                .map(|t| (t, ExactReal::zero()))
                .collect(),
        }
    }
}

/// The regeneration feature: the renewal value attached to a state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regeneration(pub DeterministicEnablingState);

/// A state: an ordered bag of features.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct State {
    /// Marking and enabling sets.
    pub petri: Option<PetriStateFeature>,
    /// Joint timer density.
    pub stochastic: Option<StochasticStateFeature>,
    /// Transient reaching/entering information.
    pub transient: Option<TransientStochasticStateFeature>,
    /// Renewal marker.
    pub regeneration: Option<Regeneration>,
    /// Terminal for local computation.
    pub local_stop: bool,
}

impl State {
    /// An empty feature bag.
    pub fn new() -> Self {
        State::default()
    }

    /// The marking, when the Petri feature is present.
    pub fn marking(&self) -> Option<&Marking> {
        self.petri.as_ref().map(|p| &p.marking)
    }

    /// True when the state carries a regeneration.
    pub fn is_regeneration(&self) -> bool {
        self.regeneration.is_some()
    }

    /// True when the stochastic feature says no transition is enabled.
    pub fn is_absorbing(&self) -> bool {
        self.stochastic.as_ref().is_some_and(|s| s.absorbing)
    }

    /// True when an immediate transition is enabled.
    pub fn is_vanishing(&self) -> bool {
        self.stochastic.as_ref().is_some_and(|s| s.vanishing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_compare_by_feature_values() {
        let a = State {
            petri: Some(PetriStateFeature {
                marking: Marking::new().with("p", 1),
                enabled: BTreeSet::new(),
                newly_enabled: BTreeSet::new(),
            }),
            ..State::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.local_stop = true;
        assert_ne!(a, b);
    }

    #[test]
    fn fresh_enabling_state_has_zero_times() {
        let d = DeterministicEnablingState::fresh(
            Marking::new().with("p", 1),
            [Transition::new("det")],
        );
        assert_eq!(
            d.enabling_times.get(&Transition::new("det")),
            Some(&ExactReal::zero())
        );
    }
}

//! Succession rules: from one stochastic state class to its successors.
//!
//! Firing an enabled transition `t` conditions the joint density to
//! `x_t ≤ x_u` for every other enabled timer, rebases the surviving timers
//! on the firing instant, integrates the fired timer out, drops the timers
//! of disabled transitions, and multiplies in fresh densities for the
//! newly enabled ones. Immediate transitions preempt timed ones: in a
//! vanishing state only the immediate transitions with the maximum
//! marking-evaluated weight can fire, with probabilities given by their
//! normalized weights.

use crate::feature::{
    DeterministicEnablingState, PetriStateFeature, Regeneration, State, StochasticStateFeature,
    TransientStochasticStateFeature,
};
use crate::marking::Marking;
use crate::net::{DelayDistribution, StochasticNet, Transition};
use num_rational::BigRational;
use std::collections::{BTreeMap, BTreeSet};
use stpn_core::{ensure, fail, Error, IndeterminatePolicy, Result};
use stpn_math::expol::Variable;
use stpn_math::{ExactReal, StateDensity};

/// One computed successor: the fired transition, its probability, and the
/// child state.
#[derive(Debug, Clone)]
pub struct Succession {
    /// The fired transition.
    pub fired: Transition,
    /// The firing probability from the parent class.
    pub probability: ExactReal,
    /// The successor state.
    pub child: State,
}

/// Computes initial states and successors against a collaborating net.
#[derive(Debug, Clone)]
pub struct SuccessionEvaluator<'a, N> {
    net: &'a N,
    transient: bool,
    indeterminate: IndeterminatePolicy,
}

impl<'a, N: StochasticNet> SuccessionEvaluator<'a, N> {
    /// An evaluator for untimed (class-graph) enumeration.
    pub fn new(net: &'a N) -> Self {
        SuccessionEvaluator {
            net,
            transient: false,
            indeterminate: IndeterminatePolicy::FailFast,
        }
    }

    /// An evaluator that threads the age clock for transient analysis.
    pub fn transient(net: &'a N) -> Self {
        SuccessionEvaluator {
            net,
            transient: true,
            indeterminate: IndeterminatePolicy::FailFast,
        }
    }

    /// Choose how indeterminate exact-arithmetic forms are resolved.
    pub fn with_indeterminate_policy(mut self, policy: IndeterminatePolicy) -> Self {
        self.indeterminate = policy;
        self
    }

    /// Build the initial state class for a marking with every enabled
    /// transition newly enabled.
    pub fn initial_state(&self, marking: &Marking) -> Result<State> {
        let enabled: BTreeSet<Transition> = self.net.enabled(marking).into_iter().collect();
        let mut density = StateDensity::unit();
        let mut exp_rates = BTreeMap::new();
        for t in &enabled {
            if let Some((fresh, rate)) = self.fresh_timer(t, marking)? {
                density = density.cartesian_product(&fresh)?;
                if let Some(rate) = rate {
                    exp_rates.insert(t.timer(), rate);
                }
            }
        }
        if self.transient {
            let age = StateDensity::deterministic(Variable::age(), ExactReal::zero())?;
            density = density.cartesian_product(&age)?;
        }
        let vanishing = self.any_immediate(&enabled)?;
        let absorbing = enabled.is_empty();
        let stochastic = StochasticStateFeature {
            density,
            exp_rates,
            vanishing,
            absorbing,
        };
        let regeneration = self.detect_regeneration(marking, &enabled, &enabled, vanishing)?;
        Ok(State {
            petri: Some(PetriStateFeature {
                marking: marking.clone(),
                enabled: enabled.clone(),
                newly_enabled: enabled,
            }),
            stochastic: Some(stochastic),
            transient: self.transient.then(|| TransientStochasticStateFeature {
                reaching_probability: ExactReal::one(),
                entering_time_lower: ExactReal::zero(),
                entering_time_upper: ExactReal::zero(),
            }),
            regeneration,
            local_stop: false,
        })
    }

    /// Compute every successor of a state.
    pub fn successors(&self, state: &State) -> Result<Vec<Succession>> {
        let petri = state
            .petri
            .as_ref()
            .ok_or_else(|| Error::Structural("state without a Petri feature".to_string()))?;
        let stochastic = state
            .stochastic
            .as_ref()
            .ok_or_else(|| Error::Structural("state without a stochastic feature".to_string()))?;
        if stochastic.absorbing {
            return Ok(Vec::new());
        }
        if stochastic.vanishing {
            self.immediate_successors(petri, stochastic, state)
        } else {
            self.timed_successors(petri, stochastic, state)
        }
    }

    /// Firings of the enabled immediate transitions. Only the immediate
    /// transitions with the maximum marking-evaluated weight can fire;
    /// their probabilities are the normalized weights.
    fn immediate_successors(
        &self,
        petri: &PetriStateFeature,
        stochastic: &StochasticStateFeature,
        state: &State,
    ) -> Result<Vec<Succession>> {
        let marking = &petri.marking;
        let mut candidates = Vec::new();
        let mut max_weight: f64 = 0.0;
        for t in &petri.enabled {
            let feature = self.net.feature(t)?;
            if feature.distribution.is_immediate() {
                let w = feature.weight.evaluate(marking);
                ensure!(w >= 0.0, "negative weight on immediate transition {t}");
                candidates.push((t.clone(), w));
                max_weight = max_weight.max(w);
            }
        }
        if max_weight <= 0.0 {
            fail!("time lock: vanishing marking {marking} has zero total weight");
        }
        candidates.retain(|(_, w)| *w == max_weight);
        let total: f64 = candidates.iter().map(|(_, w)| w).sum();
        let mut successions = Vec::new();
        for (t, w) in candidates {
            let probability = ExactReal::from_f64(w / total)
                .ok_or_else(|| Error::Validation(format!("weight of {t} is not a number")))?;
            // No time passes: the joint density survives unchanged.
            let child = self.make_child(
                state,
                &t,
                stochastic.density.clone(),
                &probability,
                &petri.enabled,
            )?;
            successions.push(Succession {
                fired: t,
                probability,
                child,
            });
        }
        Ok(successions)
    }

    /// Race-resolved firings of the enabled timed transitions.
    fn timed_successors(
        &self,
        petri: &PetriStateFeature,
        stochastic: &StochasticStateFeature,
        state: &State,
    ) -> Result<Vec<Succession>> {
        let timers: Vec<Variable> = petri.enabled.iter().map(Transition::timer).collect();
        let mut successions = Vec::new();
        for t in &petri.enabled {
            let timer = t.timer();
            let others: Vec<Variable> = timers.iter().filter(|v| **v != timer).cloned().collect();
            if !stochastic.density.can_be_lowest(&timer, &others) {
                continue;
            }
            let Some((density, probability)) = stochastic.density.after_firing(&timer, &others)?
            else {
                continue;
            };
            let child = self.make_child(state, t, density, &probability, &petri.enabled)?;
            successions.push(Succession {
                fired: t.clone(),
                probability,
                child,
            });
        }
        Ok(successions)
    }

    /// Assemble the child state after `fired` has fired: drop disabled
    /// timers, multiply in newly enabled ones, refresh the feature bag.
    fn make_child(
        &self,
        parent: &State,
        fired: &Transition,
        mut density: StateDensity,
        probability: &ExactReal,
        enabled_before: &BTreeSet<Transition>,
    ) -> Result<State> {
        let parent_petri = parent.petri.as_ref().expect("checked by the caller");
        let parent_stochastic = parent.stochastic.as_ref().expect("checked by the caller");
        let marking = self.net.fire(&parent_petri.marking, fired)?;
        let enabled: BTreeSet<Transition> = self.net.enabled(&marking).into_iter().collect();

        // Persistent transitions keep their timers; the rest are dropped
        // or freshly sampled.
        let survivors: BTreeSet<Transition> = enabled_before
            .iter()
            .filter(|u| *u != fired && enabled.contains(*u) && density.has_variable(&u.timer()))
            .cloned()
            .collect();
        let newly_enabled: BTreeSet<Transition> = enabled
            .iter()
            .filter(|u| !survivors.contains(*u))
            .cloned()
            .collect();

        for u in enabled_before {
            if u == fired || survivors.contains(u) {
                continue;
            }
            if density.has_variable(&u.timer()) {
                density = density.marginalize_out(&u.timer())?;
            }
        }

        let mut exp_rates: BTreeMap<Variable, BigRational> = parent_stochastic
            .exp_rates
            .iter()
            .filter(|(v, _)| survivors.iter().any(|u| u.timer() == **v))
            .map(|(v, r)| (v.clone(), r.clone()))
            .collect();
        for u in &newly_enabled {
            if let Some((fresh, rate)) = self.fresh_timer(u, &marking)? {
                density = density.cartesian_product(&fresh)?;
                if let Some(rate) = rate {
                    exp_rates.insert(u.timer(), rate);
                }
            }
        }

        let vanishing = self.any_immediate(&enabled)?;
        let absorbing = enabled.is_empty();
        let regeneration = self.detect_regeneration(&marking, &enabled, &newly_enabled, vanishing)?;

        let transient = match (&parent.transient, self.transient) {
            (Some(parent_transient), true) => {
                let age = Variable::age();
                let reaching = parent_transient
                    .reaching_probability
                    .mul_with(probability, self.indeterminate)?;
                Some(TransientStochasticStateFeature {
                    reaching_probability: reaching,
                    entering_time_lower: density.min_bound(&Variable::ground(), &age),
                    entering_time_upper: density.max_bound(&Variable::ground(), &age),
                })
            }
            _ => None,
        };

        Ok(State {
            petri: Some(PetriStateFeature {
                marking,
                enabled,
                newly_enabled,
            }),
            stochastic: Some(StochasticStateFeature {
                density,
                exp_rates,
                vanishing,
                absorbing,
            }),
            transient,
            regeneration,
            local_stop: false,
        })
    }

    /// Fresh timer density for a newly enabled transition, plus its rate
    /// when exponential. Immediate transitions carry no timer.
    fn fresh_timer(
        &self,
        t: &Transition,
        marking: &Marking,
    ) -> Result<Option<(StateDensity, Option<BigRational>)>> {
        let timer = t.timer();
        ensure!(
            !timer.is_ground() && !timer.is_age(),
            "transition name {t} collides with a reserved variable"
        );
        let feature = self.net.feature(t)?;
        let clock_rate = feature.clock_rate.evaluate(marking);
        match &feature.distribution {
            DelayDistribution::Immediate => Ok(None),
            DelayDistribution::Exponential { rate } => {
                ensure!(
                    clock_rate > 0.0,
                    "clock rate of {t} must be positive, got {clock_rate}"
                );
                let scale = BigRational::from_float(clock_rate).ok_or_else(|| {
                    Error::Validation(format!("clock rate of {t} is not a number"))
                })?;
                let effective = rate * scale;
                let density = StateDensity::exponential(timer.clone(), effective.clone())?;
                Ok(Some((density, Some(effective))))
            }
            other => {
                ensure!(
                    clock_rate == 1.0,
                    "non-exponential transition {t} requires unit clock rate"
                );
                Ok(Some((other.build_density(timer)?, None)))
            }
        }
    }

    /// True when any enabled transition is immediate.
    fn any_immediate(&self, enabled: &BTreeSet<Transition>) -> Result<bool> {
        for t in enabled {
            if self.net.feature(t)?.distribution.is_immediate() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A tangible state is a regeneration iff every enabled
    /// non-exponential transition is newly enabled.
    fn detect_regeneration(
        &self,
        marking: &Marking,
        enabled: &BTreeSet<Transition>,
        newly_enabled: &BTreeSet<Transition>,
        vanishing: bool,
    ) -> Result<Option<Regeneration>> {
        if vanishing {
            return Ok(None);
        }
        let mut non_exp = Vec::new();
        for t in enabled {
            let feature = self.net.feature(t)?;
            if !feature.distribution.is_exponential() {
                if !newly_enabled.contains(t) {
                    return Ok(None);
                }
                non_exp.push(t.clone());
            }
        }
        Ok(Some(Regeneration(DeterministicEnablingState::fresh(
            marking.clone(),
            non_exp,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::StochasticTransitionFeature;

    /// A tiny net: transitions consume one token from each input place and
    /// produce one on each output place.
    struct TestNet {
        features: BTreeMap<Transition, StochasticTransitionFeature>,
        arcs: BTreeMap<Transition, (Vec<&'static str>, Vec<&'static str>)>,
    }

    impl TestNet {
        fn new() -> Self {
            TestNet {
                features: BTreeMap::new(),
                arcs: BTreeMap::new(),
            }
        }

        fn transition(
            mut self,
            name: &'static str,
            feature: StochasticTransitionFeature,
            inputs: Vec<&'static str>,
            outputs: Vec<&'static str>,
        ) -> Self {
            let t = Transition::new(name);
            self.features.insert(t.clone(), feature);
            self.arcs.insert(t, (inputs, outputs));
            self
        }
    }

    impl StochasticNet for TestNet {
        fn transitions(&self) -> Vec<Transition> {
            self.features.keys().cloned().collect()
        }

        fn enabled(&self, marking: &Marking) -> Vec<Transition> {
            self.arcs
                .iter()
                .filter(|(_, (inputs, _))| inputs.iter().all(|p| marking.get(p) > 0))
                .map(|(t, _)| t.clone())
                .collect()
        }

        fn fire(&self, marking: &Marking, transition: &Transition) -> Result<Marking> {
            let (inputs, outputs) = self
                .arcs
                .get(transition)
                .ok_or_else(|| Error::Validation(format!("unknown transition {transition}")))?;
            let mut next = marking.clone();
            for p in inputs {
                next.remove(p, 1);
            }
            for p in outputs {
                next.add(p, 1);
            }
            Ok(next)
        }

        fn feature(&self, transition: &Transition) -> Result<&StochasticTransitionFeature> {
            self.features.get(transition).ok_or_else(|| {
                Error::Validation(format!("transition {transition} has no stochastic feature"))
            })
        }
    }

    fn rat(n: i64, d: i64) -> BigRational {
        BigRational::new(n.into(), d.into())
    }

    fn dec(s: &str) -> ExactReal {
        ExactReal::from_decimal_str(s).unwrap()
    }

    /// DET at 2.0 races an EXP at rate 1.0 from the initial marking.
    fn det_exp_net() -> TestNet {
        TestNet::new()
            .transition(
                "det",
                StochasticTransitionFeature::deterministic(dec("2")),
                vec!["start"],
                vec!["det_done"],
            )
            .transition(
                "exp",
                StochasticTransitionFeature::exponential(rat(1, 1)),
                vec!["start"],
                vec!["exp_done"],
            )
    }

    #[test]
    fn initial_state_is_a_regeneration() {
        let net = det_exp_net();
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 1))
            .unwrap();
        assert!(state.is_regeneration());
        assert!(!state.is_vanishing());
        assert_eq!(state.petri.as_ref().unwrap().enabled.len(), 2);
    }

    #[test]
    fn race_probabilities_sum_to_one() {
        let net = det_exp_net();
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 1))
            .unwrap();
        let successions = evaluator.successors(&state).unwrap();
        assert_eq!(successions.len(), 2);
        let total: f64 = successions
            .iter()
            .map(|s| s.probability.to_f64())
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
        let exp_first = successions
            .iter()
            .find(|s| s.fired.name() == "exp")
            .unwrap();
        assert!((exp_first.probability.to_f64() - (1.0 - (-2.0_f64).exp())).abs() < 1e-9);
    }

    #[test]
    fn exp_firing_leaves_non_regenerative_child() {
        let net = det_exp_net();
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 2))
            .unwrap();
        let successions = evaluator.successors(&state).unwrap();
        // After exp fires, det remains enabled with elapsed time:
        // no regeneration.
        let exp_first = successions
            .iter()
            .find(|s| s.fired.name() == "exp")
            .unwrap();
        assert!(!exp_first.child.is_regeneration());
        // After det fires, only exp remains, and exp is memoryless:
        // regeneration.
        let det_first = successions
            .iter()
            .find(|s| s.fired.name() == "det")
            .unwrap();
        assert!(det_first.child.is_regeneration());
    }

    #[test]
    fn immediate_transitions_preempt_timed_ones() {
        let net = TestNet::new()
            .transition(
                "imm_a",
                StochasticTransitionFeature::immediate(3.0),
                vec!["start"],
                vec!["a"],
            )
            .transition(
                "imm_b",
                StochasticTransitionFeature::immediate(1.0),
                vec!["start"],
                vec!["b"],
            )
            .transition(
                "exp",
                StochasticTransitionFeature::exponential(rat(1, 1)),
                vec!["start"],
                vec!["c"],
            );
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 1))
            .unwrap();
        assert!(state.is_vanishing());
        let successions = evaluator.successors(&state).unwrap();
        // Only the maximum-weight immediate transition fires.
        assert_eq!(successions.len(), 1);
        assert_eq!(successions[0].fired.name(), "imm_a");
        assert!((successions[0].probability.to_f64() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn equal_max_weights_split_the_firing() {
        let net = TestNet::new()
            .transition(
                "imm_a",
                StochasticTransitionFeature::immediate(2.0),
                vec!["start"],
                vec!["a"],
            )
            .transition(
                "imm_b",
                StochasticTransitionFeature::immediate(2.0),
                vec!["start"],
                vec!["b"],
            )
            .transition(
                "imm_c",
                StochasticTransitionFeature::immediate(0.5),
                vec!["start"],
                vec!["c"],
            );
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 1))
            .unwrap();
        let successions = evaluator.successors(&state).unwrap();
        assert_eq!(successions.len(), 2, "the tied maximum-weight pair fires");
        for s in &successions {
            assert!((s.probability.to_f64() - 0.5).abs() < 1e-12);
        }
        assert!(successions.iter().all(|s| s.fired.name() != "imm_c"));
    }

    #[test]
    fn transient_mode_threads_the_age_clock() {
        let net = det_exp_net();
        let evaluator = SuccessionEvaluator::transient(&net);
        let state = evaluator
            .initial_state(&Marking::new().with("start", 1))
            .unwrap();
        let stochastic = state.stochastic.as_ref().unwrap();
        assert!(stochastic.density.has_variable(&Variable::age()));
        let successions = evaluator.successors(&state).unwrap();
        let exp_first = successions
            .iter()
            .find(|s| s.fired.name() == "exp")
            .unwrap();
        let t = exp_first.child.transient.as_ref().unwrap();
        // Entering time of the post-exp class spans (0, 2].
        assert_eq!(t.entering_time_upper, dec("2"));
        assert!(
            (t.reaching_probability.to_f64() - (1.0 - (-2.0_f64).exp())).abs() < 1e-9
        );
    }

    #[test]
    fn absorbing_state_has_no_successors() {
        let net = det_exp_net();
        let evaluator = SuccessionEvaluator::new(&net);
        let state = evaluator.initial_state(&Marking::new()).unwrap();
        assert!(state.is_absorbing());
        assert!(evaluator.successors(&state).unwrap().is_empty());
    }
}

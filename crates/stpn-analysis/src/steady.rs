//! Steady-state analysis over the embedded regeneration chain.
//!
//! The embedded DTMC's transition probabilities are the limits of the
//! global kernel — the total reaching probability of each regeneration
//! leaf. Its stationary distribution, weighted by the mean sojourn time
//! spent in each (regeneration, marking) pair between renewals, gives the
//! steady-state marking probabilities.

use crate::builders::Policy;
use crate::regenerative::expand_tree;
use crate::solution::SteadyStateSolution;
use std::collections::BTreeMap;
use stpn_core::{fail, AnalysisMonitor, Error, IndeterminatePolicy, Real, Result};
use stpn_markov::Dtmc;
use stpn_state::{
    DeterministicEnablingState, Marking, StochasticNet, SuccessionEvaluator, Transition,
};
use stpn_math::expol::Variable;

/// Compute the steady-state marking distribution of a net whose
/// regeneration chain is finite and irreducible.
pub fn steady_state<N: StochasticNet>(
    net: &N,
    initial_marking: &Marking,
    epsilon: Real,
    indeterminate: IndeterminatePolicy,
    monitor: &dyn AnalysisMonitor,
) -> Result<SteadyStateSolution> {
    let evaluator = SuccessionEvaluator::transient(net).with_indeterminate_policy(indeterminate);
    let root = evaluator.initial_state(initial_marking)?;
    let initial_regeneration = root
        .regeneration
        .clone()
        .ok_or_else(|| {
            Error::Validation("the initial marking is not a regeneration".to_string())
        })?
        .0;

    let mut regenerations = vec![initial_regeneration.clone()];
    let mut seen: BTreeMap<DeterministicEnablingState, usize> =
        BTreeMap::from([(initial_regeneration, 0)]);
    let mut embedded: Dtmc<usize> = Dtmc::new();
    embedded.add_initial(0, 1.0);
    // sojourn[(row, marking)] = expected time per renewal cycle.
    let mut sojourn: BTreeMap<(usize, Marking), Real> = BTreeMap::new();

    let mut next_row = 0;
    while next_row < regenerations.len() {
        let row = next_row;
        next_row += 1;
        if monitor.interrupt_requested() {
            monitor.message("steady-state enumeration interrupted");
            return Err(Error::Interrupted);
        }
        let regeneration = regenerations[row].clone();
        let tree = expand_tree(
            net,
            &regeneration,
            f64::INFINITY,
            Policy::Fifo,
            0.0,
            None,
            indeterminate,
            monitor,
        )?;
        embedded.add_state(row);

        for (id, node) in tree.nodes() {
            let Some(transient) = node.transient.as_ref() else {
                continue;
            };
            let Some(stochastic) = node.stochastic.as_ref() else {
                continue;
            };
            let reaching = transient.reaching_probability.to_f64();
            if reaching == 0.0 {
                continue;
            }
            if node.is_regeneration() && id != tree.root() {
                let value = node.regeneration.as_ref().expect("checked").0.clone();
                let column = *seen.entry(value.clone()).or_insert_with(|| {
                    regenerations.push(value);
                    regenerations.len() - 1
                });
                embedded.add_edge(row, column, reaching);
            } else {
                if node.is_vanishing() {
                    continue;
                }
                if node.is_absorbing() {
                    fail!("absorbing marking reached: the steady state is degenerate");
                }
                let Some(petri) = node.petri.as_ref() else {
                    continue;
                };
                let mean = mean_sojourn(stochastic, &petri.enabled)?;
                *sojourn
                    .entry((row, petri.marking.clone()))
                    .or_insert(0.0) += reaching * mean;
            }
        }
    }

    let pi = embedded.stationary_distribution(epsilon)?;
    let mut weighted: BTreeMap<Marking, Real> = BTreeMap::new();
    let mut total = 0.0;
    for ((row, marking), mean) in sojourn {
        let mass = pi[row] * mean;
        *weighted.entry(marking).or_insert(0.0) += mass;
        total += mass;
    }
    if total <= 0.0 {
        fail!("zero total sojourn time in the regeneration cycle");
    }
    for value in weighted.values_mut() {
        *value /= total;
    }
    Ok(SteadyStateSolution::new(weighted))
}

/// Expected time to the next firing from class entry:
/// `Σ_t ∫_{x_t minimal} x_t · f dx` over the eligible timers.
fn mean_sojourn(
    stochastic: &stpn_state::StochasticStateFeature,
    enabled: &std::collections::BTreeSet<Transition>,
) -> Result<Real> {
    let timers: Vec<Variable> = enabled.iter().map(Transition::timer).collect();
    let mut total = 0.0;
    for t in enabled {
        let timer = t.timer();
        let others: Vec<Variable> = timers.iter().filter(|v| **v != timer).cloned().collect();
        if !stochastic.density.can_be_lowest(&timer, &others) {
            continue;
        }
        let constraints: Vec<_> = others
            .iter()
            .map(|u| (timer.clone(), u.clone(), stpn_math::ExactReal::zero()))
            .collect();
        let restricted = stochastic.density.impose(&constraints)?;
        if restricted.is_vacuous() {
            continue;
        }
        total += restricted.mean_value(&timer)?.to_f64();
    }
    Ok(total)
}

//! Regenerative enumeration: stochastic trees between regenerations and
//! their kernel samples.
//!
//! From each discovered regeneration a transient tree is expanded until
//! the next regenerations (or the time bound). On closing, nodes
//! contribute to the global kernel when they are themselves regenerations
//! reached at depth ≥ 1, and to the local kernel (by marking) otherwise.
//! Newly reached regenerations join the frontier unless their enabling
//! time already exceeds the bound.

use crate::builders::{MarkingPredicate, Policy};
use crate::kernel::KernelSamples;
use std::collections::BTreeMap;
use stpn_core::{ensure, AnalysisMonitor, IndeterminatePolicy, Real, Result};
use stpn_enumeration::{enumerate, EnumerationComponents, StopCriterion, SuccessionGraph};
use stpn_markov::Ticks;
use stpn_state::{
    DeterministicEnablingState, Marking, State, StochasticNet, SuccessionEvaluator,
};

/// Stop a between-regenerations tree: at regenerations other than the
/// root, past the time bound, and on the optional marking condition.
struct TreeStop {
    root: State,
    bound: Real,
    stop_on: Option<MarkingPredicate>,
}

impl StopCriterion for TreeStop {
    fn should_stop(&self, state: &State) -> bool {
        if state.is_regeneration() && *state != self.root {
            return true;
        }
        if let (Some(condition), Some(marking)) = (&self.stop_on, state.marking()) {
            if condition(marking) {
                return true;
            }
        }
        state
            .transient
            .as_ref()
            .is_some_and(|t| t.entering_time_lower.to_f64() > self.bound)
    }
}

/// Sample the local and global kernels of a net from an initial
/// regeneration.
pub fn enumerate_kernels<N: StochasticNet>(
    net: &N,
    initial_marking: &Marking,
    ticks: Ticks,
    policy: Policy,
    error: Real,
    stop_on: Option<MarkingPredicate>,
    indeterminate: IndeterminatePolicy,
    monitor: &dyn AnalysisMonitor,
) -> Result<KernelSamples> {
    let time_bound = ticks.kernel_time(ticks.kernel_points() - 1);
    let evaluator = SuccessionEvaluator::transient(net).with_indeterminate_policy(indeterminate);
    let root = evaluator.initial_state(initial_marking)?;
    let initial_regeneration = root
        .regeneration
        .clone()
        .ok_or_else(|| {
            stpn_core::Error::Validation(
                "the initial marking is not a regeneration".to_string(),
            )
        })?
        .0;

    let mut regenerations = vec![initial_regeneration.clone()];
    let mut regeneration_index: BTreeMap<DeterministicEnablingState, usize> =
        BTreeMap::from([(initial_regeneration, 0)]);
    let mut markings: Vec<Marking> = Vec::new();
    let mut marking_index: BTreeMap<Marking, usize> = BTreeMap::new();

    // Per (row, column) sample series, flattened at the end.
    let samples = ticks.kernel_points();
    let mut local_series: BTreeMap<(usize, usize), Vec<Real>> = BTreeMap::new();
    let mut global_series: BTreeMap<(usize, usize), Vec<Real>> = BTreeMap::new();
    let mut horizons: Vec<Real> = vec![0.0];

    let mut next_row = 0;
    while next_row < regenerations.len() {
        let row = next_row;
        next_row += 1;
        if monitor.interrupt_requested() {
            monitor.message("regenerative enumeration interrupted");
            break;
        }
        let regeneration = regenerations[row].clone();
        let tree = expand_tree(
            net,
            &regeneration,
            time_bound,
            policy,
            error,
            stop_on.clone(),
            indeterminate,
            monitor,
        )?;
        log::debug!(
            "regeneration {row}: tree with {} nodes",
            tree.len()
        );

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
            let is_child_regeneration = node.is_regeneration() && id != tree.root();
            if is_child_regeneration {
                let value = node.regeneration.as_ref().expect("checked").0.clone();
                if transient.entering_time_lower.to_f64() > time_bound {
                    continue;
                }
                let column = *regeneration_index.entry(value.clone()).or_insert_with(|| {
                    regenerations.push(value);
                    horizons.push(0.0);
                    regenerations.len() - 1
                });
                let series = global_series
                    .entry((row, column))
                    .or_insert_with(|| vec![0.0; samples]);
                let upper = transient.entering_time_upper.to_f64();
                if upper.is_finite() && upper > horizons[row] {
                    horizons[row] = upper;
                } else if !upper.is_finite() {
                    horizons[row] = f64::INFINITY;
                }
                for (t, time) in ticks.kernel_times().enumerate() {
                    if time < transient.entering_time_lower.to_f64() {
                        continue;
                    }
                    let visited = if time >= upper {
                        1.0
                    } else {
                        transient.visited_probability(stochastic, time)?.to_f64()
                    };
                    series[t] += reaching * visited;
                }
            } else {
                if node.is_vanishing() {
                    continue;
                }
                let Some(marking) = node.marking().cloned() else {
                    continue;
                };
                let column = *marking_index.entry(marking.clone()).or_insert_with(|| {
                    markings.push(marking);
                    markings.len() - 1
                });
                let series = local_series
                    .entry((row, column))
                    .or_insert_with(|| vec![0.0; samples]);
                for (t, time) in ticks.kernel_times().enumerate() {
                    if time < transient.entering_time_lower.to_f64() {
                        continue;
                    }
                    series[t] += reaching
                        * transient.being_probability(stochastic, time)?.to_f64();
                }
            }
        }
    }

    // Flatten into [t][i][j] arrays.
    let rows = regenerations.len();
    let mut local = vec![vec![vec![0.0; markings.len()]; rows]; samples];
    for ((i, j), series) in local_series {
        for (t, value) in series.into_iter().enumerate() {
            local[t][i][j] = value;
        }
    }
    let mut global = vec![vec![vec![0.0; rows]; rows]; samples];
    for ((i, k), series) in global_series {
        for (t, value) in series.into_iter().enumerate() {
            global[t][i][k] = value;
        }
    }
    let global_horizon = horizons
        .iter()
        .map(|&h| {
            if h.is_finite() {
                ((h / ticks.time_step()).ceil() as usize).min(samples - 1)
            } else {
                samples - 1
            }
        })
        .collect();

    Ok(KernelSamples {
        regenerations,
        markings,
        local,
        global,
        ticks,
        global_horizon,
    })
}

/// Expand one between-regenerations tree.
pub(crate) fn expand_tree<N: StochasticNet>(
    net: &N,
    regeneration: &DeterministicEnablingState,
    time_bound: Real,
    policy: Policy,
    error: Real,
    stop_on: Option<MarkingPredicate>,
    indeterminate: IndeterminatePolicy,
    monitor: &dyn AnalysisMonitor,
) -> Result<SuccessionGraph> {
    ensure!(
        regeneration
            .enabling_times
            .values()
            .all(|v| v.is_zero()),
        "only fresh regenerations are supported"
    );
    let evaluator = SuccessionEvaluator::transient(net).with_indeterminate_policy(indeterminate);
    let root = evaluator.initial_state(&regeneration.marking)?;
    let stop = TreeStop {
        root: root.clone(),
        bound: time_bound,
        stop_on,
    };
    match policy {
        Policy::Fifo => enumerate(
            EnumerationComponents {
                evaluator,
                policy: stpn_enumeration::Fifo::new(),
                stop: Box::new(stop),
                postprocessor: Box::new(|s| s),
            },
            root,
            monitor,
        ),
        Policy::Greedy => enumerate(
            EnumerationComponents {
                evaluator,
                policy: stpn_enumeration::GreedyByReachingProbability::new(error),
                stop: Box::new(stop),
                postprocessor: Box::new(|s| s),
            },
            root,
            monitor,
        ),
    }
}

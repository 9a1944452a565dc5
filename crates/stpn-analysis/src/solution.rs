//! Analysis results.

use std::collections::BTreeMap;
use stpn_core::{ensure, Real, Result, Time};
use stpn_markov::ticks::trapezoid;
use stpn_state::Marking;

/// A marking- and optionally time-dependent reward rate.
///
/// The engine needs only evaluation and the names of the places read.
pub trait RewardRate {
    /// Evaluate at a time point and marking.
    fn evaluate(&self, time: Time, marking: &Marking) -> Real;

    /// The places the rate reads.
    fn places(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<F: Fn(Time, &Marking) -> Real> RewardRate for F {
    fn evaluate(&self, time: Time, marking: &Marking) -> Real {
        self(time, marking)
    }
}

/// A sampled transient solution: `solution[t][i][j]` is the probability of
/// being in column state `j` at the `t`-th time point, starting from row
/// state `i`. The initial state is explicit.
#[derive(Debug, Clone)]
pub struct TransientSolution<R, C> {
    time_bound: Time,
    time_step: Time,
    initial: R,
    rows: Vec<R>,
    columns: Vec<C>,
    solution: Vec<Vec<Vec<Real>>>,
}

impl<R: Clone + PartialEq, C: Clone> TransientSolution<R, C> {
    /// Build from a sampled probability array.
    ///
    /// `solution` is indexed `[sample][row][column]`; the number of samples
    /// fixes the time bound as `(samples − 1) · step`.
    pub fn from_array(
        solution: Vec<Vec<Vec<Real>>>,
        time_step: Time,
        rows: Vec<R>,
        columns: Vec<C>,
        initial: R,
    ) -> Result<Self> {
        ensure!(!solution.is_empty(), "a solution needs at least one sample");
        ensure!(
            rows.contains(&initial),
            "the initial state must be one of the row states"
        );
        for sample in &solution {
            ensure!(
                sample.len() == rows.len()
                    && sample.iter().all(|r| r.len() == columns.len()),
                "solution samples must be |rows| × |columns|"
            );
        }
        let time_bound = (solution.len() - 1) as Real * time_step;
        Ok(TransientSolution {
            time_bound,
            time_step,
            initial,
            rows,
            columns,
            solution,
        })
    }

    /// The time bound.
    pub fn time_bound(&self) -> Time {
        self.time_bound
    }

    /// The sampling step.
    pub fn time_step(&self) -> Time {
        self.time_step
    }

    /// Number of samples (including `t = 0`).
    pub fn samples(&self) -> usize {
        self.solution.len()
    }

    /// The explicit initial row state.
    pub fn initial(&self) -> &R {
        &self.initial
    }

    /// The row states.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// The column states.
    pub fn columns(&self) -> &[C] {
        &self.columns
    }

    /// The raw sample array, `[sample][row][column]`.
    pub fn values(&self) -> &[Vec<Vec<Real>>] {
        &self.solution
    }

    /// The probability at sample `t`, row `i`, column `j`.
    pub fn probability(&self, t: usize, i: usize, j: usize) -> Real {
        self.solution[t][i][j]
    }

    /// The row of the initial state.
    pub fn initial_row(&self) -> usize {
        self.rows
            .iter()
            .position(|r| *r == self.initial)
            .expect("checked at construction")
    }

    /// Cumulative (time-integrated) solution, by the trapezoidal rule on
    /// each prefix of the sample axis.
    pub fn compute_integral_solution(&self) -> TransientSolution<R, C> {
        let mut integral = vec![
            vec![vec![0.0; self.columns.len()]; self.rows.len()];
            self.solution.len()
        ];
        for i in 0..self.rows.len() {
            for j in 0..self.columns.len() {
                let series: Vec<Real> =
                    self.solution.iter().map(|s| s[i][j]).collect();
                for t in 1..series.len() {
                    integral[t][i][j] = trapezoid(&series[..=t], self.time_step);
                }
            }
        }
        TransientSolution {
            time_bound: self.time_bound,
            time_step: self.time_step,
            initial: self.initial.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            solution: integral,
        }
    }
}

impl<R: Clone + PartialEq> TransientSolution<R, Marking> {
    /// Aggregate columns by named marking conditions.
    pub fn compute_aggregate_solution(
        &self,
        conditions: &[(String, Box<dyn Fn(&Marking) -> bool>)],
    ) -> TransientSolution<R, String> {
        let names: Vec<String> = conditions.iter().map(|(n, _)| n.clone()).collect();
        let mut aggregated = vec![
            vec![vec![0.0; conditions.len()]; self.rows.len()];
            self.solution.len()
        ];
        for (t, sample) in self.solution.iter().enumerate() {
            for i in 0..self.rows.len() {
                for (j, marking) in self.columns.iter().enumerate() {
                    for (k, (_, condition)) in conditions.iter().enumerate() {
                        if condition(marking) {
                            aggregated[t][i][k] += sample[i][j];
                        }
                    }
                }
            }
        }
        TransientSolution {
            time_bound: self.time_bound,
            time_step: self.time_step,
            initial: self.initial.clone(),
            rows: self.rows.clone(),
            columns: names,
            solution: aggregated,
        }
    }

    /// Expected reward rates over time, one output column per rate;
    /// `cumulative` integrates each series over time.
    pub fn compute_rewards(
        &self,
        cumulative: bool,
        rates: &[(String, Box<dyn RewardRate>)],
    ) -> TransientSolution<R, String> {
        let names: Vec<String> = rates.iter().map(|(n, _)| n.clone()).collect();
        let mut rewards = vec![
            vec![vec![0.0; rates.len()]; self.rows.len()];
            self.solution.len()
        ];
        for (t, sample) in self.solution.iter().enumerate() {
            let time = t as Real * self.time_step;
            for i in 0..self.rows.len() {
                for (k, (_, rate)) in rates.iter().enumerate() {
                    rewards[t][i][k] = self
                        .columns
                        .iter()
                        .enumerate()
                        .map(|(j, m)| sample[i][j] * rate.evaluate(time, m))
                        .sum();
                }
            }
        }
        let solution = TransientSolution {
            time_bound: self.time_bound,
            time_step: self.time_step,
            initial: self.initial.clone(),
            rows: self.rows.clone(),
            columns: names,
            solution: rewards,
        };
        if cumulative {
            solution.compute_integral_solution()
        } else {
            solution
        }
    }
}

/// A steady-state distribution over markings.
#[derive(Debug, Clone)]
pub struct SteadyStateSolution {
    probabilities: BTreeMap<Marking, Real>,
}

impl SteadyStateSolution {
    /// Build from per-marking probabilities.
    pub fn new(probabilities: BTreeMap<Marking, Real>) -> Self {
        SteadyStateSolution { probabilities }
    }

    /// The steady-state probability of a marking.
    pub fn probability(&self, marking: &Marking) -> Real {
        self.probabilities.get(marking).copied().unwrap_or(0.0)
    }

    /// All markings with their probabilities.
    pub fn probabilities(&self) -> &BTreeMap<Marking, Real> {
        &self.probabilities
    }
}

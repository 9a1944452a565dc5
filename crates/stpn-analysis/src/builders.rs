//! User-facing analysis builders.
//!
//! Each analysis is configured through a builder (time bound, step, error,
//! policy, stop condition, kernel normalization, monitor, indeterminate
//! policy) and then run against a net and an initial marking.

use crate::regenerative;
use crate::renewal;
use crate::solution::{SteadyStateSolution, TransientSolution};
use crate::steady;
use std::sync::Arc;
use stpn_core::{ensure, AnalysisMonitor, IndeterminatePolicy, NopMonitor, Real, Result, Time};
use stpn_enumeration::{
    enumerate, EnumerationComponents, StopCriterion, TimeBoundStop,
};
use stpn_markov::Ticks;
use stpn_state::{
    DeterministicEnablingState, Marking, State, StochasticNet, SuccessionEvaluator,
};

/// A frontier policy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Breadth-first by insertion order.
    #[default]
    Fifo,
    /// Largest reaching probability first, with error-bounded truncation.
    Greedy,
}

/// A marking predicate used as a stop condition.
pub type MarkingPredicate = Arc<dyn Fn(&Marking) -> bool + Send + Sync>;

/// Shared analysis options.
#[derive(Clone)]
pub struct Options {
    /// The analysis horizon.
    pub time_bound: Time,
    /// The kernel sampling step.
    pub time_step: Time,
    /// Truncation error of the greedy policy and the numeric layers.
    pub error: Real,
    /// Frontier policy.
    pub policy: Policy,
    /// Rescale global kernel rows to close the probability mass.
    pub normalize_kernels: bool,
    /// Optional marking condition closing nodes without expansion.
    pub stop_on: Option<MarkingPredicate>,
    /// Cooperative monitor.
    pub monitor: Arc<dyn AnalysisMonitor + Send + Sync>,
    /// Resolution of indeterminate arithmetic forms.
    pub indeterminate: IndeterminatePolicy,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            time_bound: 1.0,
            time_step: 0.1,
            error: 1e-9,
            policy: Policy::Fifo,
            normalize_kernels: false,
            stop_on: None,
            monitor: Arc::new(NopMonitor),
            indeterminate: IndeterminatePolicy::FailFast,
        }
    }
}

macro_rules! builder_options {
    () => {
        /// Set the analysis horizon.
        pub fn time_bound(mut self, time_bound: Time) -> Self {
            self.options.time_bound = time_bound;
            self
        }

        /// Set the kernel sampling step.
        pub fn time_step(mut self, time_step: Time) -> Self {
            self.options.time_step = time_step;
            self
        }

        /// Set the truncation error.
        pub fn error(mut self, error: Real) -> Self {
            self.options.error = error;
            self
        }

        /// Choose the frontier policy.
        pub fn policy(mut self, policy: Policy) -> Self {
            self.options.policy = policy;
            self
        }

        /// Rescale global kernel rows to close the probability mass.
        pub fn normalize_kernels(mut self, normalize: bool) -> Self {
            self.options.normalize_kernels = normalize;
            self
        }

        /// Close nodes whose marking satisfies the condition.
        pub fn stop_on(mut self, condition: MarkingPredicate) -> Self {
            self.options.stop_on = Some(condition);
            self
        }

        /// Install a cooperative monitor.
        pub fn monitor(mut self, monitor: Arc<dyn AnalysisMonitor + Send + Sync>) -> Self {
            self.options.monitor = monitor;
            self
        }

        /// Choose how indeterminate arithmetic forms are resolved.
        pub fn indeterminate(mut self, policy: IndeterminatePolicy) -> Self {
            self.options.indeterminate = policy;
            self
        }
    };
}

/// Regenerative transient analysis: kernels between regenerations plus
/// the Markov-renewal solution.
pub struct RegenerativeTransient {
    options: Options,
}

impl RegenerativeTransient {
    /// Start configuring an analysis.
    pub fn builder() -> Self {
        RegenerativeTransient {
            options: Options::default(),
        }
    }

    builder_options!();

    /// Run against a net and an initial regeneration marking.
    pub fn compute<N: StochasticNet>(
        &self,
        net: &N,
        initial_marking: &Marking,
    ) -> Result<TransientSolution<DeterministicEnablingState, Marking>> {
        validate(&self.options)?;
        let ticks = Ticks::new(self.options.time_bound, self.options.time_step, 1)?;
        let mut kernel = regenerative::enumerate_kernels(
            net,
            initial_marking,
            ticks,
            self.options.policy,
            self.options.error,
            self.options.stop_on.clone(),
            self.options.indeterminate,
            self.options.monitor.as_ref(),
        )?;
        if self.options.normalize_kernels {
            kernel.normalize_rows();
        }
        let solution = renewal::solve(&kernel);
        TransientSolution::from_array(
            solution,
            kernel.ticks.time_step(),
            kernel.regenerations.clone(),
            kernel.markings.clone(),
            kernel.regenerations[0].clone(),
        )
    }
}

/// Forward-tree transient analysis: a single transient tree from the
/// initial marking, with no renewal argument.
pub struct TreeTransient {
    options: Options,
}

impl TreeTransient {
    /// Start configuring an analysis.
    pub fn builder() -> Self {
        TreeTransient {
            options: Options::default(),
        }
    }

    builder_options!();

    /// Run against a net and an initial marking.
    pub fn compute<N: StochasticNet>(
        &self,
        net: &N,
        initial_marking: &Marking,
    ) -> Result<TransientSolution<Marking, Marking>> {
        validate(&self.options)?;
        let ticks = Ticks::new(self.options.time_bound, self.options.time_step, 1)?;
        let evaluator = SuccessionEvaluator::transient(net)
            .with_indeterminate_policy(self.options.indeterminate);
        let root = evaluator.initial_state(initial_marking)?;
        let stop = ForwardStop {
            bound: TimeBoundStop::new(self.options.time_bound),
            stop_on: self.options.stop_on.clone(),
        };
        let monitor = self.options.monitor.clone();
        let tree = match self.options.policy {
            Policy::Fifo => enumerate(
                EnumerationComponents {
                    evaluator,
                    policy: stpn_enumeration::Fifo::new(),
                    stop: Box::new(stop),
                    postprocessor: Box::new(|s| s),
                },
                root,
                monitor.as_ref(),
            )?,
            Policy::Greedy => enumerate(
                EnumerationComponents {
                    evaluator,
                    policy: stpn_enumeration::GreedyByReachingProbability::new(
                        self.options.error,
                    ),
                    stop: Box::new(stop),
                    postprocessor: Box::new(|s| s),
                },
                root,
                monitor.as_ref(),
            )?,
        };

        let mut markings: Vec<Marking> = Vec::new();
        let mut index = std::collections::BTreeMap::new();
        let samples = ticks.kernel_points();
        let mut series: Vec<Vec<Real>> = Vec::new();
        for (_, node) in tree.nodes() {
            let (Some(transient), Some(stochastic)) =
                (node.transient.as_ref(), node.stochastic.as_ref())
            else {
                continue;
            };
            if node.is_vanishing() {
                continue;
            }
            let Some(marking) = node.marking().cloned() else {
                continue;
            };
            let reaching = transient.reaching_probability.to_f64();
            if reaching == 0.0 {
                continue;
            }
            let j = *index.entry(marking.clone()).or_insert_with(|| {
                markings.push(marking);
                series.push(vec![0.0; samples]);
                markings.len() - 1
            });
            for (t, time) in ticks.kernel_times().enumerate() {
                if time < transient.entering_time_lower.to_f64() {
                    continue;
                }
                series[j][t] +=
                    reaching * transient.being_probability(stochastic, time)?.to_f64();
            }
        }

        let solution: Vec<Vec<Vec<Real>>> = (0..samples)
            .map(|t| vec![series.iter().map(|s| s[t]).collect()])
            .collect();
        TransientSolution::from_array(
            solution,
            ticks.time_step(),
            vec![initial_marking.clone()],
            markings,
            initial_marking.clone(),
        )
    }
}

/// Steady-state analysis over the embedded regeneration chain.
pub struct RegenerativeSteadyState {
    options: Options,
}

impl RegenerativeSteadyState {
    /// Start configuring an analysis.
    pub fn builder() -> Self {
        RegenerativeSteadyState {
            options: Options::default(),
        }
    }

    builder_options!();

    /// Run against a net and an initial regeneration marking.
    pub fn compute<N: StochasticNet>(
        &self,
        net: &N,
        initial_marking: &Marking,
    ) -> Result<SteadyStateSolution> {
        ensure!(self.options.error > 0.0, "the error bound must be positive");
        steady::steady_state(
            net,
            initial_marking,
            self.options.error,
            self.options.indeterminate,
            self.options.monitor.as_ref(),
        )
    }
}

/// Forward-tree stop: time bound plus the optional marking condition.
struct ForwardStop {
    bound: TimeBoundStop,
    stop_on: Option<MarkingPredicate>,
}

impl StopCriterion for ForwardStop {
    fn should_stop(&self, state: &State) -> bool {
        if self.bound.should_stop(state) {
            return true;
        }
        match (&self.stop_on, state.marking()) {
            (Some(condition), Some(marking)) => condition(marking),
            _ => false,
        }
    }
}

fn validate(options: &Options) -> Result<()> {
    ensure!(options.time_bound > 0.0, "the time bound must be positive");
    ensure!(options.time_step > 0.0, "the time step must be positive");
    ensure!(options.error >= 0.0, "the error bound cannot be negative");
    Ok(())
}

//! The one-general-transition path.
//!
//! When at most one non-exponential transition is enabled in any state
//! reachable between regenerations, the stochastic tree collapses into a
//! CTMC subordinated to that transition's firing time: exponential
//! firings move the chain while the general timer keeps counting down,
//! and the general firing (or the loss of its enabling) closes the
//! epoch. Kernels are then numeric: uniformized chain transients against
//! the general distribution's cumulative function, both precomputed on
//! the integral grid once per analysis.

use crate::kernel::KernelSamples;
use crate::solution::TransientSolution;
use nalgebra::DMatrix;
use num_traits::ToPrimitive;
use std::collections::BTreeMap;
use stpn_core::{ensure, fail, AnalysisMonitor, Error, Real, Result, Stage};
use stpn_markov::{Ctmc, CtmcTransient, Ticks};
use stpn_state::{
    DelayDistribution, DeterministicEnablingState, Marking, StochasticNet, Transition,
};

/// A state of the chain subordinated to the general transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChainState {
    /// The general transition is still pending in this marking.
    Active(Marking),
    /// The epoch closed by an exponential firing into a regeneration.
    Absorbed(DeterministicEnablingState),
}

/// The distribution samples shared by every kernel row of one analysis.
#[derive(Debug, Clone)]
pub struct PrecalculatedTickEvaluations {
    /// Cumulative distribution of the general delay on the integral grid.
    pub cdf: Vec<Real>,
    /// Density of the general delay on the integral grid (zero for
    /// distributions with atoms; the kernels integrate against the cdf).
    pub pdf: Vec<Real>,
}

impl PrecalculatedTickEvaluations {
    /// Sample a distribution once over the integral grid.
    pub fn new(distribution: &DelayDistribution, ticks: &Ticks) -> Result<Self> {
        let mut cdf = Vec::with_capacity(ticks.integral_points());
        let mut pdf = Vec::with_capacity(ticks.integral_points());
        for t in ticks.integral_times() {
            cdf.push(distribution.cdf(t)?);
            pdf.push(distribution.pdf(t)?);
        }
        Ok(PrecalculatedTickEvaluations { cdf, pdf })
    }
}

/// The subordinated CTMC of one regeneration epoch.
#[derive(Debug, Clone)]
pub struct SubordinatedCtmc {
    chain: Ctmc<ChainState>,
    root: usize,
    /// The single general transition, when one is enabled.
    general: Option<Transition>,
    /// For each active chain state: the regeneration produced when the
    /// general transition fires there, with its branch probability
    /// (after vanishing absorption).
    firing_branches: Vec<Vec<(DeterministicEnablingState, Real)>>,
}

/// One regeneration's local and global kernel row, compiled against the
/// tick grid.
#[derive(Debug, Clone)]
pub struct KernelRowEvaluator {
    /// Local samples by marking, on the kernel grid.
    pub local: BTreeMap<Marking, Vec<Real>>,
    /// Cumulative global samples by target regeneration.
    pub global: BTreeMap<DeterministicEnablingState, Vec<Real>>,
    /// The largest time at which the global row still grows.
    pub horizon: Real,
}

/// Build and evaluate the OneGen kernels of a net, then solve the Markov
/// Renewal Equation. Returns the transient solution over markings.
pub struct OneGenTransient {
    ticks: Ticks,
    epsilon: Real,
    normalize_kernels: bool,
}

impl OneGenTransient {
    /// An analysis over the given grids with the given uniformization
    /// error bound.
    pub fn new(ticks: Ticks, epsilon: Real) -> Self {
        OneGenTransient {
            ticks,
            epsilon,
            normalize_kernels: false,
        }
    }

    /// Rescale global kernel rows to close the probability mass.
    pub fn normalize_kernels(mut self, normalize: bool) -> Self {
        self.normalize_kernels = normalize;
        self
    }

    /// Run the analysis from an initial regeneration marking.
    pub fn compute<N: StochasticNet>(
        &self,
        net: &N,
        initial_marking: &Marking,
        monitor: &dyn AnalysisMonitor,
    ) -> Result<TransientSolution<DeterministicEnablingState, Marking>> {
        let mut kernel = self.enumerate_kernels(net, initial_marking, monitor)?;
        if self.normalize_kernels {
            kernel.normalize_rows();
        }
        let solution = crate::renewal::solve(&kernel);
        TransientSolution::from_array(
            solution,
            kernel.ticks.time_step(),
            kernel.regenerations.clone(),
            kernel.markings.clone(),
            kernel.regenerations[0].clone(),
        )
    }

    /// Sample the kernels of every reachable regeneration.
    pub fn enumerate_kernels<N: StochasticNet>(
        &self,
        net: &N,
        initial_marking: &Marking,
        monitor: &dyn AnalysisMonitor,
    ) -> Result<KernelSamples> {
        let initial = regeneration_of(net, initial_marking)?;
        let mut regenerations = vec![initial.clone()];
        let mut index: BTreeMap<DeterministicEnablingState, usize> =
            BTreeMap::from([(initial, 0)]);
        let mut rows: Vec<KernelRowEvaluator> = Vec::new();

        let mut next = 0;
        while next < regenerations.len() {
            if monitor.interrupt_requested() {
                monitor.message("OneGen enumeration interrupted");
                return Err(Error::Interrupted);
            }
            let regeneration = regenerations[next].clone();
            next += 1;
            let subordinated = SubordinatedCtmc::build(net, &regeneration)?;
            let row = subordinated.evaluate(net, &self.ticks, self.epsilon)?;
            for target in row.global.keys() {
                if !index.contains_key(target) {
                    index.insert(target.clone(), regenerations.len());
                    regenerations.push(target.clone());
                }
            }
            rows.push(row);
        }

        // Flatten the rows into the shared kernel layout.
        let mut markings: Vec<Marking> = Vec::new();
        let mut marking_index: BTreeMap<Marking, usize> = BTreeMap::new();
        for row in &rows {
            for m in row.local.keys() {
                marking_index.entry(m.clone()).or_insert_with(|| {
                    markings.push(m.clone());
                    markings.len() - 1
                });
            }
        }
        let samples = self.ticks.kernel_points();
        let n = regenerations.len();
        let mut local = vec![vec![vec![0.0; markings.len()]; n]; samples];
        let mut global = vec![vec![vec![0.0; n]; n]; samples];
        let mut global_horizon = vec![0usize; n];
        for (i, row) in rows.iter().enumerate() {
            for (m, series) in &row.local {
                let j = marking_index[m];
                for t in 0..samples {
                    local[t][i][j] = series[t];
                }
            }
            for (r, series) in &row.global {
                let k = index[r];
                for t in 0..samples {
                    global[t][i][k] = series[t];
                }
            }
            global_horizon[i] = if row.horizon.is_finite() {
                ((row.horizon / self.ticks.time_step()).ceil() as usize).min(samples - 1)
            } else {
                samples - 1
            };
        }
        Ok(KernelSamples {
            regenerations,
            markings,
            local,
            global,
            ticks: self.ticks.clone(),
            global_horizon,
        })
    }
}

impl SubordinatedCtmc {
    /// Explore the exponential-only firings of one epoch.
    pub fn build<N: StochasticNet>(
        net: &N,
        regeneration: &DeterministicEnablingState,
    ) -> Result<SubordinatedCtmc> {
        ensure!(
            regeneration.enabling_times.values().all(|v| v.is_zero()),
            "only fresh regenerations are supported"
        );
        ensure!(
            !is_vanishing(net, &regeneration.marking)?,
            "a regeneration marking must be tangible"
        );
        let root_marking = regeneration.marking.clone();
        let general = single_general(net, &root_marking)?;

        let mut chain: Ctmc<ChainState> = Ctmc::new();
        let root = chain.add_state(ChainState::Active(root_marking.clone()));
        let mut frontier = vec![root_marking];
        let mut visited = std::collections::BTreeSet::new();
        while let Some(marking) = frontier.pop() {
            if !visited.insert(marking.clone()) {
                continue;
            }
            for t in net.enabled(&marking) {
                let feature = net.feature(&t)?;
                if !feature.distribution.is_exponential() {
                    continue;
                }
                let DelayDistribution::Exponential { rate } = &feature.distribution else {
                    unreachable!("checked above");
                };
                let clock = feature.clock_rate.evaluate(&marking);
                ensure!(clock > 0.0, "clock rate of {t} must be positive");
                let rate = rate.to_f64().unwrap_or(0.0) * clock;
                let fired = net.fire(&marking, &t)?;
                for (target, weight) in tangible(net, &fired)? {
                    match classify(net, &target, general.as_ref())? {
                        Classified::Active => {
                            chain.add_transition(
                                ChainState::Active(marking.clone()),
                                ChainState::Active(target.clone()),
                                rate * weight,
                            );
                            frontier.push(target);
                        }
                        Classified::Regeneration(r) => {
                            chain.add_transition(
                                ChainState::Active(marking.clone()),
                                ChainState::Absorbed(r),
                                rate * weight,
                            );
                        }
                    }
                }
            }
        }

        // The general firing branch of every active state.
        let mut firing_branches = vec![Vec::new(); chain.len()];
        if let Some(g) = &general {
            for i in 0..chain.len() {
                let ChainState::Active(marking) = &chain.states()[i].state else {
                    continue;
                };
                if !net.enabled(marking).contains(g) {
                    continue;
                }
                let fired = net.fire(marking, g)?;
                for (target, weight) in tangible(net, &fired)? {
                    let regen = regeneration_of(net, &target).map_err(|_| {
                        Error::Structural(format!(
                            "the general firing of {g} does not produce a regeneration"
                        ))
                    })?;
                    firing_branches[i].push((regen, weight));
                }
            }
        }

        Ok(SubordinatedCtmc {
            chain,
            root,
            general,
            firing_branches,
        })
    }

    /// The subordinated chain.
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Evaluate this epoch's kernel row on the grid.
    pub fn evaluate<N: StochasticNet>(
        &self,
        net: &N,
        ticks: &Ticks,
        epsilon: Real,
    ) -> Result<KernelRowEvaluator> {
        let grid: Vec<Real> = ticks.integral_times().collect();
        let transient = CtmcTransient::new(&self.chain)?;
        let mut initial = vec![0.0; self.chain.len()];
        initial[self.root] = 1.0;
        let occupancy = transient.solve(&initial, &grid, epsilon)?;

        let evaluations = match &self.general {
            Some(g) => {
                PrecalculatedTickEvaluations::new(&net.feature(g)?.distribution, ticks)?
            }
            None => PrecalculatedTickEvaluations {
                // No general transition: the epoch never closes by a
                // general firing.
                cdf: vec![0.0; ticks.integral_points()],
                pdf: vec![0.0; ticks.integral_points()],
            },
        };

        let samples = ticks.kernel_points();
        let mut local: BTreeMap<Marking, Vec<Real>> = BTreeMap::new();
        let mut global: BTreeMap<DeterministicEnablingState, Vec<Real>> = BTreeMap::new();
        let mut horizon: Real = 0.0;

        // Local kernel: active occupancy times general survival.
        for (i, state) in self.chain.states().iter().enumerate() {
            let ChainState::Active(marking) = &state.state else {
                continue;
            };
            let series = local
                .entry(marking.clone())
                .or_insert_with(|| vec![0.0; samples]);
            for t in 0..samples {
                let g = ticks.integral_index(t);
                series[t] += occupancy[g][i] * (1.0 - evaluations.cdf[g]);
            }
        }

        // Global kernel, as Stieltjes sums on the integral grid:
        // exponential absorption against general survival, and general
        // firing against chain occupancy.
        let mut exp_part: BTreeMap<DeterministicEnablingState, Vec<Real>> = BTreeMap::new();
        for (i, state) in self.chain.states().iter().enumerate() {
            if let ChainState::Absorbed(r) = &state.state {
                let cumulative = exp_part
                    .entry(r.clone())
                    .or_insert_with(|| vec![0.0; grid.len()]);
                let mut acc = 0.0;
                for g in 1..grid.len() {
                    let increment = occupancy[g][i] - occupancy[g - 1][i];
                    let survival =
                        1.0 - 0.5 * (evaluations.cdf[g] + evaluations.cdf[g - 1]);
                    acc += increment * survival;
                    cumulative[g] = acc;
                }
            }
        }
        let mut firing_part: BTreeMap<DeterministicEnablingState, Vec<Real>> = BTreeMap::new();
        for (i, branches) in self.firing_branches.iter().enumerate() {
            for (target, weight) in branches {
                let cumulative = firing_part
                    .entry(target.clone())
                    .or_insert_with(|| vec![0.0; grid.len()]);
                let mut acc = 0.0;
                for g in 1..grid.len() {
                    let df = evaluations.cdf[g] - evaluations.cdf[g - 1];
                    let mean_occupancy = 0.5 * (occupancy[g][i] + occupancy[g - 1][i]);
                    acc += weight * mean_occupancy * df;
                    cumulative[g] = acc;
                }
            }
        }

        for source in [exp_part, firing_part] {
            for (target, series) in source {
                let out = global
                    .entry(target)
                    .or_insert_with(|| vec![0.0; samples]);
                for t in 0..samples {
                    out[t] += series[ticks.integral_index(t)];
                }
                horizon = f64::INFINITY;
            }
        }
        // By the general delay's upper bound the epoch has surely closed,
        // so the global row stops growing there.
        if let Some(g) = &self.general {
            let upper = net.feature(g)?.distribution.upper_bound();
            if upper.is_finite() && horizon > 0.0 {
                horizon = upper.to_f64();
            }
        }

        Ok(KernelRowEvaluator {
            local,
            global,
            horizon,
        })
    }
}

enum Classified {
    Active,
    Regeneration(DeterministicEnablingState),
}

/// Classify a tangible marking inside an epoch: still subordinated, or a
/// regeneration that closes it.
fn classify<N: StochasticNet>(
    net: &N,
    marking: &Marking,
    general: Option<&Transition>,
) -> Result<Classified> {
    let enabled = net.enabled(marking);
    let mut non_exp = Vec::new();
    for t in &enabled {
        let feature = net.feature(t)?;
        if !feature.distribution.is_exponential() && !feature.distribution.is_immediate() {
            non_exp.push(t.clone());
        }
    }
    match (general, non_exp.as_slice()) {
        (Some(g), [only]) if only == g => Ok(Classified::Active),
        (_, []) => Ok(Classified::Regeneration(DeterministicEnablingState::fresh(
            marking.clone(),
            [],
        ))),
        (Some(g), rest) if rest.contains(g) => fail!(
            "multiple general transitions enabled in {marking}: the OneGen path does not apply"
        ),
        // The previous general was disabled and new ones are freshly
        // enabled: a regeneration.
        (_, rest) => Ok(Classified::Regeneration(DeterministicEnablingState::fresh(
            marking.clone(),
            rest.iter().cloned(),
        ))),
    }
}

/// The regeneration value of a marking, requiring every non-exponential
/// enabled transition to be newly enabled.
fn regeneration_of<N: StochasticNet>(
    net: &N,
    marking: &Marking,
) -> Result<DeterministicEnablingState> {
    let enabled = net.enabled(marking);
    let mut non_exp = Vec::new();
    for t in &enabled {
        let feature = net.feature(t)?;
        ensure!(
            !feature.distribution.is_immediate(),
            "vanishing marking {marking} is not a regeneration"
        );
        if !feature.distribution.is_exponential() {
            non_exp.push(t.clone());
        }
    }
    Ok(DeterministicEnablingState::fresh(marking.clone(), non_exp))
}

/// The single general (non-EXP, non-IMM) transition enabled in a marking.
fn single_general<N: StochasticNet>(net: &N, marking: &Marking) -> Result<Option<Transition>> {
    let mut general = None;
    for t in net.enabled(marking) {
        let feature = net.feature(&t)?;
        if feature.distribution.is_exponential() || feature.distribution.is_immediate() {
            continue;
        }
        if general.is_some() {
            fail!("multiple general transitions enabled in {marking}");
        }
        general = Some(t);
    }
    Ok(general)
}

/// Resolve a marking through its vanishing (immediate-only) closure:
/// the reachable tangible markings with their probabilities, via
/// `B = (I − N)⁻¹ · R` over the weight-normalized immediate firings.
fn tangible<N: StochasticNet>(net: &N, marking: &Marking) -> Result<Vec<(Marking, Real)>> {
    if !is_vanishing(net, marking)? {
        return Ok(vec![(marking.clone(), 1.0)]);
    }
    // Collect the vanishing closure.
    let mut vanishing: Vec<Marking> = Vec::new();
    let mut vanishing_index: BTreeMap<Marking, usize> = BTreeMap::new();
    let mut tangibles: Vec<Marking> = Vec::new();
    let mut tangible_index: BTreeMap<Marking, usize> = BTreeMap::new();
    let mut frontier = vec![marking.clone()];
    while let Some(m) = frontier.pop() {
        if vanishing_index.contains_key(&m) {
            continue;
        }
        vanishing_index.insert(m.clone(), vanishing.len());
        vanishing.push(m.clone());
        for (target, _) in immediate_firings(net, &m)? {
            if is_vanishing(net, &target)? {
                frontier.push(target);
            } else if !tangible_index.contains_key(&target) {
                tangible_index.insert(target.clone(), tangibles.len());
                tangibles.push(target);
            }
        }
    }

    let v = vanishing.len();
    let r = tangibles.len();
    let mut n_matrix = DMatrix::zeros(v, v);
    let mut r_matrix = DMatrix::zeros(v, r);
    for (row, m) in vanishing.iter().enumerate() {
        for (target, p) in immediate_firings(net, m)? {
            if let Some(&col) = vanishing_index.get(&target) {
                n_matrix[(row, col)] += p;
            } else {
                r_matrix[(row, tangible_index[&target])] += p;
            }
        }
    }
    let absorption = (DMatrix::identity(v, v) - n_matrix)
        .lu()
        .solve(&r_matrix)
        .ok_or_else(|| {
            Error::numeric(
                Stage::AbsorptionSolve,
                format!("time lock in the vanishing closure of {marking}"),
            )
        })?;
    let row = vanishing_index[marking];
    Ok(tangibles
        .iter()
        .enumerate()
        .map(|(col, m)| (m.clone(), absorption[(row, col)]))
        .collect())
}

/// True when an immediate transition is enabled.
fn is_vanishing<N: StochasticNet>(net: &N, marking: &Marking) -> Result<bool> {
    for t in net.enabled(marking) {
        if net.feature(&t)?.distribution.is_immediate() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Immediate firings of a vanishing marking: only the maximum-weight
/// immediate transitions fire, with normalized weights.
fn immediate_firings<N: StochasticNet>(
    net: &N,
    marking: &Marking,
) -> Result<Vec<(Marking, Real)>> {
    let mut candidates = Vec::new();
    let mut max_weight = 0.0_f64;
    for t in net.enabled(marking) {
        let feature = net.feature(&t)?;
        if feature.distribution.is_immediate() {
            let w = feature.weight.evaluate(marking);
            ensure!(w >= 0.0, "negative weight on {t}");
            candidates.push((t, w));
            max_weight = max_weight.max(w);
        }
    }
    if max_weight <= 0.0 {
        fail!("time lock: vanishing marking {marking} has zero total weight");
    }
    candidates.retain(|(_, w)| *w == max_weight);
    let total: Real = candidates.iter().map(|(_, w)| w).sum();
    let mut firings = Vec::new();
    for (t, w) in candidates {
        firings.push((net.fire(marking, &t)?, w / total));
    }
    Ok(firings)
}

//! End-to-end transient scenarios: a deterministic/exponential race
//! analyzed through the regenerative and forward-tree paths, and the
//! lower-bound property of unnormalized kernels.

mod common;

use common::FixtureNet;
use num_rational::BigRational;
use stpn_analysis::{RegenerativeTransient, TreeTransient};
use stpn_core::NopMonitor;
use stpn_math::ExactReal;
use stpn_state::{Marking, StochasticTransitionFeature};

fn rat(n: i64, d: i64) -> BigRational {
    BigRational::new(n.into(), d.into())
}

fn dec(s: &str) -> ExactReal {
    ExactReal::from_decimal_str(s).unwrap()
}

/// DET at 2.0 and EXP at rate 1.0, racing from the initial marking.
fn det_exp_net() -> FixtureNet {
    FixtureNet::new()
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

fn column(
    solution: &stpn_analysis::TransientSolution<stpn_state::DeterministicEnablingState, Marking>,
    place: &str,
) -> usize {
    solution
        .columns()
        .iter()
        .position(|m| m.get(place) > 0)
        .unwrap_or_else(|| panic!("no column marking with {place}"))
}

#[test]
fn det_exp_race_regenerative() {
    let net = det_exp_net();
    let solution = RegenerativeTransient::builder()
        .time_bound(3.0)
        .time_step(1.0)
        .compute(&net, &Marking::new().with("start", 1))
        .unwrap();
    assert_eq!(solution.samples(), 4);
    let row = solution.initial_row();
    let start = solution
        .columns()
        .iter()
        .position(|m| m.get("start") > 0)
        .unwrap();
    let det_done = column(&solution, "det_done");
    let exp_done = column(&solution, "exp_done");

    // Before the deterministic delay, the race is still open with
    // probability e^{−t}.
    assert!((solution.probability(0, row, start) - 1.0).abs() < 1e-6);
    assert!((solution.probability(1, row, start) - (-1.0_f64).exp()).abs() < 1e-6);
    assert!((solution.probability(1, row, exp_done) - (1.0 - (-1.0_f64).exp())).abs() < 1e-6);

    // At t = 2 the race is settled: the exponential won with 1 − e^{−2},
    // the deterministic with e^{−2}.
    assert!((solution.probability(2, row, exp_done) - (1.0 - (-2.0_f64).exp())).abs() < 1e-6);
    assert!((solution.probability(2, row, det_done) - (-2.0_f64).exp()).abs() < 1e-6);

    // The split persists at t = 3 and sums to one.
    let p_det = solution.probability(3, row, det_done);
    let p_exp = solution.probability(3, row, exp_done);
    assert!((p_det - (-2.0_f64).exp()).abs() < 1e-6);
    assert!((p_det + p_exp - 1.0).abs() < 1e-6);
}

#[test]
fn det_exp_race_forward_tree() {
    let net = det_exp_net();
    let solution = TreeTransient::builder()
        .time_bound(3.0)
        .time_step(1.0)
        .compute(&net, &Marking::new().with("start", 1))
        .unwrap();
    let exp_done = solution
        .columns()
        .iter()
        .position(|m| m.get("exp_done") > 0)
        .unwrap();
    let det_done = solution
        .columns()
        .iter()
        .position(|m| m.get("det_done") > 0)
        .unwrap();
    assert!((solution.probability(1, 0, exp_done) - (1.0 - (-1.0_f64).exp())).abs() < 1e-6);
    assert!((solution.probability(3, 0, exp_done) - (1.0 - (-2.0_f64).exp())).abs() < 1e-6);
    assert!((solution.probability(3, 0, det_done) - (-2.0_f64).exp()).abs() < 1e-6);
}

#[test]
fn unnormalized_kernel_rows_are_lower_bounds() {
    use stpn_analysis::regenerative::enumerate_kernels;
    use stpn_markov::Ticks;

    let net = det_exp_net();
    // The bound stops before the deterministic atom at 2, so all sampled
    // times are continuity points.
    let ticks = Ticks::new(1.5, 0.5, 1).unwrap();
    let kernel = enumerate_kernels(
        &net,
        &Marking::new().with("start", 1),
        ticks,
        stpn_analysis::Policy::Fifo,
        0.0,
        None,
        stpn_core::IndeterminatePolicy::FailFast,
        &NopMonitor,
    )
    .unwrap();
    for t in 0..kernel.samples() {
        for i in 0..kernel.regenerations.len() {
            assert!(
                kernel.row_mass(t, i) <= 1.0 + 1e-9,
                "row mass above one at t={t}, i={i}: {}",
                kernel.row_mass(t, i)
            );
        }
    }
}

#[test]
fn normalized_kernel_rows_close_the_mass() {
    use stpn_analysis::regenerative::enumerate_kernels;
    use stpn_markov::Ticks;

    let net = det_exp_net();
    let ticks = Ticks::new(1.5, 0.5, 1).unwrap();
    let mut kernel = enumerate_kernels(
        &net,
        &Marking::new().with("start", 1),
        ticks,
        stpn_analysis::Policy::Fifo,
        0.0,
        None,
        stpn_core::IndeterminatePolicy::FailFast,
        &NopMonitor,
    )
    .unwrap();
    kernel.normalize_rows();
    let i = 0;
    for t in 1..kernel.samples() {
        let mass = kernel.row_mass(t, i);
        assert!((mass - 1.0).abs() < 1e-9, "t={t}: {mass}");
    }
}

/// Uniform on [1,3] against an exponential: the uniform transition wins
/// with `∫₁³ ½ e^{−u} du`.
#[test]
fn uniform_exp_race_probability() {
    use stpn_state::SuccessionEvaluator;

    let net = FixtureNet::new()
        .transition(
            "unif",
            StochasticTransitionFeature::uniform(dec("1"), dec("3")),
            vec!["start"],
            vec!["u_done"],
        )
        .transition(
            "exp",
            StochasticTransitionFeature::exponential(rat(1, 1)),
            vec!["start"],
            vec!["e_done"],
        );
    let evaluator = SuccessionEvaluator::new(&net);
    let initial = evaluator
        .initial_state(&Marking::new().with("start", 1))
        .unwrap();
    let successions = evaluator.successors(&initial).unwrap();
    let unif_first = successions
        .iter()
        .find(|s| s.fired.name() == "unif")
        .unwrap();
    let expected = ((-1.0_f64).exp() - (-3.0_f64).exp()) / 2.0;
    assert!(
        (unif_first.probability.to_f64() - expected).abs() < 1e-9,
        "got {}",
        unif_first.probability.to_f64()
    );
    let total: f64 = successions.iter().map(|s| s.probability.to_f64()).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

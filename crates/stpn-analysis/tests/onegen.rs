//! The one-general-transition path on a deterministic/exponential race.

mod common;

use common::FixtureNet;
use num_rational::BigRational;
use stpn_analysis::OneGenTransient;
use stpn_core::NopMonitor;
use stpn_markov::Ticks;
use stpn_math::ExactReal;
use stpn_state::{Marking, StochasticTransitionFeature};

fn det_exp_net() -> FixtureNet {
    FixtureNet::new()
        .transition(
            "det",
            StochasticTransitionFeature::deterministic(
                ExactReal::from_decimal_str("2").unwrap(),
            ),
            vec!["start"],
            vec!["det_done"],
        )
        .transition(
            "exp",
            StochasticTransitionFeature::exponential(BigRational::from_integer(1.into())),
            vec!["start"],
            vec!["exp_done"],
        )
}

#[test]
fn onegen_race_redistributes_at_the_deterministic_firing() {
    let net = det_exp_net();
    // A fine integral grid keeps the Stieltjes sums accurate around the
    // deterministic atom at t = 2.
    let ticks = Ticks::new(3.0, 1.0, 64).unwrap();
    let analysis = OneGenTransient::new(ticks, 1e-9);
    let solution = analysis
        .compute(&net, &Marking::new().with("start", 1), &NopMonitor)
        .unwrap();

    let row = solution.initial_row();
    let start = solution
        .columns()
        .iter()
        .position(|m| m.get("start") > 0)
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

    // Before the deterministic delay: still racing with e^{−t}.
    assert!((solution.probability(1, row, start) - (-1.0_f64).exp()).abs() < 1e-6);
    assert!((solution.probability(1, row, exp_done) - (1.0 - (-1.0_f64).exp())).abs() < 1e-6);

    // Just past the deterministic firing the surviving mass moves to the
    // post-deterministic marking.
    assert!((solution.probability(2, row, start)).abs() < 1e-6);
    assert!(
        (solution.probability(2, row, exp_done) - (1.0 - (-2.0_f64).exp())).abs() < 1e-2
    );
    assert!((solution.probability(2, row, det_done) - (-2.0_f64).exp()).abs() < 1e-2);

    // The split is stable afterwards and sums to one.
    let p_exp = solution.probability(3, row, exp_done);
    let p_det = solution.probability(3, row, det_done);
    assert!((p_exp + p_det - 1.0).abs() < 1e-2);
}

#[test]
fn onegen_normalized_kernels_close_the_mass() {
    let net = det_exp_net();
    let ticks = Ticks::new(3.0, 1.0, 64).unwrap();
    let solution = OneGenTransient::new(ticks, 1e-9)
        .normalize_kernels(true)
        .compute(&net, &Marking::new().with("start", 1), &NopMonitor)
        .unwrap();
    let row = solution.initial_row();
    for t in 0..solution.samples() {
        let mass: f64 = (0..solution.columns().len())
            .map(|j| solution.probability(t, row, j))
            .sum();
        assert!((mass - 1.0).abs() < 1e-9, "t={t}: mass {mass}");
    }
}

#[test]
fn onegen_rejects_two_general_transitions() {
    let net = FixtureNet::new()
        .transition(
            "d1",
            StochasticTransitionFeature::deterministic(ExactReal::from(1)),
            vec!["p"],
            vec!["q"],
        )
        .transition(
            "d2",
            StochasticTransitionFeature::deterministic(ExactReal::from(2)),
            vec!["p"],
            vec!["r"],
        );
    let ticks = Ticks::new(3.0, 1.0, 8).unwrap();
    let analysis = OneGenTransient::new(ticks, 1e-9);
    assert!(analysis
        .compute(&net, &Marking::new().with("p", 1), &NopMonitor)
        .is_err());
}

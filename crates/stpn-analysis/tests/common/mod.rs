//! A minimal place/transition fixture implementing the collaborator
//! interface: each transition consumes one token from its input places
//! and produces one on its output places.

use std::collections::BTreeMap;
use stpn_core::{Error, Result};
use stpn_state::{Marking, StochasticNet, StochasticTransitionFeature, Transition};

pub struct FixtureNet {
    features: BTreeMap<Transition, StochasticTransitionFeature>,
    arcs: BTreeMap<Transition, (Vec<&'static str>, Vec<&'static str>)>,
}

impl FixtureNet {
    pub fn new() -> Self {
        FixtureNet {
            features: BTreeMap::new(),
            arcs: BTreeMap::new(),
        }
    }

    pub fn transition(
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

impl StochasticNet for FixtureNet {
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

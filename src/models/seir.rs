//! Susceptible-Exposed-Infected-Recovered model.

use super::{linear, mass_action, ModelTemplate};
use crate::error::ModelResult;
use crate::{Compartment, Flow, Model};

/// SEIR template. Exposed individuals are infected but not yet infectious.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seir {
    /// Initial susceptible value
    pub s0: f64,
    /// Initial exposed value
    pub e0: f64,
    /// Initial infectious value
    pub i0: f64,
    /// Add births and deaths
    pub vital_dynamics: bool,
}

impl Seir {
    /// Creates an SEIR template.
    pub fn new(s0: f64, e0: f64, i0: f64) -> Self {
        Seir { s0, e0, i0, vital_dynamics: false }
    }

    /// Enables vital dynamics.
    pub fn with_vital_dynamics(mut self) -> Self {
        self.vital_dynamics = true;
        self
    }
}

impl ModelTemplate for Seir {
    fn build(&self) -> ModelResult<Model> {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(self.s0))?;
        model.add_compartment(Compartment::new("Exposed", "E").with_value(self.e0).infected())?;
        model.add_compartment(Compartment::new("Infected", "I").with_value(self.i0).infected())?;
        model.add_compartment(Compartment::new("Recovered", "R"))?;

        model.add_flow(Flow::transfer("S", "E", mass_action()).with_description("Infection"))?;
        model.add_flow(Flow::transfer("E", "I", linear("sigma", "E")).with_description("Onset"))?;
        model.add_flow(Flow::transfer("I", "R", linear("gamma", "I")).with_description("Recovery"))?;
        model.set_vital_dynamics(self.vital_dynamics);
        Ok(model)
    }
}

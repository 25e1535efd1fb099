//! Susceptible-Infected-Recovered model.
//!
//! # Example
//!
//! ```
//! use compartmental::models::{ModelTemplate, Sir};
//!
//! let model = Sir::new(0.99, 0.01).build()?;
//! assert_eq!(model.compartments().len(), 3);
//! # Ok::<(), compartmental::ModelError>(())
//! ```

use super::{linear, mass_action, ModelTemplate};
use crate::error::ModelResult;
use crate::{Compartment, Flow, Model};

/// SIR template with initial susceptible and infected fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sir {
    /// Initial susceptible value
    pub s0: f64,
    /// Initial infected value
    pub i0: f64,
    /// Initial recovered value
    pub r0: f64,
    /// Add births and deaths
    pub vital_dynamics: bool,
}

impl Sir {
    /// Creates an SIR template with nobody recovered.
    pub fn new(s0: f64, i0: f64) -> Self {
        Sir { s0, i0, r0: 0.0, vital_dynamics: false }
    }

    /// Sets the initial recovered value.
    pub fn with_recovered(mut self, r0: f64) -> Self {
        self.r0 = r0;
        self
    }

    /// Enables vital dynamics.
    pub fn with_vital_dynamics(mut self) -> Self {
        self.vital_dynamics = true;
        self
    }
}

impl ModelTemplate for Sir {
    fn build(&self) -> ModelResult<Model> {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(self.s0))?;
        model.add_compartment(Compartment::new("Infected", "I").with_value(self.i0).infected())?;
        model.add_compartment(Compartment::new("Recovered", "R").with_value(self.r0))?;

        model.add_flow(Flow::transfer("S", "I", mass_action()).with_description("Infection"))?;
        model.add_flow(Flow::transfer("I", "R", linear("gamma", "I")).with_description("Recovery"))?;
        model.set_vital_dynamics(self.vital_dynamics);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;

    #[test]
    fn test_sir_structure() {
        let model = Sir::new(0.9, 0.1).with_recovered(0.0).build().unwrap();

        let names: Vec<_> = model.compartments().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Susceptible", "Infected", "Recovered"]);
        assert!(model.compartment(&Symbol::new("I")).unwrap().infection_state);
        assert_eq!(model.flows().len(), 2);
        assert!(!model.has_vital_dynamics());
    }

    #[test]
    fn test_sir_parameters() {
        let compiled = Sir::new(0.9, 0.1).with_vital_dynamics().build().unwrap().compile().unwrap();
        let params: Vec<_> = compiled.parameters().iter().map(Symbol::name).collect();
        assert_eq!(params, vec!["beta", "gamma", "mu", "tau"]);
    }
}

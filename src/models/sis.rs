//! Susceptible-Infected-Susceptible model: recovery confers no immunity.

use super::{linear, mass_action, ModelTemplate};
use crate::error::ModelResult;
use crate::{Compartment, Flow, Model};

/// SIS template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sis {
    /// Initial susceptible value
    pub s0: f64,
    /// Initial infected value
    pub i0: f64,
}

impl Sis {
    /// Creates an SIS template.
    pub fn new(s0: f64, i0: f64) -> Self {
        Sis { s0, i0 }
    }
}

impl ModelTemplate for Sis {
    fn build(&self) -> ModelResult<Model> {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(self.s0))?;
        model.add_compartment(Compartment::new("Infected", "I").with_value(self.i0).infected())?;

        model.add_flow(Flow::transfer("S", "I", mass_action()))?;
        model.add_flow(Flow::transfer("I", "S", linear("gamma", "I")))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::next_generation::r0;
    use crate::Expr;

    #[test]
    fn test_sis_r0_matches_sir() {
        let compiled = Sis::new(0.99, 0.01).build().unwrap().compile().unwrap();
        let expected = Expr::symbol("beta") * Expr::symbol("S") / Expr::symbol("gamma");
        assert_eq!(r0(&compiled).unwrap(), expected);
    }

    #[test]
    fn test_sis_is_closed() {
        let compiled = Sis::new(0.99, 0.01).build().unwrap().compile().unwrap();
        assert!(compiled.total_change().is_zero());
    }
}

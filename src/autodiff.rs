//! Jacobians of compiled rate functions.
//!
//! With the `autodiff` feature, derivatives are exact: the compiled model is
//! evaluated on `num_dual::Dual64` numbers, one seeded state at a time
//! (forward mode). Without it, forward finite differences are used.
//!
//! # Example
//!
//! ```
//! use compartmental::autodiff::rate_jacobian;
//! use compartmental::models::{ModelTemplate, Sir};
//! use compartmental::resolve;
//!
//! let compiled = Sir::new(0.9, 0.1).build()?.compile()?;
//! let subs = resolve(&compiled, &[("beta", 0.5), ("gamma", 0.2)]);
//! let values = compiled.slot_values(&compiled.initial_state(), &subs);
//!
//! let jac = rate_jacobian(&compiled, &values);
//! // d(dI/dt)/dI = beta*S - gamma
//! assert!((jac.get(1, 1) - (0.5 * 0.9 - 0.2)).abs() < 1e-6);
//! # Ok::<(), compartmental::ModelError>(())
//! ```

use crate::compiler::CompiledModel;

#[cfg(feature = "autodiff")]
use num_dual::Dual64;

/// Dense Jacobian `dF/dx` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    /// Number of functions (rows)
    pub n_equations: usize,
    /// Number of variables (columns)
    pub n_variables: usize,
    /// Entries in row-major order
    pub entries: Vec<f64>,
}

impl Jacobian {
    /// Creates a Jacobian of zeros.
    pub fn zeros(n_equations: usize, n_variables: usize) -> Self {
        Jacobian { n_equations, n_variables, entries: vec![0.0; n_equations * n_variables] }
    }

    /// Gets the element at position (i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.entries[i * self.n_variables + j]
    }

    /// Sets the element at position (i, j).
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.entries[i * self.n_variables + j] = value;
    }

    /// Returns true if the Jacobian is square.
    pub fn is_square(&self) -> bool {
        self.n_equations == self.n_variables
    }
}

/// Jacobian of `f` at `x` by forward-mode automatic differentiation.
#[cfg(feature = "autodiff")]
pub fn compute_jacobian<F>(f: F, x: &[f64]) -> Jacobian
where
    F: Fn(&[Dual64]) -> Vec<Dual64>,
{
    let mut jacobian: Option<Jacobian> = None;
    for j in 0..x.len() {
        let mut seeded: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
        seeded[j] = Dual64::from(x[j]).derivative();

        let outputs = f(&seeded);
        let jac = jacobian.get_or_insert_with(|| Jacobian::zeros(outputs.len(), x.len()));
        for (i, output) in outputs.iter().enumerate() {
            jac.set(i, j, output.eps);
        }
    }
    jacobian.unwrap_or_else(|| Jacobian::zeros(0, 0))
}

/// Jacobian of `f` at `x` by forward finite differences.
pub fn compute_jacobian_numerical<F>(f: F, x: &[f64]) -> Jacobian
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let base = f(x);
    let mut jacobian = Jacobian::zeros(base.len(), x.len());
    let mut shifted = x.to_vec();
    for j in 0..x.len() {
        let h = 1e-8 * x[j].abs().max(1.0);
        shifted[j] = x[j] + h;
        let outputs = f(&shifted);
        shifted[j] = x[j];
        for (i, (plus, at)) in outputs.iter().zip(&base).enumerate() {
            jacobian.set(i, j, (plus - at) / h);
        }
    }
    jacobian
}

/// Jacobian of the rate vector with respect to the compartment states.
///
/// `values` is a full slot vector (see [`CompiledModel::slot_values`]);
/// parameters are held fixed.
pub fn rate_jacobian(model: &CompiledModel, values: &[f64]) -> Jacobian {
    let (state, parameters) = values.split_at(model.compartments().len());
    state_jacobian(model, state, parameters)
}

#[cfg(feature = "autodiff")]
fn state_jacobian(model: &CompiledModel, state: &[f64], parameters: &[f64]) -> Jacobian {
    let parameters: Vec<Dual64> = parameters.iter().map(|&p| Dual64::from(p)).collect();
    compute_jacobian(
        |x: &[Dual64]| {
            let mut slots = x.to_vec();
            slots.extend_from_slice(&parameters);
            model.evaluate_rates(&slots)
        },
        state,
    )
}

#[cfg(not(feature = "autodiff"))]
fn state_jacobian(model: &CompiledModel, state: &[f64], parameters: &[f64]) -> Jacobian {
    compute_jacobian_numerical(
        |x: &[f64]| {
            let mut slots = x.to_vec();
            slots.extend_from_slice(parameters);
            model.evaluate_rates(&slots)
        },
        state,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelTemplate, Sir};
    use crate::substitution::resolve;

    #[test]
    fn test_jacobian_access() {
        let mut jac = Jacobian::zeros(2, 3);
        jac.set(1, 2, 5.0);
        assert_eq!(jac.get(1, 2), 5.0);
        assert_eq!(jac.entries.len(), 6);
        assert!(!jac.is_square());
    }

    #[test]
    #[cfg(feature = "autodiff")]
    fn test_compute_jacobian_simple() {
        // f(x, y) = [x^2, xy] at (2, 3): [[4, 0], [3, 2]]
        let f = |vars: &[Dual64]| vec![vars[0] * vars[0], vars[0] * vars[1]];
        let jac = compute_jacobian(f, &[2.0, 3.0]);

        assert!((jac.get(0, 0) - 4.0).abs() < 1e-12);
        assert!(jac.get(0, 1).abs() < 1e-12);
        assert!((jac.get(1, 0) - 3.0).abs() < 1e-12);
        assert!((jac.get(1, 1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_numerical_jacobian_simple() {
        let f = |vars: &[f64]| vec![vars[0] * vars[0], vars[0] * vars[1]];
        let jac = compute_jacobian_numerical(f, &[2.0, 3.0]);

        assert!((jac.get(0, 0) - 4.0).abs() < 1e-5);
        assert!((jac.get(1, 1) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sir_rate_jacobian() {
        let compiled = Sir::new(0.9, 0.1).build().unwrap().compile().unwrap();
        let subs = resolve(&compiled, &[("beta", 0.5), ("gamma", 0.2)]);
        let values = compiled.slot_values(&compiled.initial_state(), &subs);
        let jac = rate_jacobian(&compiled, &values);

        // rows/cols S, I, R
        let expected = [
            [-0.5 * 0.1, -0.5 * 0.9, 0.0],
            [0.5 * 0.1, 0.5 * 0.9 - 0.2, 0.0],
            [0.0, 0.2, 0.0],
        ];
        assert!(jac.is_square());
        for (i, row) in expected.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                assert!((jac.get(i, j) - value).abs() < 1e-6, "entry ({i}, {j})");
            }
        }
    }
}

//! Basic reproduction number by the next-generation matrix method.
//!
//! Following van den Driessche and Watmough, the change functions of the
//! infected compartments are split into new-infection terms `F` and transfer
//! terms `V`:
//!
//! 1. Every additive term of a flow leaving an infected compartment is
//!    negative, every term of a flow arriving is positive. The negative
//!    terms, in their positive form, make up a global pool.
//! 2. A positive term that is in the pool is the arrival end of a transfer
//!    between infected compartments and is subtracted from `V`. Any other
//!    positive term produces new infections and goes to `F`.
//! 3. Negative terms go to `V`.
//!
//! Terms are taken per flow, so the sign of a canonical coefficient (for
//! example `I/(tau2 - tau1)`, stored as `-I/(tau1 - tau2)`) never decides
//! which side a term belongs to.
//!
//! With `F_J` and `V_J` the Jacobians of `F` and `V` with respect to the
//! infected states, the next-generation matrix is `G = F_J * V_J^-1` and R0
//! is its dominant eigenvalue.
//!
//! # Example
//!
//! ```
//! use compartmental::models::{ModelTemplate, Seir};
//! use compartmental::next_generation::r0;
//! use compartmental::Expr;
//!
//! let compiled = Seir::new(0.99, 0.0, 0.01).build()?.compile()?;
//! let expected = Expr::symbol("beta") * Expr::symbol("S") / Expr::symbol("gamma");
//!
//! assert_eq!(r0(&compiled)?, expected);
//! # Ok::<(), compartmental::ModelError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;

use crate::compiler::{CompiledCompartment, CompiledModel};
use crate::error::{ModelError, ModelResult};
use crate::substitution::SubstitutionMap;
use crate::symbolic::{Expr, ExprMatrix, Symbol};

/// Imaginary parts below this (relative to the real part) are rounding noise.
const IMAGINARY_TOLERANCE: f64 = 1e-9;

/// Direction of an additive term in a compartment balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSign {
    /// Inflow: new infection or arrival from another compartment
    Positive,
    /// Outflow from the compartment
    Negative,
}

/// Additive terms of the balance of `compartment`, each in positive form
/// and tagged with the direction of the flow it came from.
pub fn classify(compartment: &CompiledCompartment) -> Vec<(TermSign, Expr)> {
    let tagged = |sign: TermSign, equations: &[Expr]| -> Vec<(TermSign, Expr)> {
        equations
            .iter()
            .flat_map(|equation| equation.terms())
            .map(|term| (sign, term.to_expr()))
            .collect()
    };
    let mut terms = tagged(TermSign::Positive, &compartment.inflows);
    terms.extend(tagged(TermSign::Negative, &compartment.outflows));
    terms
}

/// The `F`/`V` decomposition of a compiled model and its next-generation
/// matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct NextGenerationMatrix {
    infected: Vec<Symbol>,
    f: ExprMatrix,
    v: ExprMatrix,
    f_jacobian: ExprMatrix,
    v_jacobian: ExprMatrix,
    g: ExprMatrix,
}

impl NextGenerationMatrix {
    /// Decomposes the infected subsystem of `model`.
    ///
    /// # Errors
    ///
    /// - [`ModelError::EmptyModel`] if no compartment is infected
    /// - [`ModelError::SingularMatrix`] if `V_J` is not invertible
    pub fn from_model(model: &CompiledModel) -> ModelResult<Self> {
        let infected: Vec<_> = model.infected().collect();
        if infected.is_empty() {
            return Err(ModelError::EmptyModel("no infected compartments".into()));
        }

        let balances: Vec<_> = infected.iter().map(|c| classify(c)).collect();
        let negative_pool: BTreeSet<&Expr> = balances
            .iter()
            .flatten()
            .filter(|(sign, _)| *sign == TermSign::Negative)
            .map(|(_, expr)| expr)
            .collect();

        let mut f = Vec::with_capacity(infected.len());
        let mut v = Vec::with_capacity(infected.len());
        for balance in &balances {
            let mut new_infections = Vec::new();
            let mut transfers = Vec::new();
            for (sign, expr) in balance {
                match sign {
                    TermSign::Negative => transfers.push(expr.clone()),
                    TermSign::Positive if negative_pool.contains(expr) => transfers.push(-expr),
                    TermSign::Positive => new_infections.push(expr.clone()),
                }
            }
            f.push(new_infections.into_iter().sum::<Expr>());
            v.push(transfers.into_iter().sum::<Expr>());
        }

        let infected: Vec<Symbol> = infected.iter().map(|c| c.symbol.clone()).collect();
        let f_jacobian = ExprMatrix::jacobian(&f, &infected);
        let v_jacobian = ExprMatrix::jacobian(&v, &infected);
        let v_inverse = v_jacobian.inverse().ok_or(ModelError::SingularMatrix)?;
        let g = f_jacobian
            .checked_mul(&v_inverse)
            .ok_or_else(|| ModelError::computation("F_J and V_J^-1 dimensions disagree"))?;

        log::debug!("next-generation matrix over {} infected compartments", infected.len());

        Ok(NextGenerationMatrix {
            infected,
            f: ExprMatrix::column(f),
            v: ExprMatrix::column(v),
            f_jacobian,
            v_jacobian,
            g,
        })
    }

    /// Infected state symbols, in declaration order.
    pub fn infected(&self) -> &[Symbol] {
        &self.infected
    }

    /// New-infection column vector `F`.
    pub fn f(&self) -> &ExprMatrix {
        &self.f
    }

    /// Transfer column vector `V`.
    pub fn v(&self) -> &ExprMatrix {
        &self.v
    }

    /// `dF/dI`.
    pub fn f_jacobian(&self) -> &ExprMatrix {
        &self.f_jacobian
    }

    /// `dV/dI`.
    pub fn v_jacobian(&self) -> &ExprMatrix {
        &self.v_jacobian
    }

    /// `G = F_J * V_J^-1`.
    pub fn g(&self) -> &ExprMatrix {
        &self.g
    }

    /// Dominant eigenvalue of `G`, symbolic where possible.
    ///
    /// Fails with [`ModelError::Computation`] when the candidate eigenvalues
    /// cannot be ordered without values for their symbols.
    pub fn r0(&self) -> ModelResult<Expr> {
        dominant_eigenvalue(&self.g)
    }

    /// Dominant eigenvalue of `G` with every bound symbol substituted.
    pub fn r0_at(&self, bindings: &BTreeMap<Symbol, f64>) -> ModelResult<f64> {
        let replacements: BTreeMap<Symbol, Expr> =
            bindings.iter().map(|(s, v)| (s.clone(), Expr::constant(*v))).collect();
        let g = self.g.substitute(&replacements);
        let numeric = g.to_numeric().ok_or_else(|| {
            let unresolved: Vec<String> =
                g.free_symbols().iter().map(|s| s.name().to_string()).collect();
            ModelError::computation(format!("unresolved symbols {}", unresolved.join(", ")))
        })?;
        numeric_spectral_radius(&numeric)
    }
}

/// Returns `(F, V, G)` for `model`.
pub fn compute_fvg(model: &CompiledModel) -> ModelResult<(ExprMatrix, ExprMatrix, ExprMatrix)> {
    let ngm = NextGenerationMatrix::from_model(model)?;
    Ok((ngm.f, ngm.v, ngm.g))
}

/// Symbolic basic reproduction number of `model`.
pub fn r0(model: &CompiledModel) -> ModelResult<Expr> {
    let value = NextGenerationMatrix::from_model(model)?.r0()?;
    log::debug!("R0 = {value}");
    Ok(value)
}

/// Numeric basic reproduction number under `substitutions`.
pub fn r0_at(model: &CompiledModel, substitutions: &SubstitutionMap) -> ModelResult<f64> {
    NextGenerationMatrix::from_model(model)?.r0_at(&substitutions.bindings())
}

fn numeric_spectral_radius(g: &DMatrix<f64>) -> ModelResult<f64> {
    let eigenvalues = g.complex_eigenvalues();
    let dominant = eigenvalues
        .iter()
        .max_by(|a, b| a.re.total_cmp(&b.re))
        .ok_or_else(|| ModelError::computation("next-generation matrix is empty"))?;
    if dominant.im.abs() > IMAGINARY_TOLERANCE * dominant.re.abs().max(1.0) {
        return Err(ModelError::computation(format!(
            "dominant eigenvalue {} + {}i is not real",
            dominant.re, dominant.im
        )));
    }
    Ok(dominant.re)
}

fn dominant_eigenvalue(g: &ExprMatrix) -> ModelResult<Expr> {
    if let Some(numeric) = g.to_numeric() {
        return numeric_spectral_radius(&numeric).map(Expr::constant);
    }
    if g.is_zero() {
        return Ok(Expr::zero());
    }

    let candidates = if g.is_upper_triangular() || g.is_lower_triangular() {
        g.diagonal()
    } else if let &[k] = g.nonzero_rows().as_slice() {
        vec![g.get(k, k).clone(), Expr::zero()]
    } else if let &[k] = g.nonzero_columns().as_slice() {
        vec![g.get(k, k).clone(), Expr::zero()]
    } else if g.nrows() == 2 {
        vec![larger_root_2x2(g)?]
    } else {
        return Err(ModelError::computation(format!(
            "eigenvalues of a {0}x{0} symbolic next-generation matrix are not resolvable",
            g.nrows()
        )));
    };
    select_dominant(candidates)
}

/// `(tr + sqrt(tr^2 - 4 det)) / 2`.
fn larger_root_2x2(g: &ExprMatrix) -> ModelResult<Expr> {
    let trace = g.get(0, 0) + g.get(1, 1);
    let det = g.get(0, 0) * g.get(1, 1) - g.get(0, 1) * g.get(1, 0);
    let discriminant = &trace * &trace - 4.0 * det;
    if discriminant.as_constant().is_some_and(|d| d < 0.0) {
        return Err(ModelError::computation("eigenvalues are complex"));
    }
    Ok((trace + discriminant.sqrt()) * 0.5)
}

fn select_dominant(candidates: Vec<Expr>) -> ModelResult<Expr> {
    let unique: BTreeSet<Expr> = candidates.into_iter().collect();
    let mut unique: Vec<Expr> = unique.into_iter().collect();
    if unique.iter().any(|e| !e.is_zero()) {
        unique.retain(|e| !e.is_zero());
    }
    if unique.len() <= 1 {
        return Ok(unique.pop().unwrap_or_else(Expr::zero));
    }

    let constants: Option<Vec<f64>> = unique.iter().map(Expr::as_constant).collect();
    match constants {
        Some(values) => Ok(Expr::constant(values.into_iter().fold(f64::NEG_INFINITY, f64::max))),
        None => {
            let listed: Vec<String> = unique.iter().map(ToString::to_string).collect();
            Err(ModelError::computation(format!(
                "cannot order eigenvalues {} without parameter values",
                listed.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelTemplate, Seir, Sir};
    use crate::substitution::resolve;
    use crate::{Compartment, Flow, Model};

    fn sym(name: &str) -> Expr {
        Expr::symbol(name)
    }

    fn expected_sir() -> Expr {
        sym("beta") * sym("S") / sym("gamma")
    }

    #[test]
    fn test_sir_r0() {
        let compiled = Sir::new(0.99, 0.01).build().unwrap().compile().unwrap();
        let ngm = NextGenerationMatrix::from_model(&compiled).unwrap();

        assert_eq!(ngm.infected(), &[Symbol::new("I")]);
        assert_eq!(ngm.f().get(0, 0), &(sym("beta") * sym("S") * sym("I")));
        assert_eq!(ngm.v().get(0, 0), &(sym("gamma") * sym("I")));
        assert_eq!(r0(&compiled).unwrap(), expected_sir());

        let subs = resolve(&compiled, &[("beta", 0.3), ("gamma", 0.1)]);
        assert!((r0_at(&compiled, &subs).unwrap() - 2.97).abs() < 1e-12);
    }

    #[test]
    fn test_seir_transfer_term_goes_to_v() {
        let compiled = Seir::new(0.99, 0.0, 0.01).build().unwrap().compile().unwrap();
        let (f, v, g) = compute_fvg(&compiled).unwrap();

        // infected order is E, I
        assert_eq!(f.get(0, 0), &(sym("beta") * sym("S") * sym("I")));
        assert!(f.get(1, 0).is_zero());
        assert_eq!(v.get(0, 0), &(sym("sigma") * sym("E")));
        assert_eq!(v.get(1, 0), &(sym("gamma") * sym("I") - sym("sigma") * sym("E")));
        assert!(g.is_upper_triangular());
        assert_eq!(r0(&compiled).unwrap(), expected_sir());
    }

    #[test]
    fn test_r0_is_order_invariant() {
        let model = Seir::new(0.99, 0.0, 0.01).build().unwrap();
        let reference = r0(&model.compile().unwrap()).unwrap();

        let mut permuted = model.clone();
        permuted.move_compartment(&Symbol::new("S"), 3).unwrap();
        permuted.move_compartment(&Symbol::new("I"), 0).unwrap();
        let order: Vec<_> = permuted.compartments().iter().map(|c| c.symbol.name()).collect();
        assert_eq!(order, vec!["I", "E", "R", "S"]);

        assert_eq!(r0(&permuted.compile().unwrap()).unwrap(), reference);
    }

    #[test]
    fn test_vital_dynamics_r0() {
        let compiled =
            Sir::new(0.99, 0.01).with_vital_dynamics().build().unwrap().compile().unwrap();
        let expected = sym("beta") * sym("S") / (sym("gamma") + sym("mu"));
        assert_eq!(r0(&compiled).unwrap(), expected);
    }

    #[test]
    fn test_no_outflow_is_singular() {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(0.99)).unwrap();
        model.add_compartment(Compartment::new("Infected", "I").with_value(0.01).infected()).unwrap();
        model.add_flow(Flow::transfer("S", "I", sym("beta") * sym("S") * sym("I"))).unwrap();

        let err = r0(&model.compile().unwrap()).unwrap_err();
        assert_eq!(err, ModelError::SingularMatrix);
    }

    #[test]
    fn test_no_infected_compartments() {
        let mut model = Sir::new(0.99, 0.01).build().unwrap();
        model.toggle_infection_state(&Symbol::new("I")).unwrap();

        let err = r0(&model.compile().unwrap()).unwrap_err();
        assert!(matches!(err, ModelError::EmptyModel(_)));
    }

    #[test]
    fn test_two_strains_need_values() {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(1.0)).unwrap();
        model.add_compartment(Compartment::new("Strain 1", "I1").infected()).unwrap();
        model.add_compartment(Compartment::new("Strain 2", "I2").infected()).unwrap();
        model.add_compartment(Compartment::new("Recovered", "R")).unwrap();
        model.add_flow(Flow::transfer("S", "I1", sym("b1") * sym("S") * sym("I1"))).unwrap();
        model.add_flow(Flow::transfer("S", "I2", sym("b2") * sym("S") * sym("I2"))).unwrap();
        model.add_flow(Flow::transfer("I1", "R", sym("g1") * sym("I1"))).unwrap();
        model.add_flow(Flow::transfer("I2", "R", sym("g2") * sym("I2"))).unwrap();
        let compiled = model.compile().unwrap();

        let err = r0(&compiled).unwrap_err();
        assert!(matches!(err, ModelError::Computation(_)));

        let subs = resolve(&compiled, &[("b1", 0.3), ("g1", 0.1), ("b2", 0.2), ("g2", 0.1)]);
        assert!((r0_at(&compiled, &subs).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbound_symbols_in_r0_at() {
        let compiled = Sir::new(0.99, 0.01).build().unwrap().compile().unwrap();
        let ngm = NextGenerationMatrix::from_model(&compiled).unwrap();

        let err = ngm.r0_at(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ModelError::Computation(_)));
    }

    #[test]
    fn test_numeric_matrix_uses_spectral_radius() {
        let g = ExprMatrix::from_rows(vec![
            vec![Expr::constant(1.0), Expr::constant(2.0)],
            vec![Expr::constant(2.0), Expr::constant(1.0)],
        ])
        .unwrap();
        let value = dominant_eigenvalue(&g).unwrap().as_constant().unwrap();
        assert!((value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_symbolic_2x2_closed_form() {
        // [[0, a], [b, 0]] has eigenvalues +-sqrt(a*b)
        let g = ExprMatrix::from_rows(vec![
            vec![Expr::zero(), sym("a")],
            vec![sym("b"), Expr::zero()],
        ])
        .unwrap();
        let value = dominant_eigenvalue(&g).unwrap();

        let bindings: BTreeMap<Symbol, f64> =
            [(Symbol::new("a"), 2.0), (Symbol::new("b"), 8.0)].into_iter().collect();
        assert!((value.evaluate(&bindings).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_classify_by_flow_direction() {
        let compiled = Seir::new(0.99, 0.0, 0.01).build().unwrap().compile().unwrap();
        let infectious = compiled.compartment(&Symbol::new("I")).unwrap();

        assert_eq!(
            classify(infectious),
            vec![
                (TermSign::Positive, sym("sigma") * sym("E")),
                (TermSign::Negative, sym("gamma") * sym("I")),
            ]
        );
    }

    #[test]
    fn test_recovery_rate_with_group_denominator() {
        // I/(tau2 - tau1) is stored with a negative leading coefficient
        let recovery = sym("I") / (sym("tau2") - sym("tau1"));
        assert!(recovery.terms()[0].coefficient() < 0.0);

        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(0.99)).unwrap();
        model.add_compartment(Compartment::new("Infected", "I").with_value(0.01).infected()).unwrap();
        model.add_compartment(Compartment::new("Recovered", "R")).unwrap();
        model.add_flow(Flow::transfer("S", "I", sym("beta") * sym("S") * sym("I"))).unwrap();
        model.add_flow(Flow::transfer("I", "R", recovery.clone())).unwrap();
        let compiled = model.compile().unwrap();

        let ngm = NextGenerationMatrix::from_model(&compiled).unwrap();
        assert_eq!(ngm.f().get(0, 0), &(sym("beta") * sym("S") * sym("I")));
        assert_eq!(ngm.v().get(0, 0), &recovery);

        let expected = sym("beta") * sym("S") * (sym("tau2") - sym("tau1"));
        assert_eq!(r0(&compiled).unwrap(), expected);

        let subs = resolve(&compiled, &[("beta", 0.5), ("tau1", 1.0), ("tau2", 5.0)]);
        assert!((r0_at(&compiled, &subs).unwrap() - 0.5 * 0.99 * 4.0).abs() < 1e-9);
    }
}

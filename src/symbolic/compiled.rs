//! Slot-indexed numeric form of an [`Expr`].

use std::collections::BTreeMap;

use super::{Atom, Expr, Symbol};
use crate::error::{ModelError, ModelResult};
use crate::Scalar;

#[derive(Debug, Clone, PartialEq)]
enum CompiledAtom {
    Slot(usize),
    Group(CompiledExpr),
    Sqrt(CompiledExpr),
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledTerm {
    coefficient: f64,
    factors: Vec<(CompiledAtom, i32)>,
}

/// An expression lowered to a numerically callable function.
///
/// Symbols are resolved to slot indices once, at compile time, so evaluation
/// is a plain walk over a value slice. Evaluation is generic over [`Scalar`],
/// which lets the same function run on `f64` or on dual numbers for
/// Jacobians.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    terms: Vec<CompiledTerm>,
}

impl CompiledExpr {
    /// Lowers `expr` against a symbol-to-slot table.
    ///
    /// Fails with [`ModelError::UnboundSymbol`] if a symbol has no slot, and
    /// with [`ModelError::Definition`] if a coefficient is not finite (for
    /// example after a division by zero).
    pub fn compile(expr: &Expr, slots: &BTreeMap<Symbol, usize>) -> ModelResult<Self> {
        let mut terms = Vec::with_capacity(expr.terms().len());
        for term in expr.terms() {
            if !term.coefficient().is_finite() {
                return Err(ModelError::definition(format!(
                    "non-finite coefficient {} in `{expr}`",
                    term.coefficient()
                )));
            }
            let mut factors = Vec::with_capacity(term.monomial().factors().len());
            for (atom, k) in term.monomial().factors() {
                let compiled = match atom {
                    Atom::Symbol(s) => CompiledAtom::Slot(
                        *slots.get(s).ok_or_else(|| ModelError::UnboundSymbol(s.clone()))?,
                    ),
                    Atom::Group(inner) => CompiledAtom::Group(CompiledExpr::compile(inner, slots)?),
                    Atom::Sqrt(inner) => CompiledAtom::Sqrt(CompiledExpr::compile(inner, slots)?),
                };
                factors.push((compiled, *k));
            }
            terms.push(CompiledTerm { coefficient: term.coefficient(), factors });
        }
        Ok(CompiledExpr { terms })
    }

    /// Evaluates the expression with `values[slot]` bound to each symbol.
    ///
    /// `values` must cover every slot used at compile time.
    pub fn eval<S: Scalar>(&self, values: &[S]) -> S {
        let mut total = S::from(0.0);
        for term in &self.terms {
            let mut product = S::from(term.coefficient);
            for (atom, k) in &term.factors {
                let base = match atom {
                    CompiledAtom::Slot(index) => values[*index],
                    CompiledAtom::Group(inner) => inner.eval(values),
                    CompiledAtom::Sqrt(inner) => inner.eval(values).sqrt(),
                };
                product = product * base.powi(*k);
            }
            total = total + product;
        }
        total
    }
}

//! Symbolic expressions for compartment flows.
//!
//! This module provides the small algebra the model core needs: building rate
//! expressions out of symbols and constants, expanding them into additive
//! terms, differentiating, substituting and evaluating them.
//!
//! Every [`Expr`] is kept in a canonical form:
//!
//! - an expression is a sorted sum of [`Term`]s with distinct monomials,
//! - a term is a signed `f64` coefficient times a [`Monomial`],
//! - a monomial is a sorted product of atoms raised to non-zero integer powers.
//!
//! Atoms are plain symbols, *groups* (a multi-term sum that only ever occurs
//! with a negative exponent, i.e. in a denominator) and square roots. Because
//! the form is canonical, structural equality is algebraic equality for
//! polynomial and Laurent-polynomial expressions, and the derived total order
//! is stable across runs and input orderings.
//!
//! # Example
//!
//! ```
//! use compartmental::symbolic::{Expr, Symbol};
//!
//! let beta = Expr::symbol("beta");
//! let s = Expr::symbol("S");
//! let i = Expr::symbol("I");
//!
//! let infection = &beta * &s * &i;
//! let d_di = infection.diff(&Symbol::new("I"));
//!
//! assert_eq!(d_di, &beta * &s);
//! assert_eq!(d_di.to_string(), "S*beta");
//! ```

mod compiled;
mod matrix;

pub use compiled::CompiledExpr;
pub use matrix::ExprMatrix;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::{ModelError, ModelResult};

/// Relative magnitude below which merged coefficients count as cancelled.
const CANCELLATION_TOLERANCE: f64 = 1e-12;

/// A named algebraic symbol (compartment state or rate parameter).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a symbol with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    /// Gets the symbol name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Symbol(name)
    }
}

/// An irreducible factor of a monomial.
#[derive(Debug, Clone)]
pub enum Atom {
    /// A free symbol
    Symbol(Symbol),
    /// A normalised multi-term sum, only stored with negative exponents
    Group(Expr),
    /// The principal square root of an expression
    Sqrt(Expr),
}

impl Atom {
    fn rank(&self) -> u8 {
        match self {
            Atom::Symbol(_) => 0,
            Atom::Group(_) => 1,
            Atom::Sqrt(_) => 2,
        }
    }

    fn diff(&self, x: &Symbol) -> Expr {
        match self {
            Atom::Symbol(s) if s == x => Expr::one(),
            Atom::Symbol(_) => Expr::zero(),
            Atom::Group(inner) => inner.diff(x),
            Atom::Sqrt(inner) => {
                let d_inner = inner.diff(x);
                if d_inner.is_zero() {
                    return Expr::zero();
                }
                d_inner * 0.5 * Expr::atom(self.clone(), -1)
            }
        }
    }

    fn substitute(&self, replacements: &BTreeMap<Symbol, Expr>) -> Expr {
        match self {
            Atom::Symbol(s) => {
                replacements.get(s).cloned().unwrap_or_else(|| Expr::from(s.clone()))
            }
            Atom::Group(inner) => inner.substitute(replacements),
            Atom::Sqrt(inner) => inner.substitute(replacements).sqrt(),
        }
    }

    fn evaluate(&self, bindings: &BTreeMap<Symbol, f64>) -> ModelResult<f64> {
        match self {
            Atom::Symbol(s) => {
                bindings.get(s).copied().ok_or_else(|| ModelError::UnboundSymbol(s.clone()))
            }
            Atom::Group(inner) => inner.evaluate(bindings),
            Atom::Sqrt(inner) => Ok(inner.evaluate(bindings)?.sqrt()),
        }
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Atom::Symbol(s) => {
                out.insert(s.clone());
            }
            Atom::Group(inner) | Atom::Sqrt(inner) => inner.collect_symbols(out),
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Atom::Symbol(a), Atom::Symbol(b)) => a.cmp(b),
            (Atom::Group(a), Atom::Group(b)) | (Atom::Sqrt(a), Atom::Sqrt(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbol(s) => write!(f, "{s}"),
            Atom::Group(inner) => write!(f, "({inner})"),
            Atom::Sqrt(inner) => write!(f, "sqrt({inner})"),
        }
    }
}

/// A product of atoms with non-zero integer exponents, sorted by atom.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Monomial {
    factors: Vec<(Atom, i32)>,
}

impl Monomial {
    /// The empty product.
    pub fn one() -> Self {
        Monomial { factors: Vec::new() }
    }

    fn single(atom: Atom, exponent: i32) -> Self {
        if exponent == 0 {
            return Monomial::one();
        }
        Monomial { factors: vec![(atom, exponent)] }
    }

    /// Returns true for the empty product.
    pub fn is_one(&self) -> bool {
        self.factors.is_empty()
    }

    /// Gets the `(atom, exponent)` factors in canonical order.
    pub fn factors(&self) -> &[(Atom, i32)] {
        &self.factors
    }

    fn mul(&self, other: &Monomial) -> Monomial {
        let mut factors = Vec::with_capacity(self.factors.len() + other.factors.len());
        let mut left = self.factors.iter().peekable();
        let mut right = other.factors.iter().peekable();
        loop {
            let next = match (left.peek(), right.peek()) {
                (Some((a, _)), Some((b, _))) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            match next {
                Ordering::Less => factors.extend(left.next().cloned()),
                Ordering::Greater => factors.extend(right.next().cloned()),
                Ordering::Equal => {
                    if let (Some((atom, a)), Some((_, b))) = (left.next(), right.next()) {
                        if a + b != 0 {
                            factors.push((atom.clone(), a + b));
                        }
                    }
                }
            }
        }
        Monomial { factors }
    }

    fn powi(&self, n: i32) -> Monomial {
        if n == 0 {
            return Monomial::one();
        }
        Monomial { factors: self.factors.iter().map(|(atom, k)| (atom.clone(), k * n)).collect() }
    }

    fn symbol_exponent(&self, symbol: &Symbol) -> i32 {
        self.factors
            .iter()
            .find_map(|(atom, k)| match atom {
                Atom::Symbol(s) if s == symbol => Some(*k),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Largest symbol monomial dividing every term (positive exponents only).
    fn common_factor(terms: &[Term]) -> Monomial {
        let Some(first) = terms.first() else {
            return Monomial::one();
        };
        let factors = first
            .monomial
            .factors
            .iter()
            .filter_map(|(atom, _)| match atom {
                Atom::Symbol(s) => {
                    let min = terms.iter().map(|t| t.monomial.symbol_exponent(s)).min()?;
                    (min > 0).then(|| (atom.clone(), min))
                }
                _ => None,
            })
            .collect();
        Monomial { factors }
    }
}

/// A signed coefficient times a monomial: one additive term of an [`Expr`].
#[derive(Debug, Clone)]
pub struct Term {
    coefficient: f64,
    monomial: Monomial,
}

impl Term {
    /// Gets the signed numeric coefficient.
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Gets the symbolic part of the term.
    pub fn monomial(&self) -> &Monomial {
        &self.monomial
    }

    /// The term as a standalone expression.
    pub fn to_expr(&self) -> Expr {
        Expr { terms: vec![self.clone()] }
    }

    /// Rewrites positive group powers and `sqrt(x)^2` so the term is canonical.
    fn expand_into(self, out: &mut Vec<Term>) {
        let position = self.monomial.factors.iter().position(|(atom, k)| match atom {
            Atom::Symbol(_) => false,
            Atom::Group(_) => *k > 0,
            Atom::Sqrt(_) => k.abs() >= 2,
        });
        let Some(position) = position else {
            out.push(self);
            return;
        };

        let mut rest = self.monomial;
        let (atom, k) = rest.factors.remove(position);
        let rest = Expr { terms: vec![Term { coefficient: self.coefficient, monomial: rest }] };
        let expanded = match atom {
            Atom::Group(inner) => &rest * &inner.pow(k),
            Atom::Sqrt(inner) => {
                let root = Expr::atom(Atom::Sqrt(inner.clone()), k % 2);
                &rest * &root * inner.pow(k / 2)
            }
            Atom::Symbol(_) => rest,
        };
        out.extend(expanded.terms);
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Term {}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.monomial
            .cmp(&other.monomial)
            .then_with(|| self.coefficient.total_cmp(&other.coefficient))
    }
}

/// A symbolic expression in canonical sum-of-terms form.
#[derive(Debug, Clone, Default)]
pub struct Expr {
    terms: Vec<Term>,
}

impl Expr {
    /// The zero expression.
    pub fn zero() -> Self {
        Expr { terms: Vec::new() }
    }

    /// The constant one.
    pub fn one() -> Self {
        Expr::constant(1.0)
    }

    /// A numeric constant.
    pub fn constant(value: f64) -> Self {
        Expr::from_terms(vec![Term { coefficient: value, monomial: Monomial::one() }])
    }

    /// A single free symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::from(Symbol::new(name))
    }

    fn atom(atom: Atom, exponent: i32) -> Self {
        Expr::from_terms(vec![Term { coefficient: 1.0, monomial: Monomial::single(atom, exponent) }])
    }

    fn from_terms(raw: Vec<Term>) -> Self {
        let mut expanded = Vec::with_capacity(raw.len());
        for term in raw {
            if term.coefficient != 0.0 {
                term.expand_into(&mut expanded);
            }
        }
        expanded.sort_by(|a, b| a.monomial.cmp(&b.monomial));

        let mut terms: Vec<Term> = Vec::with_capacity(expanded.len());
        let mut scale = 0.0_f64;
        for term in expanded {
            let like = terms.last().is_some_and(|last| last.monomial == term.monomial);
            if like {
                if let Some(last) = terms.last_mut() {
                    scale = scale.max(term.coefficient.abs());
                    last.coefficient += term.coefficient;
                }
            } else {
                Self::drop_cancelled(&mut terms, scale);
                scale = term.coefficient.abs();
                terms.push(term);
            }
        }
        Self::drop_cancelled(&mut terms, scale);
        Expr { terms }
    }

    fn drop_cancelled(terms: &mut Vec<Term>, scale: f64) {
        if let Some(last) = terms.last() {
            let c = last.coefficient;
            if c == 0.0 || c.abs() <= CANCELLATION_TOLERANCE * scale {
                terms.pop();
            }
        }
    }

    /// Gets the additive terms in canonical order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Returns true if the expression is identically zero.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns the value if the expression contains no symbols.
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.as_slice() {
            [] => Some(0.0),
            [term] if term.monomial.is_one() => Some(term.coefficient),
            _ => None,
        }
    }

    /// Returns true if every coefficient, including nested ones, is finite.
    pub fn is_finite(&self) -> bool {
        self.terms.iter().all(|term| {
            term.coefficient.is_finite()
                && term.monomial.factors.iter().all(|(atom, _)| match atom {
                    Atom::Symbol(_) => true,
                    Atom::Group(inner) | Atom::Sqrt(inner) => inner.is_finite(),
                })
        })
    }

    /// Collects every free symbol of the expression.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        for term in &self.terms {
            for (atom, _) in &term.monomial.factors {
                atom.collect_symbols(out);
            }
        }
    }

    fn add_expr(a: &Expr, b: &Expr) -> Expr {
        Expr::from_terms(a.terms.iter().chain(b.terms.iter()).cloned().collect())
    }

    fn sub_expr(a: &Expr, b: &Expr) -> Expr {
        Expr::add_expr(a, &-b)
    }

    fn mul_expr(a: &Expr, b: &Expr) -> Expr {
        let mut raw = Vec::with_capacity(a.terms.len() * b.terms.len());
        for x in &a.terms {
            for y in &b.terms {
                raw.push(Term {
                    coefficient: x.coefficient * y.coefficient,
                    monomial: x.monomial.mul(&y.monomial),
                });
            }
        }
        Expr::from_terms(raw)
    }

    fn div_expr(a: &Expr, b: &Expr) -> Expr {
        Expr::mul_expr(a, &b.recip())
    }

    /// Multiplicative inverse.
    ///
    /// A multi-term denominator is normalised (common symbol factor removed,
    /// leading coefficient one) so equal denominators compare equal. The
    /// reciprocal of zero is a NaN constant.
    pub fn recip(&self) -> Expr {
        match self.terms.as_slice() {
            [] => Expr::constant(f64::NAN),
            [term] => Expr::from_terms(vec![Term {
                coefficient: term.coefficient.recip(),
                monomial: term.monomial.powi(-1),
            }]),
            terms => {
                let common = Monomial::common_factor(terms);
                let inverse_common = common.powi(-1);
                let content = Expr::from_terms(
                    terms
                        .iter()
                        .map(|t| Term {
                            coefficient: t.coefficient,
                            monomial: t.monomial.mul(&inverse_common),
                        })
                        .collect(),
                );
                let lead = content.terms.first().map_or(1.0, |t| t.coefficient);
                let content = Expr {
                    terms: content
                        .terms
                        .into_iter()
                        .map(|t| Term { coefficient: t.coefficient / lead, monomial: t.monomial })
                        .collect(),
                };
                let monomial = inverse_common.mul(&Monomial::single(Atom::Group(content), -1));
                Expr::from_terms(vec![Term { coefficient: lead.recip(), monomial }])
            }
        }
    }

    /// Integer power. Negative powers go through [`Expr::recip`].
    pub fn pow(&self, n: i32) -> Expr {
        if n < 0 {
            return self.recip().pow(-n);
        }
        let mut result = Expr::one();
        let mut base = self.clone();
        let mut e = n.unsigned_abs();
        while e > 0 {
            if e & 1 == 1 {
                result = &result * &base;
            }
            e >>= 1;
            if e > 0 {
                base = &base * &base;
            }
        }
        result
    }

    /// Principal square root.
    pub fn sqrt(&self) -> Expr {
        match self.terms.as_slice() {
            [] => Expr::zero(),
            [term] if term.monomial.is_one() => Expr::constant(term.coefficient.sqrt()),
            [term]
                if term.coefficient > 0.0
                    && term.monomial.factors.iter().all(|(_, k)| k % 2 == 0) =>
            {
                Expr::from_terms(vec![Term {
                    coefficient: term.coefficient.sqrt(),
                    monomial: Monomial {
                        factors: term
                            .monomial
                            .factors
                            .iter()
                            .map(|(atom, k)| (atom.clone(), k / 2))
                            .collect(),
                    },
                }])
            }
            terms => {
                let lead = terms[0].coefficient;
                if lead > 0.0 {
                    Expr::constant(lead.sqrt()) * Expr::atom(Atom::Sqrt(self / lead), 1)
                } else {
                    Expr::atom(Atom::Sqrt(self.clone()), 1)
                }
            }
        }
    }

    /// Partial derivative with respect to `x`.
    pub fn diff(&self, x: &Symbol) -> Expr {
        let mut result = Expr::zero();
        for term in &self.terms {
            for (index, (atom, k)) in term.monomial.factors.iter().enumerate() {
                let d_atom = atom.diff(x);
                if d_atom.is_zero() {
                    continue;
                }
                let mut monomial = term.monomial.clone();
                if *k == 1 {
                    monomial.factors.remove(index);
                } else {
                    monomial.factors[index].1 = k - 1;
                }
                let outer = Expr::from_terms(vec![Term {
                    coefficient: term.coefficient * f64::from(*k),
                    monomial,
                }]);
                result = result + outer * d_atom;
            }
        }
        result
    }

    /// Replaces symbols by expressions.
    pub fn substitute(&self, replacements: &BTreeMap<Symbol, Expr>) -> Expr {
        self.terms
            .iter()
            .map(|term| {
                term.monomial.factors.iter().fold(Expr::constant(term.coefficient), |acc, (atom, k)| {
                    acc * atom.substitute(replacements).pow(*k)
                })
            })
            .sum()
    }

    /// Evaluates the expression numerically.
    ///
    /// Fails with [`ModelError::UnboundSymbol`] if a symbol has no value.
    pub fn evaluate(&self, bindings: &BTreeMap<Symbol, f64>) -> ModelResult<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            let mut value = term.coefficient;
            for (atom, k) in &term.monomial.factors {
                value *= atom.evaluate(bindings)?.powi(*k);
            }
            total += value;
        }
        Ok(total)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Expr {}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.terms.cmp(&other.terms)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Expr::atom(Atom::Symbol(symbol), 1)
    }
}

impl From<&Symbol> for Expr {
    fn from(symbol: &Symbol) -> Self {
        Expr::from(symbol.clone())
    }
}

macro_rules! forward_binop {
    ($op:ident, $method:ident, $body:path) => {
        impl $op<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $body(self, rhs)
            }
        }

        impl $op<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $body(&self, &rhs)
            }
        }

        impl $op<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $body(&self, rhs)
            }
        }

        impl $op<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $body(self, &rhs)
            }
        }

        impl $op<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                $body(&self, &Expr::constant(rhs))
            }
        }

        impl $op<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                $body(self, &Expr::constant(rhs))
            }
        }

        impl $op<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $body(&Expr::constant(self), &rhs)
            }
        }

        impl $op<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $body(&Expr::constant(self), rhs)
            }
        }
    };
}

forward_binop!(Add, add, Expr::add_expr);
forward_binop!(Sub, sub, Expr::sub_expr);
forward_binop!(Mul, mul, Expr::mul_expr);
forward_binop!(Div, div, Expr::div_expr);

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr {
            terms: self
                .terms
                .iter()
                .map(|t| Term { coefficient: -t.coefficient, monomial: t.monomial.clone() })
                .collect(),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -&self
    }
}

impl Sum for Expr {
    fn sum<I: Iterator<Item = Expr>>(iter: I) -> Self {
        Expr::from_terms(iter.flat_map(|e| e.terms).collect())
    }
}

impl<'a> Sum<&'a Expr> for Expr {
    fn sum<I: Iterator<Item = &'a Expr>>(iter: I) -> Self {
        Expr::from_terms(iter.flat_map(|e| e.terms.iter().cloned()).collect())
    }
}

fn write_factor(f: &mut fmt::Formatter<'_>, atom: &Atom, exponent: i32) -> fmt::Result {
    if exponent == 1 {
        write!(f, "{atom}")
    } else {
        write!(f, "{atom}^{exponent}")
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, magnitude: f64, monomial: &Monomial) -> fmt::Result {
    let numerator: Vec<_> = monomial.factors.iter().filter(|(_, k)| *k > 0).collect();
    let denominator: Vec<_> = monomial.factors.iter().filter(|(_, k)| *k < 0).collect();

    let mut first = true;
    if magnitude != 1.0 || numerator.is_empty() {
        write!(f, "{magnitude}")?;
        first = false;
    }
    for (atom, k) in numerator {
        if !first {
            f.write_str("*")?;
        }
        write_factor(f, atom, *k)?;
        first = false;
    }
    match denominator.as_slice() {
        [] => Ok(()),
        [(atom, k)] => {
            f.write_str("/")?;
            write_factor(f, atom, -k)
        }
        factors => {
            f.write_str("/(")?;
            for (index, (atom, k)) in factors.iter().enumerate() {
                if index > 0 {
                    f.write_str("*")?;
                }
                write_factor(f, atom, -k)?;
            }
            f.write_str(")")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("0");
        }
        for (index, term) in self.terms.iter().enumerate() {
            let negative = term.coefficient < 0.0;
            match (index, negative) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }
            write_term(f, term.coefficient.abs(), &term.monomial)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Expr {
        Expr::symbol(name)
    }

    #[test]
    fn test_addition_is_order_independent() {
        let a = sym("a") + sym("b") + 2.0;
        let b = 2.0 + sym("b") + sym("a");
        assert_eq!(a, b);
        assert_eq!(a.terms().len(), 3);
    }

    #[test]
    fn test_cancellation_gives_zero() {
        let x = sym("beta") * sym("S") * sym("I");
        let diff = &x - &x;
        assert!(diff.is_zero());
        assert_eq!(diff.to_string(), "0");
    }

    #[test]
    fn test_like_terms_merge() {
        let x = sym("x");
        let e = &x + &x + 3.0 * &x;
        assert_eq!(e.terms().len(), 1);
        assert_eq!(e.terms()[0].coefficient(), 5.0);
    }

    #[test]
    fn test_distribution() {
        let (a, b, c) = (sym("a"), sym("b"), sym("c"));
        let left = (&a + &b) * &c;
        let right = &a * &c + &b * &c;
        assert_eq!(left, right);
    }

    #[test]
    fn test_product_rule_derivative() {
        let x = Symbol::new("x");
        let e = Expr::from(&x).pow(3) * sym("k");
        let d = e.diff(&x);
        assert_eq!(d, 3.0 * sym("k") * Expr::from(&x).pow(2));
    }

    #[test]
    fn test_derivative_of_quotient() {
        let x = Symbol::new("x");
        let e = Expr::one() / (Expr::from(&x) + 1.0);
        let d = e.diff(&x);
        let mut bindings = BTreeMap::new();
        bindings.insert(x.clone(), 1.0);
        // d/dx 1/(x+1) = -1/(x+1)^2 = -0.25 at x = 1
        assert!((d.evaluate(&bindings).unwrap() + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_term_reciprocal() {
        let e = sym("beta") * sym("S") / sym("gamma");
        assert_eq!(e.to_string(), "S*beta/gamma");
        assert_eq!(e.recip().recip(), e);
    }

    #[test]
    fn test_group_denominators_normalise() {
        let (a, b) = (sym("a"), sym("b"));
        let left = Expr::one() / (2.0 * &a + 2.0 * &b);
        let right = 0.5 / (&a + &b);
        assert_eq!(left, right);

        let common = Expr::one() / (&a * &b + &a);
        let factored = Expr::one() / (&a * (&b + 1.0));
        assert_eq!(common, factored);
    }

    #[test]
    fn test_group_times_content_expands() {
        let sum = sym("gamma") + sym("mu");
        let e = sum.recip().recip();
        assert_eq!(e, sum);
    }

    #[test]
    fn test_sqrt() {
        let x = sym("x");
        assert_eq!((&x * &x * 4.0).sqrt(), 2.0 * &x);
        let root = (&x + 1.0).sqrt();
        assert_eq!(&root * &root, &x + 1.0);
        assert_eq!(Expr::constant(9.0).sqrt().as_constant(), Some(3.0));
    }

    #[test]
    fn test_substitute_and_evaluate() {
        let e = sym("beta") * sym("S") / sym("gamma");
        let mut replacements = BTreeMap::new();
        replacements.insert(Symbol::new("S"), Expr::constant(0.5));
        let partial = e.substitute(&replacements);
        assert_eq!(partial, 0.5 * sym("beta") / sym("gamma"));

        let mut bindings = BTreeMap::new();
        bindings.insert(Symbol::new("beta"), 0.4);
        bindings.insert(Symbol::new("gamma"), 0.1);
        assert!((partial.evaluate(&bindings).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_unbound_symbol() {
        let e = sym("beta") + 1.0;
        let err = e.evaluate(&BTreeMap::new()).unwrap_err();
        assert_eq!(err, ModelError::UnboundSymbol(Symbol::new("beta")));
    }

    #[test]
    fn test_free_symbols() {
        let e = sym("beta") * sym("S") * sym("I") / (sym("N") + sym("k"));
        let names: Vec<_> = e.free_symbols().into_iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["I", "N", "S", "beta", "k"]);
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        let e = sym("x") / Expr::zero();
        assert!(!e.is_finite());
    }

    #[test]
    fn test_display() {
        let e = sym("gamma") * sym("I") - sym("beta") * sym("S") * sym("I") * 2.0;
        assert_eq!(e.to_string(), "-2*I*S*beta + I*gamma");
        assert_eq!((sym("x") / (sym("a") + sym("b"))).to_string(), "x/(a + b)");
    }
}

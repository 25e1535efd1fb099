//! Binding free parameters to numeric values.
//!
//! A compiled model's free parameters are the symbols its flow equations use
//! that are not compartments. [`SubstitutionResolver`] fills each one from a
//! list of overrides. By default a parameter without an override is bound to
//! zero (with a warning); [`ResolvePolicy::Strict`] turns that into an error.

use std::collections::BTreeMap;

use crate::compiler::CompiledModel;
use crate::error::{ModelError, ModelResult};
use crate::symbolic::Symbol;

/// What to do with a parameter that has no override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// Bind it to zero
    #[default]
    ZeroDefault,
    /// Fail with [`ModelError::Definition`]
    Strict,
}

/// Numeric bindings for one evaluation of a compiled model.
///
/// Holds compartment symbols bound to their current values and free
/// parameters bound to their resolved values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstitutionMap {
    compartments: BTreeMap<Symbol, f64>,
    parameters: BTreeMap<Symbol, f64>,
    defaulted: Vec<Symbol>,
}

impl SubstitutionMap {
    /// Value bound to a compartment or parameter symbol.
    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        self.compartments.get(symbol).or_else(|| self.parameters.get(symbol)).copied()
    }

    /// Value bound to a parameter symbol.
    pub fn parameter(&self, symbol: &Symbol) -> Option<f64> {
        self.parameters.get(symbol).copied()
    }

    /// Parameter bindings.
    pub fn parameters(&self) -> &BTreeMap<Symbol, f64> {
        &self.parameters
    }

    /// Compartment bindings.
    pub fn compartments(&self) -> &BTreeMap<Symbol, f64> {
        &self.compartments
    }

    /// Parameters that received the zero default.
    pub fn defaulted(&self) -> &[Symbol] {
        &self.defaulted
    }

    /// Overrides a parameter value.
    pub fn set_parameter(&mut self, symbol: impl Into<Symbol>, value: f64) {
        let symbol = symbol.into();
        self.defaulted.retain(|s| s != &symbol);
        self.parameters.insert(symbol, value);
    }

    /// Every binding, compartments and parameters together.
    pub fn bindings(&self) -> BTreeMap<Symbol, f64> {
        self.compartments
            .iter()
            .chain(self.parameters.iter())
            .map(|(symbol, value)| (symbol.clone(), *value))
            .collect()
    }
}

/// Resolves free parameters of a compiled model.
///
/// # Examples
///
/// ```
/// use compartmental::{Compartment, Expr, Flow, Model, ModelError, SubstitutionResolver};
///
/// let mut model = Model::new();
/// model.add_compartment(Compartment::new("Infected", "I").with_value(1.0))?;
/// model.add_flow(Flow::outflow("I", Expr::symbol("gamma") * Expr::symbol("I")))?;
/// let compiled = model.compile()?;
///
/// let lenient = SubstitutionResolver::new().resolve(&compiled, &[])?;
/// assert_eq!(lenient.parameter(&"gamma".into()), Some(0.0));
///
/// let strict = SubstitutionResolver::strict().resolve(&compiled, &[]);
/// assert!(matches!(strict, Err(ModelError::Definition(_))));
/// # Ok::<(), ModelError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstitutionResolver {
    policy: ResolvePolicy,
}

impl SubstitutionResolver {
    /// Resolver with the zero-default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that rejects missing overrides.
    pub fn strict() -> Self {
        SubstitutionResolver { policy: ResolvePolicy::Strict }
    }

    /// Sets the policy.
    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gets the policy.
    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    /// Builds the binding map for `model` from `overrides`.
    ///
    /// Overrides naming symbols that are not free parameters are ignored.
    pub fn resolve(
        &self,
        model: &CompiledModel,
        overrides: &[(&str, f64)],
    ) -> ModelResult<SubstitutionMap> {
        let map = build(model, overrides);
        if self.policy == ResolvePolicy::Strict && !map.defaulted.is_empty() {
            let names: Vec<&str> = map.defaulted.iter().map(Symbol::name).collect();
            return Err(ModelError::definition(format!(
                "no value given for parameter(s) {}",
                names.join(", ")
            )));
        }
        for symbol in &map.defaulted {
            log::warn!("parameter `{symbol}` has no value, defaulting to 0");
        }
        Ok(map)
    }
}

/// Zero-default resolution; never fails.
pub fn resolve(model: &CompiledModel, overrides: &[(&str, f64)]) -> SubstitutionMap {
    let map = build(model, overrides);
    for symbol in &map.defaulted {
        log::warn!("parameter `{symbol}` has no value, defaulting to 0");
    }
    map
}

fn build(model: &CompiledModel, overrides: &[(&str, f64)]) -> SubstitutionMap {
    let given: BTreeMap<Symbol, f64> =
        overrides.iter().map(|(name, value)| (Symbol::new(*name), *value)).collect();

    for symbol in given.keys() {
        if !model.parameters().contains(symbol) {
            log::debug!("ignoring override for `{symbol}`: not a free parameter");
        }
    }

    let compartments =
        model.compartments().iter().map(|c| (c.symbol.clone(), c.initial_value)).collect();

    let mut parameters = BTreeMap::new();
    let mut defaulted = Vec::new();
    for symbol in model.parameters() {
        let value = match given.get(symbol) {
            Some(value) => *value,
            None => {
                defaulted.push(symbol.clone());
                0.0
            }
        };
        parameters.insert(symbol.clone(), value);
    }

    SubstitutionMap { compartments, parameters, defaulted }
}

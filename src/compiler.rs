//! Model compilation: net change equations and numeric rate functions.
//!
//! [`ModelCompiler`] turns compartments and flows into a [`CompiledModel`].
//! For every compartment the net change is
//!
//! ```text
//! dX/dt = sum(flows ending in X) - sum(flows starting in X)
//! ```
//!
//! and each net change is lowered to a [`CompiledExpr`] over a shared slot
//! table: compartment symbols first (declaration order), then the free
//! parameters in canonical order.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ModelError, ModelResult};
use crate::substitution::SubstitutionMap;
use crate::symbolic::{CompiledExpr, Expr, Symbol};
use crate::{Compartment, Flow, Scalar};

/// Derived state of one compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCompartment {
    /// Display name
    pub name: String,
    /// State symbol
    pub symbol: Symbol,
    /// Value at compile time, used as the initial state
    pub initial_value: f64,
    /// Whether the compartment is infected
    pub infection_state: bool,
    /// Equations of the flows ending in this compartment
    pub inflows: Vec<Expr>,
    /// Equations of the flows starting in this compartment
    pub outflows: Vec<Expr>,
    /// Net rate of change
    pub change_function: Expr,
    /// `change_function` lowered over the model's slot table
    pub derivative: CompiledExpr,
}

/// Immutable snapshot produced by [`ModelCompiler::compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    compartments: Vec<CompiledCompartment>,
    flows: Vec<Flow>,
    slots: BTreeMap<Symbol, usize>,
    parameters: Vec<Symbol>,
}

impl CompiledModel {
    /// Gets the compiled compartments in declaration order.
    pub fn compartments(&self) -> &[CompiledCompartment] {
        &self.compartments
    }

    /// Gets the flows the model was compiled from.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Free parameters: symbols used by flows that are not compartments.
    pub fn parameters(&self) -> &[Symbol] {
        &self.parameters
    }

    /// Looks up a compartment by symbol.
    pub fn compartment(&self, symbol: &Symbol) -> Option<&CompiledCompartment> {
        self.compartments.iter().find(|c| &c.symbol == symbol)
    }

    /// Infected compartments in declaration order.
    pub fn infected(&self) -> impl Iterator<Item = &CompiledCompartment> {
        self.compartments.iter().filter(|c| c.infection_state)
    }

    /// Slot index of a compartment or parameter symbol.
    pub fn slot_of(&self, symbol: &Symbol) -> Option<usize> {
        self.slots.get(symbol).copied()
    }

    /// Number of slots (compartments plus parameters).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Compartment values at compile time.
    pub fn initial_state(&self) -> Vec<f64> {
        self.compartments.iter().map(|c| c.initial_value).collect()
    }

    /// Full slot vector for a compartment state. Parameters missing from
    /// `substitutions` are zero.
    ///
    /// # Panics
    ///
    /// Panics if `state` holds fewer values than the model has compartments.
    pub fn slot_values(&self, state: &[f64], substitutions: &SubstitutionMap) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.slot_count());
        let n = self.compartments.len();
        assert!(state.len() >= n, "state has {} values for {n} compartments", state.len());
        values.extend_from_slice(&state[..n]);
        values.extend(self.parameters.iter().map(|p| substitutions.parameter(p).unwrap_or(0.0)));
        values
    }

    /// Evaluates every derivative on a full slot vector.
    pub fn evaluate_rates<S: Scalar>(&self, values: &[S]) -> Vec<S> {
        self.compartments.iter().map(|c| c.derivative.eval(values)).collect()
    }

    /// Instantaneous rate vector at the compile-time state.
    pub fn rates(&self, substitutions: &SubstitutionMap) -> Vec<f64> {
        self.evaluate_rates(&self.slot_values(&self.initial_state(), substitutions))
    }

    /// Sum of all change functions; identically zero for a closed model.
    pub fn total_change(&self) -> Expr {
        self.compartments.iter().map(|c| &c.change_function).sum()
    }
}

/// Compiles compartments and flows.
pub struct ModelCompiler;

impl ModelCompiler {
    /// Derives the net change of every compartment and lowers it to a
    /// numeric function.
    ///
    /// # Errors
    ///
    /// [`ModelError::Definition`] for a duplicate compartment symbol, a flow
    /// with no ends, a self-loop, a flow referencing an unknown compartment,
    /// or an equation that does not reduce to a finite numeric function.
    ///
    /// # Examples
    ///
    /// ```
    /// use compartmental::{Compartment, Expr, Flow, ModelCompiler};
    ///
    /// let compartments = vec![Compartment::new("Infected", "I").infected()];
    /// let flows = vec![Flow::outflow("I", Expr::symbol("gamma") * Expr::symbol("I"))];
    ///
    /// let compiled = ModelCompiler::compile(&compartments, &flows)?;
    /// assert_eq!(compiled.compartments()[0].change_function.to_string(), "-I*gamma");
    /// # Ok::<(), compartmental::ModelError>(())
    /// ```
    pub fn compile(compartments: &[Compartment], flows: &[Flow]) -> ModelResult<CompiledModel> {
        let mut slots = BTreeMap::new();
        for (index, compartment) in compartments.iter().enumerate() {
            if slots.insert(compartment.symbol.clone(), index).is_some() {
                return Err(ModelError::definition(format!(
                    "duplicate compartment symbol `{}`",
                    compartment.symbol
                )));
            }
        }

        let mut free = BTreeSet::new();
        for flow in flows {
            flow.validate()?;
            for symbol in flow.origin.iter().chain(flow.end.iter()) {
                if !slots.contains_key(symbol) {
                    return Err(ModelError::definition(format!(
                        "flow `{}` references unknown compartment `{symbol}`",
                        flow.equation
                    )));
                }
            }
            if !flow.equation.is_finite() {
                return Err(ModelError::definition(format!(
                    "flow equation `{}` is not finite",
                    flow.equation
                )));
            }
            free.extend(flow.equation.free_symbols());
        }

        let parameters: Vec<Symbol> =
            free.into_iter().filter(|symbol| !slots.contains_key(symbol)).collect();
        for (offset, parameter) in parameters.iter().enumerate() {
            slots.insert(parameter.clone(), compartments.len() + offset);
        }

        let mut compiled = Vec::with_capacity(compartments.len());
        for compartment in compartments {
            let symbol = Some(&compartment.symbol);
            let inflows: Vec<Expr> = flows
                .iter()
                .filter(|f| f.end.as_ref() == symbol)
                .map(|f| f.equation.clone())
                .collect();
            let outflows: Vec<Expr> = flows
                .iter()
                .filter(|f| f.origin.as_ref() == symbol)
                .map(|f| f.equation.clone())
                .collect();
            let change_function = inflows.iter().sum::<Expr>() - outflows.iter().sum::<Expr>();
            let derivative = CompiledExpr::compile(&change_function, &slots)?;
            compiled.push(CompiledCompartment {
                name: compartment.name.clone(),
                symbol: compartment.symbol.clone(),
                initial_value: compartment.value,
                infection_state: compartment.infection_state,
                inflows,
                outflows,
                change_function,
                derivative,
            });
        }

        log::debug!(
            "compiled {} compartments, {} flows, {} free parameters",
            compiled.len(),
            flows.len(),
            parameters.len()
        );

        Ok(CompiledModel { compartments: compiled, flows: flows.to_vec(), slots, parameters })
    }
}

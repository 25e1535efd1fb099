//! # Compartmental: epidemic models from symbolic flows
//!
//! Build a compartmental disease-transmission model out of compartments and
//! the rate-governed flows between them, then derive the two things such a
//! model is for: the basic reproduction number R0 (next-generation matrix
//! method) and a numerical simulation of its time course.
//!
//! ## Example
//!
//! ```
//! use compartmental::{Compartment, Expr, Flow, Model, resolve};
//! use compartmental::next_generation::{r0, r0_at};
//!
//! let (s, i) = (Expr::symbol("S"), Expr::symbol("I"));
//!
//! let mut model = Model::new();
//! model.add_compartment(Compartment::new("Susceptible", "S").with_value(0.99))?;
//! model.add_compartment(Compartment::new("Infected", "I").with_value(0.01).infected())?;
//! model.add_compartment(Compartment::new("Recovered", "R"))?;
//! model.add_flow(Flow::transfer("S", "I", Expr::symbol("beta") * &s * &i))?;
//! model.add_flow(Flow::transfer("I", "R", Expr::symbol("gamma") * &i))?;
//!
//! let compiled = model.compile()?;
//! assert_eq!(r0(&compiled)?.to_string(), "S*beta/gamma");
//!
//! let substitutions = resolve(&compiled, &[("beta", 0.3), ("gamma", 0.1)]);
//! assert!((r0_at(&compiled, &substitutions)? - 2.97).abs() < 1e-12);
//! # Ok::<(), compartmental::ModelError>(())
//! ```
//!
//! With the `solvers` feature the same compiled model can be integrated:
//!
//! ```
//! # use compartmental::{Compartment, Expr, Flow, Model, resolve};
//! use compartmental::solvers::integrate;
//! # let mut model = Model::new();
//! # model.add_compartment(Compartment::new("Susceptible", "S").with_value(0.99))?;
//! # model.add_compartment(Compartment::new("Infected", "I").with_value(0.01).infected())?;
//! # model.add_compartment(Compartment::new("Recovered", "R"))?;
//! # model.add_flow(Flow::transfer("S", "I", Expr::symbol("beta") * Expr::symbol("S") * Expr::symbol("I")))?;
//! # model.add_flow(Flow::transfer("I", "R", Expr::symbol("gamma") * Expr::symbol("I")))?;
//! # let compiled = model.compile()?;
//! # let substitutions = resolve(&compiled, &[("beta", 0.3), ("gamma", 0.1)]);
//! let table = integrate(&compiled, &substitutions, 100)?;
//!
//! assert_eq!(table.headers(), ["Time", "Susceptible", "Infected", "Recovered"]);
//! assert_eq!(table.len(), 100);
//! # Ok::<(), compartmental::ModelError>(())
//! ```
//!
//! ## Optional Features
//!
//! - **`autodiff`**: analytic rate Jacobians using `num-dual` (finite
//!   differences otherwise)
//! - **`solvers`**: ODE integration using `differential-equations`
//!
//! Both are enabled by default.

use std::ops::{Add, Div, Mul, Neg, Sub};

// Core modules
pub mod compiler;
pub mod error;
pub mod models;
pub mod next_generation;
pub mod substitution;
pub mod symbolic;
pub mod timeseries;

pub mod autodiff;

#[cfg(feature = "solvers")]
pub mod solvers;

pub use compiler::{CompiledCompartment, CompiledModel, ModelCompiler};
pub use error::{ModelError, ModelResult};
pub use substitution::{resolve, ResolvePolicy, SubstitutionMap, SubstitutionResolver};
pub use symbolic::{Expr, Symbol};
pub use timeseries::TimeSeriesTable;

/// Symbol of the birth rate added by vital dynamics.
pub const BIRTH_RATE: &str = "tau";

/// Symbol of the per-capita death rate added by vital dynamics.
pub const DEATH_RATE: &str = "mu";

/// Numeric type a compiled rate function can be evaluated on.
///
/// Implemented for `f64` and, with the `autodiff` feature, for
/// `num_dual::Dual64` so the same compiled model yields exact Jacobians.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + From<f64>
{
    /// Integer power.
    fn powi(self, n: i32) -> Self;

    /// Square root.
    fn sqrt(self) -> Self;
}

impl Scalar for f64 {
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

#[cfg(feature = "autodiff")]
impl Scalar for num_dual::Dual64 {
    fn powi(self, n: i32) -> Self {
        num_dual::DualNum::powi(&self, n)
    }

    fn sqrt(self) -> Self {
        num_dual::DualNum::sqrt(&self)
    }
}

/// A population state of the model.
///
/// # Examples
///
/// ```
/// use compartmental::Compartment;
///
/// let infected = Compartment::new("Infected", "I").with_value(0.01).infected();
///
/// assert_eq!(infected.symbol.name(), "I");
/// assert!(infected.infection_state);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    /// Display name, used as the export column header
    pub name: String,
    /// Unique state symbol
    pub symbol: Symbol,
    /// Current (initial) value
    pub value: f64,
    /// Whether the compartment holds infected individuals
    pub infection_state: bool,
}

impl Compartment {
    /// Creates a susceptible-class compartment with value zero.
    pub fn new(name: impl Into<String>, symbol: impl Into<Symbol>) -> Self {
        Compartment { name: name.into(), symbol: symbol.into(), value: 0.0, infection_state: false }
    }

    /// Sets the initial value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Marks the compartment as infected.
    pub fn infected(mut self) -> Self {
        self.infection_state = true;
        self
    }
}

/// A directed, rate-governed transition between compartments.
///
/// `origin = None` is an external inflow (birth) and `end = None` an
/// external outflow (death). The equation is always written as the
/// non-negated rate; the compiler applies the signs.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    /// Rate of the flow
    pub equation: Expr,
    /// Compartment the flow leaves, if any
    pub origin: Option<Symbol>,
    /// Compartment the flow enters, if any
    pub end: Option<Symbol>,
    /// Whether the flow was generated by [`Model::set_vital_dynamics`]
    pub is_vital_dynamics: bool,
    /// Free-text description
    pub description: Option<String>,
}

impl Flow {
    /// Flow from one compartment to another.
    pub fn transfer(origin: impl Into<Symbol>, end: impl Into<Symbol>, equation: Expr) -> Self {
        Flow::between(Some(origin.into()), Some(end.into()), equation)
    }

    /// Flow entering `end` from outside the system.
    pub fn inflow(end: impl Into<Symbol>, equation: Expr) -> Self {
        Flow::between(None, Some(end.into()), equation)
    }

    /// Flow leaving `origin` to outside the system.
    pub fn outflow(origin: impl Into<Symbol>, equation: Expr) -> Self {
        Flow::between(Some(origin.into()), None, equation)
    }

    fn between(origin: Option<Symbol>, end: Option<Symbol>, equation: Expr) -> Self {
        Flow { equation, origin, end, is_vital_dynamics: false, description: None }
    }

    /// Attaches a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns true if the flow touches the compartment with `symbol`.
    pub fn references(&self, symbol: &Symbol) -> bool {
        self.origin.as_ref() == Some(symbol) || self.end.as_ref() == Some(symbol)
    }

    /// Checks the structural invariants of a single flow.
    pub fn validate(&self) -> ModelResult<()> {
        match (&self.origin, &self.end) {
            (None, None) => Err(ModelError::definition(format!(
                "flow `{}` has neither origin nor end",
                self.equation
            ))),
            (Some(a), Some(b)) if a == b => Err(ModelError::definition(format!(
                "flow `{}` starts and ends in compartment `{a}`",
                self.equation
            ))),
            _ => Ok(()),
        }
    }
}

/// An editable compartmental model: ordered compartments plus flows.
///
/// Editing operations keep the model valid at all times: compartment
/// symbols stay unique and every flow references existing compartments.
/// [`Model::compile`] produces an immutable [`CompiledModel`] snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    compartments: Vec<Compartment>,
    flows: Vec<Flow>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the compartments in declaration order.
    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    /// Gets the flows.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Looks up a compartment by symbol.
    pub fn compartment(&self, symbol: &Symbol) -> Option<&Compartment> {
        self.compartments.iter().find(|c| &c.symbol == symbol)
    }

    fn position(&self, symbol: &Symbol) -> ModelResult<usize> {
        self.compartments
            .iter()
            .position(|c| &c.symbol == symbol)
            .ok_or_else(|| ModelError::definition(format!("no compartment with symbol `{symbol}`")))
    }

    /// Appends a compartment. Fails if its symbol is already in use.
    pub fn add_compartment(&mut self, compartment: Compartment) -> ModelResult<()> {
        if self.compartment(&compartment.symbol).is_some() {
            return Err(ModelError::definition(format!(
                "duplicate compartment symbol `{}`",
                compartment.symbol
            )));
        }
        self.compartments.push(compartment);
        Ok(())
    }

    /// Adds a flow after checking it and the compartments it references.
    pub fn add_flow(&mut self, flow: Flow) -> ModelResult<()> {
        flow.validate()?;
        for symbol in flow.origin.iter().chain(flow.end.iter()) {
            self.position(symbol)?;
        }
        self.flows.push(flow);
        Ok(())
    }

    /// Removes a compartment together with every flow that references it.
    pub fn remove_compartment(&mut self, symbol: &Symbol) -> Option<Compartment> {
        let index = self.compartments.iter().position(|c| &c.symbol == symbol)?;
        self.flows.retain(|flow| !flow.references(symbol));
        Some(self.compartments.remove(index))
    }

    /// Removes the flow at `index`.
    pub fn remove_flow(&mut self, index: usize) -> Option<Flow> {
        (index < self.flows.len()).then(|| self.flows.remove(index))
    }

    /// Moves a compartment to position `to` in the declaration order.
    pub fn move_compartment(&mut self, symbol: &Symbol, to: usize) -> ModelResult<()> {
        let from = self.position(symbol)?;
        if to >= self.compartments.len() {
            return Err(ModelError::definition(format!(
                "position {to} is out of range for {} compartments",
                self.compartments.len()
            )));
        }
        let compartment = self.compartments.remove(from);
        self.compartments.insert(to, compartment);
        Ok(())
    }

    /// Sets the current value of a compartment.
    pub fn set_value(&mut self, symbol: &Symbol, value: f64) -> ModelResult<()> {
        let index = self.position(symbol)?;
        self.compartments[index].value = value;
        Ok(())
    }

    /// Flips the infection flag of a compartment and returns the new state.
    pub fn toggle_infection_state(&mut self, symbol: &Symbol) -> ModelResult<bool> {
        let index = self.position(symbol)?;
        let compartment = &mut self.compartments[index];
        compartment.infection_state = !compartment.infection_state;
        Ok(compartment.infection_state)
    }

    /// Returns true if vital-dynamics flows are present.
    pub fn has_vital_dynamics(&self) -> bool {
        self.flows.iter().any(|f| f.is_vital_dynamics)
    }

    /// Turns background births and deaths on or off.
    ///
    /// Existing vital-dynamics flows are always removed first. When enabled,
    /// a constant birth inflow `tau` enters the first compartment and every
    /// compartment `X` gets a death outflow `mu*X`.
    pub fn set_vital_dynamics(&mut self, enabled: bool) {
        self.flows.retain(|f| !f.is_vital_dynamics);
        if !enabled {
            return;
        }

        let mut generated = Vec::with_capacity(self.compartments.len() + 1);
        if let Some(first) = self.compartments.first() {
            generated.push(
                Flow::inflow(first.symbol.clone(), Expr::symbol(BIRTH_RATE)).with_description("Births"),
            );
        }
        for compartment in &self.compartments {
            let rate = Expr::symbol(DEATH_RATE) * Expr::from(&compartment.symbol);
            generated.push(
                Flow::outflow(compartment.symbol.clone(), rate)
                    .with_description(format!("Deaths from {}", compartment.name)),
            );
        }
        for mut flow in generated {
            flow.is_vital_dynamics = true;
            self.flows.push(flow);
        }
    }

    /// Compiles the model into a numerically evaluable snapshot.
    pub fn compile(&self) -> ModelResult<CompiledModel> {
        ModelCompiler::compile(&self.compartments, &self.flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sir() -> Model {
        let mut model = Model::new();
        model.add_compartment(Compartment::new("Susceptible", "S").with_value(0.99)).unwrap();
        model.add_compartment(Compartment::new("Infected", "I").with_value(0.01).infected()).unwrap();
        model.add_compartment(Compartment::new("Recovered", "R")).unwrap();
        model
            .add_flow(Flow::transfer(
                "S",
                "I",
                Expr::symbol("beta") * Expr::symbol("S") * Expr::symbol("I"),
            ))
            .unwrap();
        model.add_flow(Flow::transfer("I", "R", Expr::symbol("gamma") * Expr::symbol("I"))).unwrap();
        model
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut model = sir();
        let err = model.add_compartment(Compartment::new("Other", "S")).unwrap_err();
        assert!(matches!(err, ModelError::Definition(_)));
        assert_eq!(model.compartments().len(), 3);
    }

    #[test]
    fn test_invalid_flows_rejected() {
        let mut model = sir();

        let self_loop = Flow::transfer("I", "I", Expr::symbol("k"));
        assert!(matches!(model.add_flow(self_loop), Err(ModelError::Definition(_))));

        let dangling = Flow::transfer("I", "D", Expr::symbol("k") * Expr::symbol("I"));
        assert!(matches!(model.add_flow(dangling), Err(ModelError::Definition(_))));

        let nowhere = Flow {
            equation: Expr::symbol("k"),
            origin: None,
            end: None,
            is_vital_dynamics: false,
            description: None,
        };
        assert!(matches!(model.add_flow(nowhere), Err(ModelError::Definition(_))));

        assert_eq!(model.flows().len(), 2);
    }

    #[test]
    fn test_remove_compartment_cascades() {
        let mut model = sir();
        let removed = model.remove_compartment(&Symbol::new("R")).unwrap();

        assert_eq!(removed.name, "Recovered");
        assert_eq!(model.flows().len(), 1);
        assert!(model.flows().iter().all(|f| !f.references(&Symbol::new("R"))));
        assert!(model.remove_compartment(&Symbol::new("R")).is_none());
    }

    #[test]
    fn test_remove_flow() {
        let mut model = sir();
        assert!(model.remove_flow(5).is_none());
        let flow = model.remove_flow(0).unwrap();
        assert_eq!(flow.origin, Some(Symbol::new("S")));
        assert_eq!(model.flows().len(), 1);
    }

    #[test]
    fn test_move_compartment() {
        let mut model = sir();
        model.move_compartment(&Symbol::new("R"), 0).unwrap();

        let order: Vec<_> = model.compartments().iter().map(|c| c.symbol.name()).collect();
        assert_eq!(order, vec!["R", "S", "I"]);
        assert!(model.move_compartment(&Symbol::new("R"), 3).is_err());
    }

    #[test]
    fn test_set_value_and_toggle() {
        let mut model = sir();
        let s = Symbol::new("S");

        model.set_value(&s, 0.5).unwrap();
        assert_eq!(model.compartment(&s).unwrap().value, 0.5);

        assert!(model.toggle_infection_state(&s).unwrap());
        assert!(!model.toggle_infection_state(&s).unwrap());
        assert!(model.set_value(&Symbol::new("X"), 1.0).is_err());
    }

    #[test]
    fn test_vital_dynamics_toggle_does_not_duplicate() {
        let mut model = sir();
        model.set_vital_dynamics(true);
        model.set_vital_dynamics(true);

        // one birth plus one death per compartment
        assert_eq!(model.flows().iter().filter(|f| f.is_vital_dynamics).count(), 4);
        assert!(model.has_vital_dynamics());

        let births: Vec<_> = model.flows().iter().filter(|f| f.origin.is_none()).collect();
        assert_eq!(births.len(), 1);
        assert_eq!(births[0].end, Some(Symbol::new("S")));

        model.set_vital_dynamics(false);
        assert!(!model.has_vital_dynamics());
        assert_eq!(model.flows().len(), 2);
    }

    #[test]
    fn test_scalar_f64() {
        assert_eq!(Scalar::powi(2.0_f64, -2), 0.25);
        assert_eq!(Scalar::sqrt(9.0_f64), 3.0);
    }
}

//! Numerical integration for compiled models.
//!
//! This module integrates compiled compartmental models over a regular time
//! grid using the [`differential-equations`](https://docs.rs/differential-equations/)
//! crate. Each grid interval is solved as its own initial-value problem, so
//! the reported values sit exactly on the grid points.

use std::time::Instant;

use differential_equations::methods::{ExplicitRungeKutta, ImplicitRungeKutta};
use differential_equations::ode::{ODE, ODEProblem};
use nalgebra::SVector;

use crate::autodiff::rate_jacobian;
use crate::compiler::CompiledModel;
use crate::error::{ModelError, ModelResult};
use crate::substitution::SubstitutionMap;
use crate::timeseries::TimeSeriesTable;

/// Compartment capacity used by [`integrate`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Integration methods available for time-stepping.
///
/// For details on each method, refer to the [`differential-equations`](https://docs.rs/differential-equations/) crate documentation.
///
/// # Variants
///
/// - `Dopri5`: Adaptive explicit Dormand-Prince 5(4) method
/// - `Radau5`: Adaptive implicit Radau5 method (default)
/// - `GaussLegendre4`: Adaptive implicit Gauss-Legendre 4th order
/// - `GaussLegendre6`: Adaptive implicit Gauss-Legendre 6th order
/// - `LobattoIIIC2`: Adaptive implicit Lobatto IIIC 2nd order
/// - `LobattoIIIC4`: Adaptive implicit Lobatto IIIC 4th order
/// - `RK4`: Fixed-step explicit 4th-order Runge-Kutta
/// - `Euler`: Fixed-step explicit Forward Euler
/// - `Heun`: Fixed-step explicit Heun method
/// - `Midpoint`: Fixed-step explicit Midpoint method
/// - `Ralston`: Fixed-step explicit Ralston method
///
/// Epidemic models become stiff when rates differ by orders of magnitude, so
/// the default is implicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntegrationMethod {
    // Adaptive explicit methods
    /// Dormand-Prince 5(4) method
    Dopri5,
    // Adaptive implicit methods
    /// Radau5 method
    #[default]
    Radau5,
    /// Gauss-Legendre 4th order
    GaussLegendre4,
    /// Gauss-Legendre 6th order
    GaussLegendre6,
    /// Lobatto IIIC 2nd order
    LobattoIIIC2,
    /// Lobatto IIIC 4th order
    LobattoIIIC4,
    // Fixed-step explicit methods
    /// 4th-order Runge-Kutta
    RK4,
    /// Forward Euler
    Euler,
    /// Heun method
    Heun,
    /// Midpoint method
    Midpoint,
    /// Ralston method
    Ralston,
}

impl IntegrationMethod {
    /// Returns true for methods that use the rate Jacobian.
    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            IntegrationMethod::Radau5
                | IntegrationMethod::GaussLegendre4
                | IntegrationMethod::GaussLegendre6
                | IntegrationMethod::LobattoIIIC2
                | IntegrationMethod::LobattoIIIC4
        )
    }

    /// Returns true for methods that use [`IntegrationConfig::fixed_step`].
    pub fn is_fixed_step(&self) -> bool {
        matches!(
            self,
            IntegrationMethod::RK4
                | IntegrationMethod::Euler
                | IntegrationMethod::Heun
                | IntegrationMethod::Midpoint
                | IntegrationMethod::Ralston
        )
    }
}

/// Solver settings.
///
/// # Examples
///
/// ```
/// use compartmental::solvers::{IntegrationConfig, IntegrationMethod};
///
/// let config = IntegrationConfig::default()
///     .with_method(IntegrationMethod::Dopri5)
///     .with_tolerances(1e-8, 1e-10)
///     .with_step_count(200);
///
/// assert_eq!(config.max_steps, 1_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationConfig {
    /// Integration method
    pub method: IntegrationMethod,
    /// Relative tolerance of adaptive methods
    pub rtol: f64,
    /// Absolute tolerance of adaptive methods
    pub atol: f64,
    /// Step ceiling of adaptive methods, per grid interval
    pub max_steps: usize,
    /// Number of grid points; `None` means one per time unit of the horizon
    pub step_count: Option<usize>,
    /// Step size of fixed-step methods
    pub fixed_step: f64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        IntegrationConfig {
            method: IntegrationMethod::default(),
            rtol: 1e-6,
            atol: 1e-8,
            max_steps: 1_000_000,
            step_count: None,
            fixed_step: 0.01,
        }
    }
}

impl IntegrationConfig {
    /// Sets the integration method.
    pub fn with_method(mut self, method: IntegrationMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets relative and absolute tolerances.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Sets the step ceiling.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the number of grid points.
    pub fn with_step_count(mut self, step_count: usize) -> Self {
        self.step_count = Some(step_count);
        self
    }

    /// Sets the step size of fixed-step methods.
    pub fn with_fixed_step(mut self, fixed_step: f64) -> Self {
        self.fixed_step = fixed_step;
        self
    }
}

/// ODE wrapper for compiled models using differential-equations crate.
///
/// State slots beyond the model's compartments stay at zero.
struct CompartmentODE<'a> {
    model: &'a CompiledModel,
    parameters: Vec<f64>,
    n: usize,
}

impl CompartmentODE<'_> {
    fn slots(&self, state: &[f64]) -> Vec<f64> {
        let mut slots = Vec::with_capacity(self.n + self.parameters.len());
        slots.extend_from_slice(&state[..self.n]);
        slots.extend_from_slice(&self.parameters);
        slots
    }
}

impl<const N: usize> ODE<f64, SVector<f64, N>> for CompartmentODE<'_> {
    fn diff(&self, _t: f64, y: &SVector<f64, N>, dydt: &mut SVector<f64, N>) {
        let slots = self.slots(y.as_slice());
        for (i, compartment) in self.model.compartments().iter().enumerate() {
            dydt[i] = compartment.derivative.eval(&slots);
        }
        for i in self.n..N {
            dydt[i] = 0.0;
        }
    }

    fn jacobian(
        &self,
        _t: f64,
        y: &SVector<f64, N>,
        dfdy: &mut differential_equations::prelude::Matrix<f64>,
    ) {
        let jac = rate_jacobian(self.model, &self.slots(y.as_slice()));
        for i in 0..self.n {
            for j in 0..self.n {
                dfdy[(i, j)] = jac.get(i, j);
            }
        }
    }
}

/// Integrator for compiled models.
///
/// # Type Parameters
///
/// * `N` - Maximum number of compartments the integrator can handle
///
/// # Examples
///
/// ```
/// use compartmental::models::{ModelTemplate, Sir};
/// use compartmental::resolve;
/// use compartmental::solvers::ModelIntegrator;
///
/// let compiled = Sir::new(0.99, 0.01).build()?.compile()?;
/// let subs = resolve(&compiled, &[("beta", 0.3), ("gamma", 0.1)]);
///
/// let table = ModelIntegrator::<4>::new().integrate(&compiled, &subs, 10)?;
/// assert_eq!(table.time()[..3], [0.0, 1.0, 2.0]);
/// # Ok::<(), compartmental::ModelError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelIntegrator<const N: usize> {
    config: IntegrationConfig,
}

impl<const N: usize> ModelIntegrator<N> {
    /// Creates an integrator with the default configuration.
    pub fn new() -> Self {
        ModelIntegrator { config: IntegrationConfig::default() }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: IntegrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Integrates `model` over `[0, horizon)`.
    ///
    /// The grid has `step_count` evenly spaced points (`horizon` by default),
    /// starting at the compile-time state. Parameters missing from
    /// `substitutions` are zero.
    ///
    /// # Errors
    ///
    /// - [`ModelError::EmptyModel`] if the model has no compartments or no flows
    /// - [`ModelError::CapacityExceeded`] if it has more than `N` compartments
    /// - [`ModelError::Definition`] for a zero horizon or step count
    /// - [`ModelError::Integration`] if the solver fails or the state stops
    ///   being finite
    pub fn integrate(
        &self,
        model: &CompiledModel,
        substitutions: &SubstitutionMap,
        horizon: usize,
    ) -> ModelResult<TimeSeriesTable> {
        let n = model.compartments().len();
        if n == 0 {
            return Err(ModelError::EmptyModel("model has no compartments".into()));
        }
        if model.flows().is_empty() {
            return Err(ModelError::EmptyModel("model has no flows".into()));
        }
        if n > N {
            return Err(ModelError::CapacityExceeded { required: n, capacity: N });
        }
        if horizon == 0 {
            return Err(ModelError::definition("integration horizon must be positive"));
        }
        let step_count = self.config.step_count.unwrap_or(horizon);
        if step_count == 0 {
            return Err(ModelError::definition("step count must be positive"));
        }

        let start = Instant::now();
        let grid: Vec<f64> =
            (0..step_count).map(|i| i as f64 * horizon as f64 / step_count as f64).collect();

        let ode = CompartmentODE {
            model,
            parameters: model
                .parameters()
                .iter()
                .map(|p| substitutions.parameter(p).unwrap_or(0.0))
                .collect(),
            n,
        };

        let mut y = SVector::<f64, N>::zeros();
        for (i, value) in model.initial_state().into_iter().enumerate() {
            y[i] = value;
        }

        let mut series: Vec<Vec<f64>> = (0..n).map(|_| Vec::with_capacity(step_count)).collect();
        record(&mut series, &y);
        for window in grid.windows(2) {
            y = self.advance(&ode, window[0], window[1], y)?;
            if y.iter().take(n).any(|v| !v.is_finite()) {
                return Err(ModelError::Integration(format!(
                    "state is not finite at t = {}",
                    window[1]
                )));
            }
            record(&mut series, &y);
        }

        log::info!(
            "integrated {} compartments over {} grid points with {:?} in {:.3?}",
            n,
            step_count,
            self.config.method,
            start.elapsed()
        );

        let names = model.compartments().iter().map(|c| c.name.clone()).collect();
        TimeSeriesTable::new(grid, names, series)
    }

    /// Solves one grid interval and returns the state at `tf`.
    fn advance(
        &self,
        ode: &CompartmentODE<'_>,
        t0: f64,
        tf: f64,
        y0: SVector<f64, N>,
    ) -> ModelResult<SVector<f64, N>> {
        let problem = ODEProblem::new(ode, t0, tf, y0);
        let c = &self.config;

        // Choose solver based on method
        let solution = match c.method {
            // Adaptive explicit
            IntegrationMethod::Dopri5 => {
                let mut solver =
                    ExplicitRungeKutta::dopri5().rtol(c.rtol).atol(c.atol).max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            // Adaptive implicit
            IntegrationMethod::Radau5 => {
                let mut solver =
                    ImplicitRungeKutta::radau5().rtol(c.rtol).atol(c.atol).max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            IntegrationMethod::GaussLegendre4 => {
                let mut solver = ImplicitRungeKutta::gauss_legendre_4()
                    .rtol(c.rtol)
                    .atol(c.atol)
                    .max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            IntegrationMethod::GaussLegendre6 => {
                let mut solver = ImplicitRungeKutta::gauss_legendre_6()
                    .rtol(c.rtol)
                    .atol(c.atol)
                    .max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            IntegrationMethod::LobattoIIIC2 => {
                let mut solver = ImplicitRungeKutta::lobatto_iiic_2()
                    .rtol(c.rtol)
                    .atol(c.atol)
                    .max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            IntegrationMethod::LobattoIIIC4 => {
                let mut solver = ImplicitRungeKutta::lobatto_iiic_4()
                    .rtol(c.rtol)
                    .atol(c.atol)
                    .max_steps(c.max_steps);
                problem.solve(&mut solver)
            }
            // Fixed-step explicit
            IntegrationMethod::RK4 => {
                let mut solver = ExplicitRungeKutta::rk4(c.fixed_step);
                problem.solve(&mut solver)
            }
            IntegrationMethod::Euler => {
                let mut solver = ExplicitRungeKutta::euler(c.fixed_step);
                problem.solve(&mut solver)
            }
            IntegrationMethod::Heun => {
                let mut solver = ExplicitRungeKutta::heun(c.fixed_step);
                problem.solve(&mut solver)
            }
            IntegrationMethod::Midpoint => {
                let mut solver = ExplicitRungeKutta::midpoint(c.fixed_step);
                problem.solve(&mut solver)
            }
            IntegrationMethod::Ralston => {
                let mut solver = ExplicitRungeKutta::ralston(c.fixed_step);
                problem.solve(&mut solver)
            }
        };

        let solution = solution.map_err(|e| {
            ModelError::Integration(format!("solver failed on [{t0}, {tf}]: {e}"))
        })?;
        solution
            .y
            .last()
            .copied()
            .ok_or_else(|| ModelError::Integration("solver returned no states".into()))
    }
}

fn record<const N: usize>(series: &mut [Vec<f64>], y: &SVector<f64, N>) {
    for (i, values) in series.iter_mut().enumerate() {
        values.push(y[i]);
    }
}

/// Integrates `model` over `[0, horizon)` with one grid point per time unit
/// and the default configuration.
pub fn integrate(
    model: &CompiledModel,
    substitutions: &SubstitutionMap,
    horizon: usize,
) -> ModelResult<TimeSeriesTable> {
    ModelIntegrator::<DEFAULT_CAPACITY>::new().integrate(model, substitutions, horizon)
}

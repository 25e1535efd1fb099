//! Numerical simulation of compiled models.
//!
//! A compiled model is a system of ordinary differential equations
//! `dx/dt = f(x; p)` with one state per compartment and the free parameters
//! `p` bound by a [`SubstitutionMap`](crate::SubstitutionMap). This module
//! integrates it on a regular time grid using the
//! [`differential-equations`](https://docs.rs/differential-equations/) crate.
//!
//! # Submodules
//!
//! - [`integration`]: the const-capacity [`ModelIntegrator`], its
//!   configuration and the [`integrate`] shortcut
//!
//! # Usage Pattern
//!
//! ```
//! use compartmental::models::{ModelTemplate, Sir};
//! use compartmental::resolve;
//! use compartmental::solvers::{IntegrationConfig, IntegrationMethod, ModelIntegrator};
//!
//! let compiled = Sir::new(0.99, 0.01).build()?.compile()?;
//! let subs = resolve(&compiled, &[("beta", 0.3), ("gamma", 0.1)]);
//!
//! let integrator = ModelIntegrator::<8>::new()
//!     .with_config(IntegrationConfig::default().with_method(IntegrationMethod::Dopri5));
//! let table = integrator.integrate(&compiled, &subs, 50)?;
//!
//! let infected = table.series("Infected").unwrap();
//! assert!(infected[20] > infected[0]);
//! # Ok::<(), compartmental::ModelError>(())
//! ```

pub mod integration;

pub use integration::{
    integrate, IntegrationConfig, IntegrationMethod, ModelIntegrator, DEFAULT_CAPACITY,
};

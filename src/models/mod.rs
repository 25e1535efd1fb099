//! Ready-made compartmental models.
//!
//! Each template builds an editable [`Model`] with the textbook structure:
//!
//! - **SIR**: Susceptible -> Infected -> Recovered
//! - **SEIR**: Susceptible -> Exposed -> Infected -> Recovered
//! - **SIS**: Susceptible -> Infected -> Susceptible
//!
//! Transmission uses the mass-action rate `beta*S*I`, recovery `gamma*I`
//! and the end of the latent period `sigma*E`. Templates can add vital
//! dynamics (births `tau`, deaths `mu`).
//!
//! ## Example
//!
//! ```
//! use compartmental::models::{ModelTemplate, Sir};
//!
//! let mut model = Sir::new(0.99, 0.01).build()?;
//!
//! // The result is an ordinary model and can be edited further
//! model.set_vital_dynamics(true);
//! assert_eq!(model.flows().len(), 6);
//! # Ok::<(), compartmental::ModelError>(())
//! ```

pub mod seir;
pub mod sir;
pub mod sis;

pub use seir::Seir;
pub use sir::Sir;
pub use sis::Sis;

use crate::error::ModelResult;
use crate::symbolic::Expr;
use crate::Model;

/// Something that can build a [`Model`].
pub trait ModelTemplate {
    /// Builds a fresh model.
    fn build(&self) -> ModelResult<Model>;
}

/// `beta*S*I`
pub(crate) fn mass_action() -> Expr {
    Expr::symbol("beta") * Expr::symbol("S") * Expr::symbol("I")
}

/// `rate*state`
pub(crate) fn linear(rate: &str, state: &str) -> Expr {
    Expr::symbol(rate) * Expr::symbol(state)
}

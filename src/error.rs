//! Error taxonomy shared by compilation, analysis and integration.

use crate::symbolic::Symbol;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the model core.
///
/// Every error is local to the operation that raised it: a failed `compile`
/// or `integrate` returns no partial result, and the `Model` it was called
/// on is never left half-updated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Malformed model: duplicate symbol, self-loop flow, dangling compartment
    /// reference, or an equation that cannot be reduced to a numeric function.
    #[error("definition error: {0}")]
    Definition(String),
    /// An expression was evaluated without a value for one of its symbols.
    #[error("symbol `{0}` has no bound value")]
    UnboundSymbol(Symbol),
    /// No infected compartments for R0, or nothing to integrate.
    #[error("empty model: {0}")]
    EmptyModel(String),
    /// The transfer Jacobian V is not invertible, so R0 is undefined.
    #[error("R0 undefined for this model: transfer matrix V is singular")]
    SingularMatrix,
    /// Eigenvalues of the next-generation matrix could not be ordered.
    #[error("computation error: {0}")]
    Computation(String),
    /// The ODE solver failed or produced a non-finite state.
    #[error("integration error: {0}")]
    Integration(String),
    /// The model has more compartments than the integrator was sized for.
    #[error("model has {required} compartments but integrator capacity is {capacity}")]
    CapacityExceeded {
        /// Compartments in the compiled model
        required: usize,
        /// Const capacity of the integrator
        capacity: usize,
    },
}

impl ModelError {
    pub(crate) fn definition(message: impl Into<String>) -> Self {
        ModelError::Definition(message.into())
    }

    pub(crate) fn computation(message: impl Into<String>) -> Self {
        ModelError::Computation(message.into())
    }
}

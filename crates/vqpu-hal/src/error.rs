//! Error types for the HAL crate.

use thiserror::Error;

/// Errors raised by simulation engines.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// No engine is registered under the requested name.
    #[error("Engine not available: {0}")]
    EngineUnavailable(String),

    /// Operand lies outside the initialized register.
    #[error("Qubit {qubit} out of range for a {num_qubits}-qubit register")]
    QubitOutOfRange {
        /// The offending qubit index.
        qubit: usize,
        /// Size of the register.
        num_qubits: usize,
    },

    /// Requested register exceeds the engine's capacity.
    #[error("Register of {requested} qubits exceeds engine limit of {max}")]
    RegisterTooLarge {
        /// Requested number of qubits.
        requested: usize,
        /// Largest supported register.
        max: usize,
    },

    /// Gate received the wrong number of operands.
    #[error("Gate '{gate}' applied to {got} qubits, expected {expected}")]
    OperandMismatch {
        /// Gate name.
        gate: String,
        /// Expected operand count.
        expected: usize,
        /// Actual operand count.
        got: usize,
    },

    /// Engine does not implement the operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic engine error.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;

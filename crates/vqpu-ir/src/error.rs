//! Error types for the IR crate.

use thiserror::Error;

/// Errors raised while decoding or updating quantum tasks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// The instruction name is not part of the opcode set.
    #[error("Unknown opcode '{0}'")]
    UnknownOpcode(String),

    /// A field required by the opcode is absent.
    #[error("Instruction '{opcode}' is missing required field '{field}'")]
    MissingField {
        /// The instruction name.
        opcode: String,
        /// The missing field.
        field: &'static str,
    },

    /// Gate requires a different number of qubits.
    #[error("Gate '{gate_name}' requires {expected} qubits, got {got}")]
    QubitCountMismatch {
        /// Name of the gate.
        gate_name: String,
        /// Expected number of qubits.
        expected: usize,
        /// Actual number of qubits provided.
        got: usize,
    },

    /// Gate received the wrong number of parameters.
    #[error("Gate '{gate_name}' expects {expected} parameters, got {got}")]
    ParameterArity {
        /// Name of the gate.
        gate_name: String,
        /// Expected number of parameters.
        expected: usize,
        /// Actual number of parameters provided.
        got: usize,
    },

    /// Parameter is symbolic and has no value.
    #[error("Parameter '{0}' is unbound")]
    UnboundParameter(String),

    /// Unitary matrix is not 2x2 or 4x4.
    #[error("Unitary matrix must be 2x2 or 4x4, got {rows}x{cols}")]
    InvalidUnitary {
        /// Number of rows.
        rows: usize,
        /// Length of the first malformed row.
        cols: usize,
    },

    /// Qubit index cannot be represented.
    #[error("Invalid qubit index {0}")]
    InvalidQubit(i64),

    /// A conditional register reference names more or fewer than one index.
    #[error("Instruction '{opcode}' must reference exactly one conditional register, got {count}")]
    ConditionArity {
        /// The instruction name.
        opcode: String,
        /// Number of indices given.
        count: usize,
    },

    /// Both local and remote conditional registers are present.
    #[error("Instruction '{0}' carries both a local and a remote conditional register")]
    ConflictingConditions(String),

    /// Parameter update arrived before any circuit.
    #[error("Circuit not sent before updating parameters")]
    NoCircuitLoaded,

    /// Parameter update supplied fewer values than the circuit consumes.
    #[error("Parameter update provides {got} values, circuit needs {expected}")]
    ParameterCountMismatch {
        /// Number of parametric slots in the circuit.
        expected: usize,
        /// Number of values received.
        got: usize,
    },

    /// Message is neither a circuit nor a parameter update.
    #[error("Incorrect format of the task message: {0}")]
    InvalidMessage(String),

    /// JSON decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;

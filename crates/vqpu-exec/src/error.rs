//! Error handling for shot execution.

use thiserror::Error;
use vqpu_comm::CommError;
use vqpu_hal::HalError;
use vqpu_ir::IrError;

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that abort a shot.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The circuit document or parameter update was malformed.
    #[error(transparent)]
    Ir(#[from] IrError),

    /// The simulation engine rejected an operation.
    #[error("Engine error: {0}")]
    Engine(#[from] HalError),

    /// A classical channel operation failed.
    #[error("Channel error: {0}")]
    Comm(#[from] CommError),

    /// Every unfinished task waits on another.
    #[error("Deadlock: tasks {blocked:?} are blocked on each other")]
    Deadlock { blocked: Vec<String> },

    /// An operand lies outside the owning task's register.
    #[error("Task '{task}' addresses qubit {qubit} but owns {num_qubits}")]
    InvalidQubit {
        task: String,
        qubit: usize,
        num_qubits: usize,
    },

    /// A measurement targets a clbit outside the owning task's register.
    #[error("Task '{task}' writes clbit {clbit} but owns {num_clbits}")]
    InvalidClbit {
        task: String,
        clbit: usize,
        num_clbits: usize,
    },

    /// A cross-task or cross-process instruction names no partner.
    #[error("Instruction '{opcode}' of task '{task}' names no partner")]
    MissingPeer { task: String, opcode: String },

    /// A partner task id is not part of the co-execution group.
    #[error("Task '{0}' is not part of the co-execution group")]
    UnknownTask(String),

    /// Two tasks share one id.
    #[error("Duplicate task id '{0}' in co-execution group")]
    DuplicateTask(String),

    /// A classical-channel opcode ran without a channel.
    #[error("Instruction '{0}' needs a classical channel but none is attached")]
    MissingChannel(String),

    /// Teleportation opcodes need a group of at least two tasks.
    #[error("Task '{0}' uses teleportation outside a multi-task group")]
    TeleportationUnavailable(String),

    /// An opcode that cannot appear inside a remote-controlled body.
    #[error("Instruction '{0}' is not allowed inside rcontrol")]
    InvalidNested(String),

    /// Nothing to execute.
    #[error("No tasks loaded")]
    EmptyGroup,
}

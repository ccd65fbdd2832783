//! Error handling for worker processes.

use thiserror::Error;
use vqpu_comm::CommError;
use vqpu_exec::ExecError;
use vqpu_hal::HalError;
use vqpu_ir::IrError;

use crate::config::ConfigError;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that stop a worker or fail one request.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Shot execution failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A circuit document or update was malformed.
    #[error(transparent)]
    Ir(#[from] IrError),

    /// The engine could not be created.
    #[error("Engine error: {0}")]
    Hal(#[from] HalError),

    /// Channel or discovery failure.
    #[error("Channel error: {0}")]
    Comm(#[from] CommError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A peer sent something the protocol does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The tracing subscriber could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

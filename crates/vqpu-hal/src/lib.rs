//! Virtual QPU Simulation Engine Abstraction
//!
//! The shot scheduler never depends on a concrete simulator. It drives any
//! type implementing [`SimulationEngine`], a deliberately small capability
//! interface: initialize a register, apply a gate, measure a qubit.
//!
//! # Overview
//!
//! - [`SimulationEngine`] and [`EngineFactory`] for backends
//! - [`EngineRegistry`] to create engines by name (the circuit's `method`)
//! - [`Counts`] and [`ExecutionResult`] for the published result document
//!
//! # Engines
//!
//! | Engine | Crate | Method name |
//! |--------|-------|-------------|
//! | Statevector | `vqpu-adapter-sim` | `statevector` |
//!
//! # Implementing an Engine
//!
//! ```ignore
//! use vqpu_hal::{EngineConfig, EngineFactory, HalResult, SimulationEngine};
//! use vqpu_ir::Gate;
//!
//! struct MyEngine { n: usize }
//!
//! impl SimulationEngine for MyEngine {
//!     fn name(&self) -> &str { "my_engine" }
//!     fn num_qubits(&self) -> usize { self.n }
//!     fn initialize(&mut self, n: usize) -> HalResult<()> { self.n = n; Ok(()) }
//!     fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) -> HalResult<()> { todo!() }
//!     fn measure(&mut self, qubit: usize) -> HalResult<bool> { todo!() }
//!     fn set_seed(&mut self, seed: u64) {}
//! }
//! ```

pub mod engine;
pub mod error;
pub mod registry;
pub mod result;

pub use engine::{EngineConfig, EngineFactory, SimulationEngine};
pub use error::{HalError, HalResult};
pub use registry::EngineRegistry;
pub use result::{Counts, ExecutionResult};

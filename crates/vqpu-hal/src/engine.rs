//! Simulation engine capability interface.
//!
//! The shot scheduler drives every backend through the same three verbs:
//!
//! ```text
//!   initialize(n) ──→ apply_gate(gate, qubits)* / measure(q)* ──→ initialize(n) ...
//! ```
//!
//! Engines own their register exclusively. Qubit indices passed to an engine
//! are absolute positions in the combined register.

use std::fmt;

use serde::{Deserialize, Serialize};
use vqpu_ir::Gate;

use crate::error::HalResult;

/// Configuration for an engine instance.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registered engine name.
    pub name: String,
    /// Seed for the engine's random source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Additional engine-specific settings.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EngineConfig {
    /// Create a configuration for the named engine.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add extra configuration.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("name", &self.name)
            .field("seed", &self.seed)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A state simulator the shot scheduler can drive.
///
/// Engines are shared by reference across awaits in spawned tasks, so they
/// must be `Sync` as well as `Send`.
pub trait SimulationEngine: Send + Sync {
    /// Name the engine is registered under.
    fn name(&self) -> &str;

    /// Size of the current register.
    fn num_qubits(&self) -> usize;

    /// Replace the register with `num_qubits` qubits in |0...0⟩.
    fn initialize(&mut self, num_qubits: usize) -> HalResult<()>;

    /// Apply a gate to absolute register positions.
    fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) -> HalResult<()>;

    /// Measure one qubit in the computational basis, collapsing the state.
    fn measure(&mut self, qubit: usize) -> HalResult<bool>;

    /// Reseed the engine's random source.
    fn set_seed(&mut self, seed: u64);

    /// Return one qubit to |0⟩.
    fn reset(&mut self, qubit: usize) -> HalResult<()> {
        if self.measure(qubit)? {
            self.apply_gate(&Gate::X, &[qubit])?;
        }
        Ok(())
    }
}

/// Construct an engine from configuration.
pub trait EngineFactory: Sized {
    /// Create an engine instance.
    fn from_config(config: EngineConfig) -> HalResult<Self>;
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn num_qubits(&self) -> usize {
        (**self).num_qubits()
    }

    fn initialize(&mut self, num_qubits: usize) -> HalResult<()> {
        (**self).initialize(num_qubits)
    }

    fn apply_gate(&mut self, gate: &Gate, qubits: &[usize]) -> HalResult<()> {
        (**self).apply_gate(gate, qubits)
    }

    fn measure(&mut self, qubit: usize) -> HalResult<bool> {
        (**self).measure(qubit)
    }

    fn set_seed(&mut self, seed: u64) {
        (**self).set_seed(seed);
    }

    fn reset(&mut self, qubit: usize) -> HalResult<()> {
        (**self).reset(qubit)
    }
}

//! Virtual QPU Statevector Engine
//!
//! Exact statevector simulation behind the [`vqpu_hal::SimulationEngine`] interface. The
//! shot scheduler hands this engine the combined register of every co-executed
//! task, plus the two communication qubits used by teleportation.
//!
//! # Features
//!
//! - **Collapse on measure**: mid-circuit measurement renormalizes the state,
//!   so later instructions see the post-measurement state
//! - **Seeded sampling**: a fixed seed reproduces every measurement outcome
//! - **Full gate set**: every gate in `vqpu-ir`, including 2x2 and 4x4 unitaries
//!
//! # Memory
//!
//! | Qubits | Memory |
//! |--------|--------|
//! | 10 | ~16 KB |
//! | 20 | ~16 MB |
//! | 26 | ~1 GB (default limit) |
//!
//! # Example
//!
//! ```rust
//! use vqpu_adapter_sim::StatevectorEngine;
//! use vqpu_hal::SimulationEngine;
//! use vqpu_ir::Gate;
//!
//! let mut engine = StatevectorEngine::with_seed(7);
//! engine.initialize(2).unwrap();
//! engine.apply_gate(&Gate::H, &[0]).unwrap();
//! engine.apply_gate(&Gate::CX, &[0, 1]).unwrap();
//! let a = engine.measure(0).unwrap();
//! assert_eq!(engine.measure(1).unwrap(), a);
//! ```

mod engine;
mod statevector;

pub use engine::{DEFAULT_MAX_QUBITS, ENGINE_NAME, StatevectorEngine};

use vqpu_hal::EngineRegistry;

/// Register the statevector engine under [`ENGINE_NAME`].
pub fn register(registry: &mut EngineRegistry) {
    registry.register::<StatevectorEngine>(ENGINE_NAME);
}

/// A registry holding every engine in this crate.
pub fn default_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    register(&mut registry);
    registry
}


//! Engine registry.
//!
//! The [`EngineRegistry`] maps engine names (the `method` of a circuit's
//! config) to factories producing boxed [`SimulationEngine`]s.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::engine::{EngineConfig, EngineFactory, SimulationEngine};
use crate::error::{HalError, HalResult};

/// Factory function type for engines.
type Factory = Box<dyn Fn(EngineConfig) -> HalResult<Box<dyn SimulationEngine>> + Send + Sync>;

/// Central registry of simulation engines.
pub struct EngineRegistry {
    factories: FxHashMap<String, Factory>,
}

impl EngineRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Register an engine type under `name`.
    pub fn register<E>(&mut self, name: impl Into<String>)
    where
        E: EngineFactory + SimulationEngine + 'static,
    {
        let name = name.into();
        debug!("Registering engine: {}", name);
        self.factories.insert(
            name,
            Box::new(|config| {
                let engine = E::from_config(config)?;
                Ok(Box::new(engine))
            }),
        );
    }

    /// Register an engine with a custom constructor.
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(EngineConfig) -> HalResult<Box<dyn SimulationEngine>> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!("Registering engine factory: {}", name);
        self.factories.insert(name, Box::new(factory));
    }

    /// Create the engine named in `config`.
    pub fn create(&self, config: EngineConfig) -> HalResult<Box<dyn SimulationEngine>> {
        match self.factories.get(&config.name) {
            Some(factory) => factory(config),
            None => Err(HalError::EngineUnavailable(format!(
                "No engine registered with name '{}'",
                config.name
            ))),
        }
    }

    /// List all registered engine names.
    pub fn available_engines(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an engine is registered.
    pub fn has_engine(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = EngineRegistry::new();
        assert!(registry.available_engines().is_empty());
        assert!(!registry.has_engine("statevector"));
    }

    #[test]
    fn test_create_unknown_engine() {
        let registry = EngineRegistry::new();
        let result = registry.create(EngineConfig::new("density_matrix"));
        assert!(matches!(result, Err(HalError::EngineUnavailable(_))));
    }

    #[test]
    fn test_available_engines_sorted() {
        let mut registry = EngineRegistry::new();
        registry.register_factory("zebra", |_| Err(HalError::Engine("test".into())));
        registry.register_factory("alpha", |_| Err(HalError::Engine("test".into())));
        assert_eq!(registry.available_engines(), vec!["alpha", "zebra"]);
    }
}

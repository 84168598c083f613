//! Module driver registry.
//!
//! Maps registered module names to driver factories. Backends own one
//! registry each; there is no global state.

use super::thermocycler::{SimulatingThermocycler, THERMOCYCLER_NAME, Thermocycler};
use deckhand_common::hal::module::{Module, ModuleError};
use std::collections::HashMap;

/// Factory building an unconnected driver, simulated or not.
pub type ModuleFactory = fn(simulating: bool) -> Box<dyn Module>;

/// Registry of available module drivers.
pub struct ModuleRegistry {
    factories: HashMap<&'static str, ModuleFactory>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in module driver.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(THERMOCYCLER_NAME, thermocycler_factory);
        registry
    }

    /// Register a module factory.
    ///
    /// # Panics
    /// Panics if a module with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: ModuleFactory) {
        if self.factories.contains_key(name) {
            panic!("Module '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Build an unconnected driver for `name`.
    ///
    /// # Errors
    /// Returns `ModuleError::UnknownModule` if nothing is registered under `name`.
    pub fn create_module(&self, name: &str, simulating: bool) -> Result<Box<dyn Module>, ModuleError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        Ok(factory(simulating))
    }

    /// Registered module names, sorted.
    pub fn list_modules(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn thermocycler_factory(simulating: bool) -> Box<dyn Module> {
    if simulating {
        Box::new(SimulatingThermocycler::new())
    } else {
        Box::new(Thermocycler::new())
    }
}

//! Variable type registry: maps back-end type names to constructors.

use std::collections::BTreeMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::errors::InvalidOperationError;
use crate::variable::Variable;

use super::file::{FileVariable, FILE_VARIABLE_TYPE};
use super::local::{LocalVariable, LOCAL_VARIABLE_TYPE};

type VariableConstructor = fn() -> Box<dyn Variable>;

/// Registry of variable constructors. Tests can build private registries; production
/// code shares [`global_variable_registry`].
#[derive(Default)]
pub struct VariableRegistry {
    constructors: BTreeMap<String, VariableConstructor>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in back-ends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(LOCAL_VARIABLE_TYPE, || Box::new(LocalVariable::new()))
            .expect("empty registry");
        registry
            .register(FILE_VARIABLE_TYPE, || Box::new(FileVariable::new()))
            .expect("empty registry");
        registry
    }

    /// Register a constructor. Duplicate names are a programmer error.
    pub fn register(
        &mut self,
        type_name: &str,
        constructor: VariableConstructor,
    ) -> Result<(), InvalidOperationError> {
        if self.constructors.contains_key(type_name) {
            return Err(InvalidOperationError(format!(
                "variable type [{type_name}] is already registered"
            )));
        }
        self.constructors.insert(type_name.to_string(), constructor);
        Ok(())
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn Variable>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

static GLOBAL_VARIABLE_REGISTRY: Lazy<Mutex<VariableRegistry>> =
    Lazy::new(|| Mutex::new(VariableRegistry::with_builtins()));

/// Process-wide registry, initialized once with all built-ins. Plug-ins add their
/// constructors here at load time.
pub fn global_variable_registry() -> std::sync::MutexGuard<'static, VariableRegistry> {
    GLOBAL_VARIABLE_REGISTRY
        .lock()
        .expect("variable registry lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_present() {
        let registry = VariableRegistry::with_builtins();
        assert!(registry.create("Local").is_some());
        assert!(registry.create("File").is_some());
        assert!(registry.create("Epics").is_none());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = VariableRegistry::with_builtins();
        let result = registry.register("Local", || Box::new(LocalVariable::new()));
        assert!(result.is_err());
    }
}

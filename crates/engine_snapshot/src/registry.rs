//! Component registry: maps persisted component names back to types.
//!
//! Snapshots store components by name. Restoring needs the matching
//! [`ComponentType`] to allocate columns and decode values, so every
//! component that may appear in a snapshot must be registered first.

use std::collections::HashMap;

use engine_component::{Component, ComponentType};

/// Name-keyed set of known component types.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    types: HashMap<&'static str, ComponentType>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register component `T`.
    pub fn register<T: Component>(&mut self) -> &mut Self {
        self.register_type(T::component_type())
    }

    /// Register a component descriptor. Re-registering a name replaces the
    /// previous descriptor.
    pub fn register_type(&mut self, component: ComponentType) -> &mut Self {
        self.types.insert(component.name(), component);
        self
    }

    /// Looks up a component type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ComponentType> {
        self.types.get(name).copied()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Health(u32);

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.is_empty());
        registry.register::<Health>().register::<Health>();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Health"), Some(Health::component_type()));
        assert!(registry.get("Mana").is_none());
    }
}

//! Core [`Component`] trait and the [`ComponentType`] descriptor.
//!
//! Every piece of data stored in a table must implement [`Component`]. The
//! trait requires `Default` because tables grow every column in lockstep, and
//! a freshly allocated row holds the default value until it is written.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. Names, not Rust types, define identity,
//! so a snapshot written by one build can be restored by another.

use std::any::TypeId;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::{Column, TypedColumn};

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The core component trait.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use engine_component::Component;
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component:
    Default + Send + Sync + 'static + Serialize + for<'de> Deserialize<'de>
{
    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }

    /// Returns the [`ComponentType`] descriptor used to build tables and
    /// queries holding this component.
    fn component_type() -> ComponentType {
        ComponentType {
            id: Self::component_type_id(),
            name: Self::type_name(),
            value_type: TypeId::of::<Self>(),
            new_column: || Box::new(TypedColumn::<Self>::new()),
        }
    }
}

/// Runtime descriptor of a registered component type.
///
/// This is the capability a table needs to allocate a column for the type
/// without knowing it statically. Descriptors compare by [`ComponentTypeId`].
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: ComponentTypeId,
    name: &'static str,
    value_type: TypeId,
    new_column: fn() -> Box<dyn Column>,
}

impl ComponentType {
    /// The type identifier.
    #[must_use]
    pub fn id(&self) -> ComponentTypeId {
        self.id
    }

    /// The component name (e.g. `"Position"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The Rust [`TypeId`] of the stored element type.
    #[must_use]
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Allocate an empty column for this component type.
    #[must_use]
    pub fn new_column(&self) -> Box<dyn Column> {
        (self.new_column)()
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[test]
    fn test_component_type_id_matches_from_name() {
        assert_eq!(Health::component_type_id(), ComponentTypeId::from_name("Health"));
        assert_eq!(ComponentTypeId::of::<Health>(), Health::component_type_id());
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(Health::component_type_id(), Velocity::component_type_id());
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of the empty string is the offset basis itself.
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
        // "a" is a published test vector.
        assert_eq!(
            ComponentTypeId::from_name("a"),
            ComponentTypeId(0xaf63_dc4c_8601_ec8c)
        );
    }

    #[test]
    fn test_descriptor_equality_by_id() {
        assert_eq!(Health::component_type(), Health::component_type());
        assert_ne!(Health::component_type(), Velocity::component_type());
    }

    #[test]
    fn test_descriptor_builds_matching_column() {
        let ty = Health::component_type();
        assert_eq!(ty.name(), "Health");
        assert_eq!(ty.value_type(), TypeId::of::<Health>());

        let column = ty.new_column();
        assert_eq!(column.component_type(), ty.id());
        assert!(column.is_empty());
    }
}

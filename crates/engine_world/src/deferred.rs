//! Structural mutations recorded while a storage is locked.
//!
//! Each operation captures the generation its entity had when it was queued.
//! When the storage unlocks, operations are applied in the order they were
//! recorded; any whose entity has since been recycled is skipped.

use std::any::Any;
use std::fmt;

use engine_component::{ComponentType, EntryId};

/// A deferred structural operation.
pub enum DeferredOp {
    /// Add a component, optionally initialised with a value.
    AddComponent {
        /// Target entity.
        id: EntryId,
        /// Generation of the entity when the operation was queued.
        recycled: u32,
        /// The component to add.
        component: ComponentType,
        /// Initial value; must be of the component's element type.
        value: Option<Box<dyn Any + Send>>,
    },
    /// Remove a component.
    RemoveComponent {
        /// Target entity.
        id: EntryId,
        /// Generation of the entity when the operation was queued.
        recycled: u32,
        /// The component to remove.
        component: ComponentType,
    },
    /// Destroy the entity and recycle its id.
    DestroyEntity {
        /// Target entity.
        id: EntryId,
        /// Generation of the entity when the operation was queued.
        recycled: u32,
    },
}

impl DeferredOp {
    /// The target entity.
    #[must_use]
    pub fn id(&self) -> EntryId {
        match self {
            Self::AddComponent { id, .. }
            | Self::RemoveComponent { id, .. }
            | Self::DestroyEntity { id, .. } => *id,
        }
    }

    /// The generation captured at enqueue time.
    #[must_use]
    pub fn recycled(&self) -> u32 {
        match self {
            Self::AddComponent { recycled, .. }
            | Self::RemoveComponent { recycled, .. }
            | Self::DestroyEntity { recycled, .. } => *recycled,
        }
    }

    /// The component being added or removed, if any.
    #[must_use]
    pub fn component(&self) -> Option<ComponentType> {
        match self {
            Self::AddComponent { component, .. } | Self::RemoveComponent { component, .. } => {
                Some(*component)
            }
            Self::DestroyEntity { .. } => None,
        }
    }
}

impl fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddComponent {
                id,
                recycled,
                component,
                value,
            } => f
                .debug_struct("AddComponent")
                .field("id", id)
                .field("recycled", recycled)
                .field("component", &component.name())
                .field("has_value", &value.is_some())
                .finish(),
            Self::RemoveComponent {
                id,
                recycled,
                component,
            } => f
                .debug_struct("RemoveComponent")
                .field("id", id)
                .field("recycled", recycled)
                .field("component", &component.name())
                .finish(),
            Self::DestroyEntity { id, recycled } => f
                .debug_struct("DestroyEntity")
                .field("id", id)
                .field("recycled", recycled)
                .finish(),
        }
    }
}

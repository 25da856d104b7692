//! # engine_world
//!
//! Archetype storage built on the primitives of [`engine_component`].
//!
//! A [`Storage`] owns the entry index and one [`Archetype`] per component
//! signature. Entities are addressed through [`Entity`] handles; traversal
//! happens through a [`Cursor`], which locks the storage so structural
//! changes are deferred until it is released.
//!
//! ```ignore
//! let mut storage = Storage::new();
//! let mut entities = storage.new_entities(3, &[Position::component_type()])?;
//! entities[0].add_component(&mut storage, Velocity::component_type())?;
//!
//! let mut cursor = storage.cursor(Query::new().with::<Velocity>());
//! while cursor.advance()? {
//!     let mut entity = cursor.current_entity()?;
//!     entity.enqueue_remove_component(cursor.storage_mut(), Velocity::component_type())?;
//! }
//! ```

pub mod archetype;
pub mod config;
pub mod cursor;
pub mod deferred;
pub mod entity;
pub mod error;
pub mod storage;

#[cfg(test)]
mod testing;

pub use archetype::{Archetype, ArchetypeId};
pub use config::StorageConfig;
pub use cursor::Cursor;
pub use deferred::DeferredOp;
pub use engine_component::{Component, ComponentType, ComponentTypeId, EntryId, Query};
pub use entity::Entity;
pub use error::StorageError;
pub use storage::{Storage, StorageId};

//! # engine_component
//!
//! The storage primitives of the ECS: what a component is, how ids are
//! allocated and recycled, and how rows are laid out in columns.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentType`] descriptor.
//! - [`EntryId`] / [`Entry`]: generational identifiers and their locations.
//! - [`EntryIndex`]: allocates, recycles and relocates entries.
//! - [`Table`]: struct-of-arrays rows for one component signature.
//! - [`Query`]: declarative AND/NOT signature predicates.
//! - [`TableError`]: failures raised by all of the above.

pub mod component;
pub mod entry;
pub mod error;
pub mod query;
pub mod table;

pub use component::{Component, ComponentType, ComponentTypeId};
pub use entry::{Entry, EntryId, EntryIndex, TableId};
pub use error::TableError;
pub use query::{Query, QueryFilter};
pub use table::{Column, Table, TypedColumn};

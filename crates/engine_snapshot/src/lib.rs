//! # engine_snapshot
//!
//! Persistence layered on top of [`engine_world`]. A storage is captured
//! into a serde model, encoded as MessagePack, and restored in one step,
//! with every entity keeping its id and generation.
//!
//! Component values are stored by name; restoring requires a
//! [`ComponentRegistry`] that knows every name in the snapshot.

pub mod error;
pub mod registry;
pub mod snapshot;

pub use error::SnapshotError;
pub use registry::ComponentRegistry;
pub use snapshot::{
    ArchetypeSnapshot, RowSnapshot, StorageSnapshot, capture, decode, encode, restore,
};

//! Storage-level error types.

use engine_component::{EntryId, TableError};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A direct structural mutation was attempted while a traversal holds
    /// the storage lock. Use the `enqueue_*` variants instead.
    #[error("storage '{storage}' is locked")]
    LockedStorage {
        /// Name of the locked storage.
        storage: String,
    },

    /// The handle's generation no longer matches the canonical entry, or its
    /// slot has been recycled.
    #[error("stale entity handle {id} (generation {recycled})")]
    StaleEntity {
        /// The handle's id.
        id: EntryId,
        /// The generation the handle was created with.
        recycled: u32,
    },

    /// The handle was created by a different storage.
    #[error("entity {id} belongs to another storage")]
    ForeignEntity {
        /// The handle's id.
        id: EntryId,
    },

    /// A forced insertion named an id that is already live.
    #[error("entity {id} is already live")]
    DuplicateEntry {
        /// The conflicting id.
        id: EntryId,
    },

    /// The addressed row has no column for the requested component.
    #[error("component '{component}' is not present")]
    MissingComponent {
        /// Name of the missing component.
        component: &'static str,
    },

    /// A cursor accessor was used before `advance` or after exhaustion.
    #[error("cursor is not positioned on a row")]
    CursorNotPositioned,

    /// The storage lock held for a cursor was released or replaced while the
    /// cursor was still live.
    #[error("cursor lock on storage '{storage}' was released during traversal")]
    CursorInvalidated {
        /// Name of the storage.
        storage: String,
    },

    /// Moving an entity between archetypes failed.
    #[error("failed to migrate entity {id}: {source}")]
    Migration {
        /// The entity being migrated.
        id: EntryId,
        /// The underlying table failure.
        source: TableError,
    },

    /// Entry index or table failure.
    #[error(transparent)]
    Table(#[from] TableError),
}

//! Snapshot error types.

use engine_component::TableError;
use engine_world::StorageError;

/// Errors that can occur while capturing or restoring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Failed to encode a snapshot to MessagePack.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a snapshot from MessagePack.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The snapshot names a component that is not registered.
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    /// A row carries a different number of values than its archetype has
    /// components.
    #[error("row {id} has {found} values, expected {expected}")]
    RowWidth {
        /// Raw id of the offending row.
        id: u32,
        /// Number of components in the archetype.
        expected: usize,
        /// Number of values in the row.
        found: usize,
    },

    /// A row uses the reserved id 0.
    #[error("row uses reserved id 0")]
    ZeroId,

    /// Two rows claim the same id.
    #[error("id {0} appears in more than one row")]
    DuplicateId(u32),

    /// Storage failure while restoring.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Row encoding or index failure.
    #[error(transparent)]
    Table(#[from] TableError),
}

//! Table and entry-index error types.

use crate::component::ComponentTypeId;

/// Errors raised by the entry index and by table row operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// A batch allocation was requested with an invalid size.
    #[error("invalid batch size {count}: at least one entry is required")]
    BatchOperation {
        /// The requested batch size.
        count: usize,
    },

    /// A recycle request was empty, or would retire every live entry.
    #[error("cannot recycle {count} unique entries out of {live} live entries")]
    BatchDeletion {
        /// Unique ids in the request.
        count: usize,
        /// Live entries in the index when the request was made.
        live: usize,
    },

    /// An index or id fell outside `[0, upper_bound)`.
    #[error("index {index} out of bounds (upper bound {upper_bound})")]
    Access {
        /// The offending position.
        index: usize,
        /// Exclusive upper bound at the time of access.
        upper_bound: usize,
    },

    /// The addressed slot holds no allocated entry.
    #[error("entry slot {index} is not allocated")]
    InvalidEntryAccess {
        /// The position of the hole.
        index: usize,
    },

    /// A value's type does not match the element type of the target column.
    #[error("value type does not match column '{component}'")]
    TypeMismatch {
        /// Name of the component whose column rejected the value.
        component: &'static str,
    },

    /// Columns of a table disagree on their length.
    #[error("table row length mismatch: {component} holds {found} rows, expected {expected}")]
    RowLengthMismatch {
        /// The offending column.
        component: ComponentTypeId,
        /// Length of the identifier column.
        expected: usize,
        /// Length of the offending column.
        found: usize,
    },

    /// Failed to encode a row value to MessagePack.
    #[error("failed to encode row: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a row value from MessagePack.
    #[error("failed to decode row: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

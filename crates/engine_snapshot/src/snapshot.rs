//! Capturing and restoring storage state.
//!
//! A [`StorageSnapshot`] mirrors the archetype layout: one
//! [`ArchetypeSnapshot`] per non-empty archetype, each row keeping its id,
//! generation and one MessagePack-encoded value per component. Restoring
//! rebuilds every row with its original id through
//! [`Storage::insert_forced`] in a scratch storage, which replaces the target
//! only once the whole snapshot has been applied.

use std::collections::HashSet;

use engine_component::EntryId;
use engine_world::Storage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SnapshotError;
use crate::registry::ComponentRegistry;

/// Persisted state of a whole storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Name of the storage the snapshot was taken from.
    pub name: String,
    /// Non-empty archetypes, in creation order.
    pub archetypes: Vec<ArchetypeSnapshot>,
}

impl StorageSnapshot {
    /// Total number of rows across all archetypes.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(|a| a.rows.len()).sum()
    }
}

/// Rows sharing one component signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeSnapshot {
    /// Component names, in column order.
    pub components: Vec<String>,
    /// Rows in table order.
    pub rows: Vec<RowSnapshot>,
}

/// One entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Raw entity id.
    pub id: u32,
    /// Generation of the id.
    pub recycled: u32,
    /// Encoded component values, parallel to [`ArchetypeSnapshot::components`].
    pub values: Vec<Vec<u8>>,
}

/// Captures every live entity of `storage`.
///
/// # Errors
///
/// Returns [`SnapshotError::Table`] if a row cannot be encoded or its id is
/// not live.
pub fn capture(storage: &Storage) -> Result<StorageSnapshot, SnapshotError> {
    let mut archetypes = Vec::new();
    for archetype in storage.archetypes().filter(|a| !a.is_empty()) {
        let table = archetype.table();
        let components = archetype
            .component_types()
            .iter()
            .map(|ty| ty.name().to_string())
            .collect();

        let mut rows = Vec::with_capacity(table.len());
        for (row, &id) in table.entry_ids().iter().enumerate() {
            let entry = storage.entry_index().entry_for(id)?;
            let values = archetype
                .component_types()
                .iter()
                .filter_map(|ty| table.column(ty.id()))
                .map(|column| column.encode_row(row))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(RowSnapshot {
                id: id.get(),
                recycled: entry.recycled(),
                values,
            });
        }
        archetypes.push(ArchetypeSnapshot { components, rows });
    }

    let snapshot = StorageSnapshot {
        name: storage.config().name.clone(),
        archetypes,
    };
    info!(
        storage = %snapshot.name,
        entities = snapshot.entity_count(),
        archetypes = snapshot.archetypes.len(),
        "captured snapshot"
    );
    Ok(snapshot)
}

/// Replaces the contents of `storage` with `snapshot`.
///
/// Either every row is restored or `storage` is left exactly as it was. On
/// success the storage takes a fresh [`engine_world::StorageId`], so handles
/// issued before the restore are rejected.
///
/// # Errors
///
/// Returns [`SnapshotError::UnknownComponent`] for unregistered names,
/// [`SnapshotError::RowWidth`] for malformed rows,
/// [`SnapshotError::ZeroId`] / [`SnapshotError::DuplicateId`] for invalid
/// ids, and storage errors if the storage is locked or a value fails to
/// decode.
pub fn restore(
    snapshot: &StorageSnapshot,
    registry: &ComponentRegistry,
    storage: &mut Storage,
) -> Result<(), SnapshotError> {
    if storage.locked() {
        return Err(engine_world::StorageError::LockedStorage {
            storage: storage.config().name.clone(),
        }
        .into());
    }

    let mut resolved = Vec::with_capacity(snapshot.archetypes.len());
    let mut ids = HashSet::with_capacity(snapshot.entity_count());
    for archetype in &snapshot.archetypes {
        let types = archetype
            .components
            .iter()
            .map(|name| {
                registry
                    .get(name)
                    .ok_or_else(|| SnapshotError::UnknownComponent(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for row in &archetype.rows {
            if row.values.len() != types.len() {
                return Err(SnapshotError::RowWidth {
                    id: row.id,
                    expected: types.len(),
                    found: row.values.len(),
                });
            }
            if row.id == 0 {
                return Err(SnapshotError::ZeroId);
            }
            if !ids.insert(row.id) {
                return Err(SnapshotError::DuplicateId(row.id));
            }
        }
        resolved.push(types);
    }

    let mut scratch = Storage::with_config(storage.config().clone());
    for (archetype, types) in snapshot.archetypes.iter().zip(&resolved) {
        for row in &archetype.rows {
            let entity = scratch.insert_forced(types, EntryId::from_raw(row.id), row.recycled)?;
            for (ty, bytes) in types.iter().zip(&row.values) {
                scratch.decode_component(&entity, *ty, bytes)?;
            }
        }
    }
    *storage = scratch;

    info!(
        storage = %storage.config().name,
        entities = snapshot.entity_count(),
        "restored snapshot"
    );
    Ok(())
}

/// Encode a snapshot to MessagePack bytes.
///
/// # Errors
///
/// Returns [`SnapshotError::Encode`] if serialisation fails.
pub fn encode(snapshot: &StorageSnapshot) -> Result<Vec<u8>, SnapshotError> {
    rmp_serde::to_vec(snapshot).map_err(SnapshotError::Encode)
}

/// Decode a snapshot from MessagePack bytes.
///
/// # Errors
///
/// Returns [`SnapshotError::Decode`] if deserialisation fails.
pub fn decode(bytes: &[u8]) -> Result<StorageSnapshot, SnapshotError> {
    rmp_serde::from_slice(bytes).map_err(SnapshotError::Decode)
}

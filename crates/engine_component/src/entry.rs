//! Entry identifiers and the [`EntryIndex`] allocator.
//!
//! An [`EntryId`] is a lightweight `u32` identifier with no inherent data. The
//! [`EntryIndex`] maps each live id to its [`Entry`]: the table and row that
//! currently hold it, plus a generation counter bumped every time the id is
//! handed out again after being recycled.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// A unique entry identifier. `0` is reserved for [`EntryId::INVALID`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntryId(pub u32);

impl EntryId {
    /// The null / unallocated sentinel.
    pub const INVALID: EntryId = EntryId(0);

    /// Create an id from a raw `u32`.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Position of this id's slot in the index (`id - 1`).
    #[must_use]
    pub const fn slot(self) -> Option<usize> {
        match self.0 {
            0 => None,
            id => Some(id as usize - 1),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({})", self.0)
    }
}

/// Identifies a table owned by a storage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TableId(pub u32);

impl TableId {
    /// The table id as a position in its owner's table list.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({})", self.0)
    }
}

/// The canonical location record of an id.
///
/// A zeroed entry (`id == 0`) marks a hole: a slot whose id was recycled
/// and has not been handed out again. Holes keep their last generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entry {
    id: EntryId,
    recycled: u32,
    table: TableId,
    index: usize,
}

impl Entry {
    /// Returns the id occupying this entry.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Number of times this id has been reused.
    #[must_use]
    pub fn recycled(&self) -> u32 {
        self.recycled
    }

    /// The table holding the row.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// The row inside [`Entry::table`].
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` if the entry is allocated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }
}

/// Allocates and recycles [`EntryId`]s and tracks where each one lives.
///
/// Entries are stored densely by `id - 1`. Recycled ids are queued in
/// `recyclable` and handed out again, oldest first, before any new id is
/// minted.
#[derive(Debug, Default)]
pub struct EntryIndex {
    curr_entry_id: u32,
    entries: Vec<Entry>,
    recyclable: Vec<Entry>,
    live: usize,
}

impl EntryIndex {
    /// Creates an empty index. The first minted id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `n` entries for rows `start..start + n` of `table`.
    ///
    /// Recycled ids are reused first, each with its generation bumped by one;
    /// the remainder are minted sequentially.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::BatchOperation`] if `n` is zero.
    pub fn new_entries(
        &mut self,
        n: usize,
        start: usize,
        table: TableId,
    ) -> Result<Vec<Entry>, TableError> {
        if n == 0 {
            return Err(TableError::BatchOperation { count: n });
        }

        let reused = self.recyclable.len().min(n);
        let mut created = Vec::with_capacity(n);

        for (offset, retired) in self.recyclable.drain(..reused).enumerate() {
            let entry = Entry {
                id: retired.id,
                recycled: retired.recycled + 1,
                table,
                index: start + offset,
            };
            Self::place(&mut self.entries, entry);
            created.push(entry);
        }

        for offset in reused..n {
            self.curr_entry_id += 1;
            let entry = Entry {
                id: EntryId(self.curr_entry_id),
                recycled: 0,
                table,
                index: start + offset,
            };
            Self::place(&mut self.entries, entry);
            created.push(entry);
        }

        self.live += n;
        Ok(created)
    }

    /// Returns the live entry at slot `i` (`id - 1`).
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] when `i` is outside `[0, len)`,
    /// [`TableError::InvalidEntryAccess`] when the slot is a hole.
    pub fn entry(&self, i: usize) -> Result<Entry, TableError> {
        let entry = self.entries.get(i).ok_or(TableError::Access {
            index: i,
            upper_bound: self.entries.len(),
        })?;
        if !entry.id.is_valid() {
            return Err(TableError::InvalidEntryAccess { index: i });
        }
        Ok(*entry)
    }

    /// Returns the live entry for `id`.
    ///
    /// # Errors
    ///
    /// Same as [`EntryIndex::entry`]; the reserved id `0` is an invalid access.
    pub fn entry_for(&self, id: EntryId) -> Result<Entry, TableError> {
        let slot = id.slot().ok_or(TableError::InvalidEntryAccess { index: 0 })?;
        self.entry(slot)
    }

    /// Rewrites the row of `id`, keeping its table and generation.
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] for unknown ids, [`TableError::InvalidEntryAccess`]
    /// for holes.
    pub fn update_index(&mut self, id: EntryId, row: usize) -> Result<(), TableError> {
        let entry = self.live_slot_mut(id)?;
        entry.index = row;
        Ok(())
    }

    /// Moves `id` to `row` of another table, keeping its generation.
    ///
    /// # Errors
    ///
    /// Same as [`EntryIndex::update_index`].
    pub fn update_location(
        &mut self,
        id: EntryId,
        table: TableId,
        row: usize,
    ) -> Result<(), TableError> {
        let entry = self.live_slot_mut(id)?;
        entry.table = table;
        entry.index = row;
        Ok(())
    }

    /// Retires `ids` so they can be handed out again.
    ///
    /// Duplicates and ids that are already holes are ignored. Nothing is
    /// modified unless the whole request is valid.
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] if any id is outside the index;
    /// [`TableError::BatchDeletion`] if the request has no ids, or would retire
    /// every live entry at once.
    pub fn recycle_entries(&mut self, ids: &[EntryId]) -> Result<(), TableError> {
        self.check_recycle(ids)?;

        for &id in ids {
            let Some(slot) = id.slot() else { continue };
            let current = self.entries[slot];
            if !current.id.is_valid() {
                continue;
            }
            self.recyclable.push(Entry {
                id,
                recycled: current.recycled,
                ..Entry::default()
            });
            self.entries[slot] = Entry {
                recycled: current.recycled,
                ..Entry::default()
            };
            self.live -= 1;
        }
        Ok(())
    }

    /// Validates a recycle request without applying it.
    ///
    /// # Errors
    ///
    /// See [`EntryIndex::recycle_entries`].
    pub fn check_recycle(&self, ids: &[EntryId]) -> Result<(), TableError> {
        let mut unique: Vec<EntryId> = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut requested_live = 0;
        for &id in &unique {
            let slot = id.slot().ok_or(TableError::InvalidEntryAccess { index: 0 })?;
            let entry = self.entries.get(slot).ok_or(TableError::Access {
                index: slot,
                upper_bound: self.entries.len(),
            })?;
            if entry.id.is_valid() {
                requested_live += 1;
            }
        }

        if unique.is_empty() || requested_live >= self.live {
            return Err(TableError::BatchDeletion {
                count: unique.len(),
                live: self.live,
            });
        }
        Ok(())
    }

    /// Discards every entry and restarts id allocation at `1`.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.recyclable.clear();
        self.curr_entry_id = 0;
        self.live = 0;
    }

    /// Inserts `id` directly, bypassing allocation.
    ///
    /// Reserved for restoring persisted state. Slots skipped over while
    /// growing the index become recyclable, and the id counter never falls
    /// behind the highest id present.
    ///
    /// # Errors
    ///
    /// [`TableError::InvalidEntryAccess`] for the reserved id `0`.
    pub fn force_new_entry(
        &mut self,
        id: EntryId,
        recycled: u32,
        row: usize,
        table: TableId,
    ) -> Result<(), TableError> {
        let slot = id.slot().ok_or(TableError::InvalidEntryAccess { index: 0 })?;

        if slot >= self.entries.len() {
            let first_new = self.entries.len();
            self.entries.resize(slot + 1, Entry::default());
            for hole in first_new..slot {
                let hole_id = EntryId(hole as u32 + 1);
                if !self.recyclable.iter().any(|e| e.id == hole_id) {
                    self.recyclable.push(Entry {
                        id: hole_id,
                        ..Entry::default()
                    });
                }
            }
        }

        if !self.entries[slot].id.is_valid() {
            self.live += 1;
        }
        self.recyclable.retain(|e| e.id != id);
        self.entries[slot] = Entry {
            id,
            recycled,
            table,
            index: row,
        };
        self.curr_entry_id = self.curr_entry_id.max(id.0);
        Ok(())
    }

    /// All slots, holes included.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Retired entries waiting for reuse, oldest first.
    #[must_use]
    pub fn recyclable(&self) -> &[Entry] {
        &self.recyclable
    }

    /// Number of slots, holes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no slot has ever been allocated since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of allocated (non-hole) entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// The highest id minted so far.
    #[must_use]
    pub fn current_id(&self) -> EntryId {
        EntryId(self.curr_entry_id)
    }

    fn place(entries: &mut Vec<Entry>, entry: Entry) {
        let slot = entry.id.0 as usize - 1;
        if slot >= entries.len() {
            entries.resize(slot + 1, Entry::default());
        }
        entries[slot] = entry;
    }

    fn live_slot_mut(&mut self, id: EntryId) -> Result<&mut Entry, TableError> {
        let slot = id.slot().ok_or(TableError::InvalidEntryAccess { index: 0 })?;
        let upper_bound = self.entries.len();
        let entry = self.entries.get_mut(slot).ok_or(TableError::Access {
            index: slot,
            upper_bound,
        })?;
        if !entry.id.is_valid() {
            return Err(TableError::InvalidEntryAccess { index: slot });
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const TABLE: TableId = TableId(0);

    #[test]
    fn test_sequential_ids_start_at_one() {
        let mut index = EntryIndex::new();
        let entries = index.new_entries(3, 0, TABLE).unwrap();
        let ids: Vec<u32> = entries.iter().map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(entries[2].index(), 2);
        assert_eq!(index.live_count(), 3);
        assert_eq!(index.current_id(), EntryId(3));
    }

    #[test]
    fn test_zero_batch_is_rejected() {
        let mut index = EntryIndex::new();
        let err = index.new_entries(0, 0, TABLE).unwrap_err();
        assert!(matches!(err, TableError::BatchOperation { count: 0 }));
    }

    #[test]
    fn test_recycled_id_is_reused_with_bumped_generation() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        index.recycle_entries(&[EntryId(2)]).unwrap();

        let reused = index.new_entries(1, 2, TABLE).unwrap();
        assert_eq!(reused[0].id(), EntryId(2));
        assert_eq!(reused[0].recycled(), 1);
        assert_eq!(reused[0].index(), 2);
        assert_eq!(index.entry_for(EntryId(2)).unwrap().recycled(), 1);
    }

    #[test]
    fn test_generation_counts_every_reuse() {
        let mut index = EntryIndex::new();
        index.new_entries(2, 0, TABLE).unwrap();
        for _ in 0..4 {
            index.recycle_entries(&[EntryId(1)]).unwrap();
            index.new_entries(1, 0, TABLE).unwrap();
        }
        assert_eq!(index.entry_for(EntryId(1)).unwrap().recycled(), 4);
    }

    #[test]
    fn test_mixed_batch_reuses_before_minting() {
        let mut index = EntryIndex::new();
        index.new_entries(4, 0, TABLE).unwrap();
        index.recycle_entries(&[EntryId(3), EntryId(1)]).unwrap();

        let entries = index.new_entries(3, 10, TABLE).unwrap();
        let ids: Vec<u32> = entries.iter().map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![3, 1, 5]);
        let rows: Vec<usize> = entries.iter().map(Entry::index).collect();
        assert_eq!(rows, vec![10, 11, 12]);
    }

    #[test]
    fn test_live_ids_stay_unique() {
        let mut index = EntryIndex::new();
        index.new_entries(10, 0, TABLE).unwrap();
        index
            .recycle_entries(&[EntryId(2), EntryId(5), EntryId(9)])
            .unwrap();
        index.new_entries(5, 7, TABLE).unwrap();
        index.recycle_entries(&[EntryId(1), EntryId(5)]).unwrap();
        index.new_entries(1, 12, TABLE).unwrap();

        let mut seen = HashSet::new();
        for entry in index.entries().iter().filter(|e| e.is_valid()) {
            assert!(seen.insert(entry.id()), "duplicate live id {}", entry.id());
        }
        assert_eq!(seen.len(), index.live_count());
    }

    #[test]
    fn test_entry_out_of_bounds() {
        let mut index = EntryIndex::new();
        index.new_entries(2, 0, TABLE).unwrap();
        let err = index.entry(index.len()).unwrap_err();
        assert!(matches!(
            err,
            TableError::Access {
                index: 2,
                upper_bound: 2
            }
        ));
    }

    #[test]
    fn test_entry_hole_is_invalid_access() {
        let mut index = EntryIndex::new();
        index.new_entries(2, 0, TABLE).unwrap();
        index.recycle_entries(&[EntryId(1)]).unwrap();
        let err = index.entry(0).unwrap_err();
        assert!(matches!(err, TableError::InvalidEntryAccess { index: 0 }));
        assert!(matches!(
            index.entry_for(EntryId::INVALID),
            Err(TableError::InvalidEntryAccess { .. })
        ));
    }

    #[test]
    fn test_update_index_preserves_generation() {
        let mut index = EntryIndex::new();
        index.new_entries(2, 0, TABLE).unwrap();
        index.recycle_entries(&[EntryId(1)]).unwrap();
        index.new_entries(1, 5, TABLE).unwrap();

        index.update_index(EntryId(1), 9).unwrap();
        let entry = index.entry_for(EntryId(1)).unwrap();
        assert_eq!(entry.index(), 9);
        assert_eq!(entry.recycled(), 1);
        assert_eq!(entry.table(), TABLE);

        assert!(matches!(
            index.update_index(EntryId(7), 0),
            Err(TableError::Access { .. })
        ));
    }

    #[test]
    fn test_update_location_moves_table() {
        let mut index = EntryIndex::new();
        index.new_entries(1, 0, TABLE).unwrap();
        index.update_location(EntryId(1), TableId(4), 3).unwrap();
        let entry = index.entry_for(EntryId(1)).unwrap();
        assert_eq!(entry.table(), TableId(4));
        assert_eq!(entry.index(), 3);
    }

    #[test]
    fn test_recycling_every_live_entry_is_rejected() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        let err = index
            .recycle_entries(&[EntryId(1), EntryId(2), EntryId(3)])
            .unwrap_err();
        assert!(matches!(err, TableError::BatchDeletion { count: 3, live: 3 }));
        // Nothing changed.
        assert_eq!(index.live_count(), 3);
        assert!(index.recyclable().is_empty());
    }

    #[test]
    fn test_empty_recycle_is_rejected() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        assert!(matches!(
            index.recycle_entries(&[]),
            Err(TableError::BatchDeletion { count: 0, .. })
        ));
    }

    #[test]
    fn test_recycle_deduplicates() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        index
            .recycle_entries(&[EntryId(2), EntryId(2), EntryId(2)])
            .unwrap();
        assert_eq!(index.recyclable().len(), 1);
        assert_eq!(index.live_count(), 2);
    }

    #[test]
    fn test_recycle_unknown_id_changes_nothing() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        assert!(matches!(
            index.recycle_entries(&[EntryId(1), EntryId(40)]),
            Err(TableError::Access { .. })
        ));
        assert!(index.entry_for(EntryId(1)).is_ok());
    }

    #[test]
    fn test_reset_restarts_allocation() {
        let mut index = EntryIndex::new();
        index.new_entries(3, 0, TABLE).unwrap();
        index.recycle_entries(&[EntryId(1)]).unwrap();
        index.reset();
        assert!(index.is_empty());
        assert!(index.recyclable().is_empty());
        let entries = index.new_entries(1, 0, TABLE).unwrap();
        assert_eq!(entries[0].id(), EntryId(1));
        assert_eq!(entries[0].recycled(), 0);
    }

    #[test]
    fn test_force_new_entry_fills_gaps() {
        let mut index = EntryIndex::new();
        index.force_new_entry(EntryId(4), 2, 0, TABLE).unwrap();
        index.force_new_entry(EntryId(2), 0, 1, TABLE).unwrap();

        assert_eq!(index.len(), 4);
        assert_eq!(index.live_count(), 2);
        assert_eq!(index.current_id(), EntryId(4));
        assert_eq!(index.entry_for(EntryId(4)).unwrap().recycled(), 2);

        // Skipped ids 1 and 3 are handed out before anything new is minted.
        let entries = index.new_entries(3, 2, TABLE).unwrap();
        let ids: Vec<u32> = entries.iter().map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}

//! Locked traversal over the rows matching a [`Query`].
//!
//! A [`Cursor`] raises the storage lock when created and lowers it exactly
//! once: when [`Cursor::advance`] runs out of rows, when [`Cursor::finish`]
//! is called, or when the cursor is dropped. Lowering the lock drains the
//! deferred queue.
//!
//! Releasing that lock any other way, such as calling [`Storage::unlock`]
//! through [`Cursor::storage_mut`], invalidates the cursor: rows may have
//! moved, so every later accessor and [`Cursor::advance`] fail with
//! [`StorageError::CursorInvalidated`].
//!
//! ```ignore
//! let mut cursor = storage.cursor(Query::new().with::<Position>());
//! while cursor.advance()? {
//!     cursor.get_mut::<Position>()?.x += 1.0;
//! }
//! ```

use engine_component::{Component, Query};
use tracing::error;

use crate::archetype::ArchetypeId;
use crate::entity::Entity;
use crate::error::StorageError;
use crate::storage::Storage;

/// A single-pass, non-restartable iterator over matching rows.
#[derive(Debug)]
pub struct Cursor<'s> {
    storage: &'s mut Storage,
    query: Query,
    archetypes: Vec<ArchetypeId>,
    total_matched: usize,
    current: Option<(usize, usize)>,
    next: (usize, usize),
    owns_lock: bool,
    lock_epoch: u64,
    released: bool,
}

impl<'s> Cursor<'s> {
    /// Binds `query` to `storage` and locks it.
    ///
    /// The matching archetypes and [`Cursor::total_matched`] are fixed here.
    /// If the storage was already locked, the outer holder keeps ownership of
    /// the lock and this cursor will not drain the queue.
    pub fn new(query: Query, storage: &'s mut Storage) -> Self {
        let archetypes = storage.matching_archetypes(&query);
        let total_matched = archetypes
            .iter()
            .map(|&id| storage.archetype_len(id))
            .sum();
        let owns_lock = !storage.locked();
        storage.lock();
        let lock_epoch = storage.lock_epoch();

        Self {
            storage,
            query,
            archetypes,
            total_matched,
            current: None,
            next: (0, 0),
            owns_lock,
            lock_epoch,
            released: false,
        }
    }

    /// Moves to the next row. Returns `false` once every matching row has
    /// been visited, at which point the lock is released.
    ///
    /// Row counts are read live, so rows appended to a matched archetype
    /// during traversal are visited. Destruction is deferred while the lock
    /// is held, so no matched row is skipped.
    ///
    /// # Errors
    ///
    /// The first failing deferred operation, reported when the lock is
    /// released. [`StorageError::CursorInvalidated`] if the lock was dropped
    /// through [`Cursor::storage_mut`]; the cursor is then exhausted.
    pub fn advance(&mut self) -> Result<bool, StorageError> {
        if self.released {
            return Ok(false);
        }
        if let Err(err) = self.ensure_valid() {
            self.released = true;
            self.current = None;
            return Err(err);
        }

        let (mut slot, mut row) = self.next;
        while let Some(&archetype) = self.archetypes.get(slot) {
            if row < self.storage.archetype_len(archetype) {
                self.current = Some((slot, row));
                self.next = (slot, row + 1);
                return Ok(true);
            }
            slot += 1;
            row = 0;
        }

        self.next = (slot, row);
        self.release()?;
        Ok(false)
    }

    /// Releases the lock before the traversal is exhausted.
    ///
    /// # Errors
    ///
    /// As [`Cursor::advance`].
    pub fn finish(mut self) -> Result<(), StorageError> {
        self.release()
    }

    /// Number of rows matched when the cursor was created. Not updated for
    /// later insertions or deletions.
    #[must_use]
    pub fn total_matched(&self) -> usize {
        self.total_matched
    }

    /// The query this cursor was built from.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Archetypes visited by this cursor, in visiting order.
    #[must_use]
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// The current `(archetype, row)`, if positioned.
    #[must_use]
    pub fn position(&self) -> Option<(ArchetypeId, usize)> {
        let (slot, row) = self.current?;
        Some((self.archetypes[slot], row))
    }

    fn positioned(&self) -> Result<(ArchetypeId, usize), StorageError> {
        let position = self.position().ok_or(StorageError::CursorNotPositioned)?;
        self.ensure_valid()?;
        Ok(position)
    }

    fn ensure_valid(&self) -> Result<(), StorageError> {
        if self.storage.locked() && self.storage.lock_epoch() == self.lock_epoch {
            return Ok(());
        }
        Err(StorageError::CursorInvalidated {
            storage: self.storage.config().name.clone(),
        })
    }

    /// Resolves the entity occupying the current row.
    ///
    /// # Errors
    ///
    /// [`StorageError::CursorNotPositioned`] before the first `advance` or
    /// after exhaustion; [`StorageError::CursorInvalidated`] once the lock was
    /// dropped.
    pub fn current_entity(&self) -> Result<Entity, StorageError> {
        let (archetype, row) = self.positioned()?;
        let id = self
            .storage
            .archetype(archetype)
            .and_then(|a| a.table().entry_id(row))
            .ok_or(StorageError::CursorNotPositioned)?;
        self.storage.entity(id)
    }

    /// Reads component `T` at the current row.
    ///
    /// # Errors
    ///
    /// [`StorageError::CursorNotPositioned`],
    /// [`StorageError::MissingComponent`] if the archetype lacks `T`.
    pub fn get<T: Component>(&self) -> Result<&T, StorageError> {
        let (archetype, row) = self.positioned()?;
        self.storage.component_at(archetype, row)
    }

    /// Mutably borrows component `T` at the current row.
    ///
    /// # Errors
    ///
    /// As [`Cursor::get`].
    pub fn get_mut<T: Component>(&mut self) -> Result<&mut T, StorageError> {
        let (archetype, row) = self.positioned()?;
        self.storage.component_at_mut(archetype, row)
    }

    /// The locked storage, for enqueueing operations and writing values
    /// mid-traversal.
    ///
    /// Structural calls that need the lock lowered still fail with
    /// [`StorageError::LockedStorage`]. Calling [`Storage::unlock`] here
    /// drains the queue early and invalidates this cursor.
    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut *self.storage
    }

    /// Read-only view of the storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &*self.storage
    }

    fn release(&mut self) -> Result<(), StorageError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.current = None;
        // A lock raised by someone else after invalidation is not ours.
        if self.owns_lock && self.ensure_valid().is_ok() {
            self.storage.unlock()
        } else {
            Ok(())
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(
                storage = %self.storage.config().name,
                error = %err,
                "deferred operations failed while releasing cursor"
            );
        }
    }
}

//! The [`Storage`]: entry index, archetypes, and the traversal lock.
//!
//! A storage is the single owner of every row and id it hands out. Entity
//! handles and cursors reach it by reference; there is no global state, and
//! each storage can be reset independently.
//!
//! ## Lock protocol
//!
//! While locked (normally by an active [`Cursor`]), direct structural
//! mutations fail with [`StorageError::LockedStorage`]. The `enqueue_*`
//! entity methods instead record a [`DeferredOp`], as does
//! [`Storage::destroy_entities`], and [`Storage::unlock`] applies the queue
//! in FIFO order, skipping operations whose entity was recycled in the
//! meantime. Appending rows is the only structural change applied while
//! locked, since it never moves an existing row. This is a single-threaded
//! reentrancy guard.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use engine_component::{
    Component, ComponentType, ComponentTypeId, Entry, EntryId, EntryIndex, Query, TableError,
    TableId,
};
use tracing::{debug, info, trace, warn};

use crate::archetype::{Archetype, ArchetypeId, signature_of};
use crate::config::StorageConfig;
use crate::cursor::Cursor;
use crate::deferred::DeferredOp;
use crate::entity::Entity;
use crate::error::StorageError;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Storage`], carried by its entity handles.
///
/// A storage takes a fresh id on every [`Storage::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageId(u64);

impl StorageId {
    fn next() -> Self {
        Self(NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Archetype-based entity/component storage.
#[derive(Debug)]
pub struct Storage {
    id: StorageId,
    config: StorageConfig,
    index: EntryIndex,
    archetypes: Vec<Archetype>,
    signatures: HashMap<BTreeSet<ComponentTypeId>, ArchetypeId>,
    locked: bool,
    /// Bumped every time the lock is raised.
    lock_epoch: u64,
    queue: VecDeque<DeferredOp>,
}

impl Storage {
    /// Create an empty storage with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    /// Create an empty storage.
    #[must_use]
    pub fn with_config(config: StorageConfig) -> Self {
        Self {
            id: StorageId::next(),
            config,
            index: EntryIndex::new(),
            archetypes: Vec::new(),
            signatures: HashMap::new(),
            locked: false,
            lock_epoch: 0,
            queue: VecDeque::new(),
        }
    }

    /// This storage's identity.
    #[must_use]
    pub fn id(&self) -> StorageId {
        self.id
    }

    /// The configuration this storage was created with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Read-only view of the entry index.
    #[must_use]
    pub fn entry_index(&self) -> &EntryIndex {
        &self.index
    }

    // -- Archetypes --

    /// Returns the archetype for `components`, creating it if needed.
    ///
    /// Order and duplicates in `components` are irrelevant.
    pub fn new_or_existing_archetype(&mut self, components: &[ComponentType]) -> ArchetypeId {
        let signature = signature_of(components);
        if let Some(&id) = self.signatures.get(&signature) {
            return id;
        }

        let id = TableId(self.archetypes.len() as u32);
        let archetype = Archetype::new(id, components, self.config.row_capacity);
        debug!(
            storage = %self.config.name,
            archetype = id.0,
            components = ?archetype.component_types().iter().map(ComponentType::name).collect::<Vec<_>>(),
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.signatures.insert(signature, id);
        id
    }

    /// Returns an archetype by id.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.as_usize())
    }

    /// Returns an iterator over all archetypes, in creation order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Returns the number of archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Returns the ids of every archetype matching `query`, in creation order.
    #[must_use]
    pub fn matching_archetypes(&self, query: &Query) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|archetype| query.matches(archetype.signature()))
            .map(Archetype::id)
            .collect()
    }

    /// Starts a locked traversal over every row matching `query`.
    pub fn cursor(&mut self, query: Query) -> Cursor<'_> {
        Cursor::new(query, self)
    }

    // -- Entities --

    /// Creates `n` entities with the given components, all default-valued.
    ///
    /// # Errors
    ///
    /// [`TableError::BatchOperation`] if `n` is zero.
    pub fn new_entities(
        &mut self,
        n: usize,
        components: &[ComponentType],
    ) -> Result<Vec<Entity>, StorageError> {
        if n == 0 {
            return Err(TableError::BatchOperation { count: n }.into());
        }

        let archetype_id = self.new_or_existing_archetype(components);
        let archetype = &mut self.archetypes[archetype_id.as_usize()];
        let entries = archetype.table_mut().new_entries(n, &mut self.index)?;
        let component_types = archetype.component_types().to_vec();

        trace!(
            storage = %self.config.name,
            archetype = archetype_id.0,
            count = n,
            "allocated entities"
        );

        Ok(entries
            .into_iter()
            .map(|entry| Entity::new(self.id, entry, component_types.clone()))
            .collect())
    }

    /// Builds a fresh handle for a live id.
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] / [`TableError::InvalidEntryAccess`] if `id` is
    /// not live.
    pub fn entity(&self, id: EntryId) -> Result<Entity, StorageError> {
        let entry = self.index.entry_for(id)?;
        Ok(Entity::new(self.id, entry, self.components_of(entry.table())))
    }

    /// Handles for every live entity, in archetype then row order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities = Vec::with_capacity(self.index.live_count());
        for archetype in &self.archetypes {
            let components = archetype.component_types().to_vec();
            for &id in archetype.table().entry_ids() {
                if let Ok(entry) = self.index.entry_for(id) {
                    entities.push(Entity::new(self.id, entry, components.clone()));
                }
            }
        }
        entities
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.index.live_count()
    }

    /// Destroys entities in one batch: rows are swap-removed, then the ids
    /// are recycled.
    ///
    /// While locked, each destruction is queued as a
    /// [`DeferredOp::DestroyEntity`] and applied on unlock, so rows never move
    /// under an active cursor. Nothing is modified or queued if any handle is
    /// stale or the recycle request is rejected.
    ///
    /// # Errors
    ///
    /// [`StorageError::StaleEntity`] / [`StorageError::ForeignEntity`] for bad
    /// handles; [`TableError::BatchDeletion`] if `entities` is empty or covers
    /// every live entity.
    pub fn destroy_entities(&mut self, entities: &[Entity]) -> Result<(), StorageError> {
        let mut seen = HashSet::with_capacity(entities.len());
        let mut targets = Vec::with_capacity(entities.len());
        for entity in entities {
            let entry = self.resolve(entity)?;
            if seen.insert(entry.id()) {
                targets.push(entry);
            }
        }
        let ids: Vec<EntryId> = targets.iter().map(Entry::id).collect();
        self.index.check_recycle(&ids)?;

        if self.locked {
            for entry in targets {
                self.enqueue(DeferredOp::DestroyEntity {
                    id: entry.id(),
                    recycled: entry.recycled(),
                });
            }
            return Ok(());
        }
        self.destroy_ids(&ids)
    }

    fn destroy_ids(&mut self, ids: &[EntryId]) -> Result<(), StorageError> {
        self.index.check_recycle(ids)?;
        for &id in ids {
            let entry = self.index.entry_for(id)?;
            self.archetypes[entry.table().as_usize()]
                .table_mut()
                .delete_entry(entry.index(), &mut self.index)?;
        }
        self.index.recycle_entries(ids)?;

        debug!(
            storage = %self.config.name,
            count = ids.len(),
            "destroyed entities"
        );
        Ok(())
    }

    // -- Component access --

    /// Reads component `T` of `entity`.
    ///
    /// # Errors
    ///
    /// Stale/foreign handles, [`StorageError::MissingComponent`], or
    /// [`TableError::TypeMismatch`].
    pub fn get<T: Component>(&self, entity: &Entity) -> Result<&T, StorageError> {
        let entry = self.resolve(entity)?;
        self.component_at(entry.table(), entry.index())
    }

    /// Mutably borrows component `T` of `entity`.
    ///
    /// Writing values is not a structural change and is allowed while locked.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::get`].
    pub fn get_mut<T: Component>(&mut self, entity: &Entity) -> Result<&mut T, StorageError> {
        let entry = self.resolve(entity)?;
        self.component_at_mut(entry.table(), entry.index())
    }

    pub(crate) fn component_at<T: Component>(
        &self,
        archetype: ArchetypeId,
        row: usize,
    ) -> Result<&T, StorageError> {
        let table = self
            .archetype(archetype)
            .ok_or(TableError::Access {
                index: archetype.as_usize(),
                upper_bound: self.archetypes.len(),
            })?
            .table();
        let column = table.typed_column::<T>()?.ok_or(StorageError::MissingComponent {
            component: T::type_name(),
        })?;
        Ok(column.get(row).ok_or(TableError::Access {
            index: row,
            upper_bound: column.values().len(),
        })?)
    }

    pub(crate) fn component_at_mut<T: Component>(
        &mut self,
        archetype: ArchetypeId,
        row: usize,
    ) -> Result<&mut T, StorageError> {
        let upper_bound = self.archetypes.len();
        let table = self
            .archetypes
            .get_mut(archetype.as_usize())
            .ok_or(TableError::Access {
                index: archetype.as_usize(),
                upper_bound,
            })?
            .table_mut();
        let column = table
            .typed_column_mut::<T>()?
            .ok_or(StorageError::MissingComponent {
                component: T::type_name(),
            })?;
        let len = column.values().len();
        Ok(column.get_mut(row).ok_or(TableError::Access {
            index: row,
            upper_bound: len,
        })?)
    }

    /// Overwrites one component value of `entity` from MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Stale/foreign handles, [`StorageError::MissingComponent`], or
    /// [`TableError::Decode`].
    pub fn decode_component(
        &mut self,
        entity: &Entity,
        component: ComponentType,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let entry = self.resolve(entity)?;
        let column = self.archetypes[entry.table().as_usize()]
            .table_mut()
            .column_mut(component.id())
            .ok_or(StorageError::MissingComponent {
                component: component.name(),
            })?;
        column.decode_row(entry.index(), bytes)?;
        Ok(())
    }

    // -- Structural mutation --

    pub(crate) fn add_component(
        &mut self,
        entity: &Entity,
        component: ComponentType,
        value: Option<Box<dyn Any + Send>>,
    ) -> Result<Entry, StorageError> {
        self.ensure_unlocked()?;
        let entry = self.resolve(entity)?;
        self.add_component_at(entry, component, value)
    }

    pub(crate) fn remove_component(
        &mut self,
        entity: &Entity,
        component: ComponentType,
    ) -> Result<Entry, StorageError> {
        self.ensure_unlocked()?;
        let entry = self.resolve(entity)?;
        self.remove_component_at(entry, component)
    }

    fn add_component_at(
        &mut self,
        entry: Entry,
        component: ComponentType,
        value: Option<Box<dyn Any + Send>>,
    ) -> Result<Entry, StorageError> {
        let source = &self.archetypes[entry.table().as_usize()];
        if source.contains(component.id()) {
            return Ok(entry);
        }
        if let Some(value) = &value
            && (**value).type_id() != component.value_type()
        {
            return Err(TableError::TypeMismatch {
                component: component.name(),
            }
            .into());
        }

        let mut components = source.component_types().to_vec();
        components.push(component);
        let dest = self.new_or_existing_archetype(&components);
        let row = self.migrate(entry, dest)?;

        if let Some(value) = value {
            self.archetypes[dest.as_usize()]
                .table_mut()
                .column_mut(component.id())
                .ok_or(StorageError::MissingComponent {
                    component: component.name(),
                })?
                .set_any(row, value)?;
        }
        Ok(self.index.entry_for(entry.id())?)
    }

    fn remove_component_at(
        &mut self,
        entry: Entry,
        component: ComponentType,
    ) -> Result<Entry, StorageError> {
        let source = &self.archetypes[entry.table().as_usize()];
        if !source.contains(component.id()) {
            return Ok(entry);
        }

        let components: Vec<ComponentType> = source
            .component_types()
            .iter()
            .copied()
            .filter(|ty| ty.id() != component.id())
            .collect();
        let dest = self.new_or_existing_archetype(&components);
        self.migrate(entry, dest)?;
        Ok(self.index.entry_for(entry.id())?)
    }

    fn migrate(&mut self, entry: Entry, dest: ArchetypeId) -> Result<usize, StorageError> {
        let (source, target) = pair_mut(
            &mut self.archetypes,
            entry.table().as_usize(),
            dest.as_usize(),
        );
        let row = source
            .table_mut()
            .transfer_entry(target.table_mut(), entry.index(), &mut self.index)
            .map_err(|source| StorageError::Migration {
                id: entry.id(),
                source,
            })?;

        trace!(
            storage = %self.config.name,
            entity = entry.id().get(),
            from = entry.table().0,
            to = dest.0,
            row,
            "migrated entity"
        );
        Ok(row)
    }

    /// Checks a handle against the canonical entry.
    pub(crate) fn resolve(&self, entity: &Entity) -> Result<Entry, StorageError> {
        if entity.storage_id() != self.id {
            return Err(StorageError::ForeignEntity { id: entity.id() });
        }
        match self.index.entry_for(entity.id()) {
            Ok(entry) if entry.recycled() == entity.recycled() => Ok(entry),
            _ => Err(StorageError::StaleEntity {
                id: entity.id(),
                recycled: entity.recycled(),
            }),
        }
    }

    pub(crate) fn components_of(&self, archetype: ArchetypeId) -> Vec<ComponentType> {
        self.archetype(archetype)
            .map(|a| a.component_types().to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn archetype_len(&self, archetype: ArchetypeId) -> usize {
        self.archetype(archetype).map_or(0, Archetype::len)
    }

    // -- Lock and deferred queue --

    /// Returns `true` while structural mutation is deferred.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Raises the lock. Idempotent.
    pub fn lock(&mut self) {
        if !self.locked {
            self.locked = true;
            self.lock_epoch += 1;
            trace!(storage = %self.config.name, epoch = self.lock_epoch, "storage locked");
        }
    }

    /// Counts how many times the lock has been raised. A cursor compares it
    /// against the value it saw at creation to detect that its lock was
    /// dropped underneath it.
    #[must_use]
    pub fn lock_epoch(&self) -> u64 {
        self.lock_epoch
    }

    /// Lowers the lock and applies every deferred operation in FIFO order.
    ///
    /// Operations whose entity was recycled since they were queued are
    /// skipped. A failing operation does not stop the drain; the first
    /// failure is returned once the queue is empty.
    ///
    /// # Errors
    ///
    /// The first error raised by a deferred operation.
    pub fn unlock(&mut self) -> Result<(), StorageError> {
        if !self.locked {
            return Ok(());
        }
        self.locked = false;
        trace!(storage = %self.config.name, pending = self.queue.len(), "storage unlocked");
        self.drain()
    }

    /// Appends an operation to the deferred queue.
    pub fn enqueue(&mut self, op: DeferredOp) {
        debug!(
            storage = %self.config.name,
            entity = op.id().get(),
            op = ?op,
            pending = self.queue.len() + 1,
            "deferred operation queued"
        );
        self.queue.push_back(op);
    }

    /// Number of operations waiting for the lock to drop.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    fn drain(&mut self) -> Result<(), StorageError> {
        let mut first_error = None;
        while let Some(op) = self.queue.pop_front() {
            if let Err(err) = self.apply(op) {
                warn!(storage = %self.config.name, error = %err, "deferred operation failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn apply(&mut self, op: DeferredOp) -> Result<(), StorageError> {
        let entry = match self.index.entry_for(op.id()) {
            Ok(entry) if entry.recycled() == op.recycled() => entry,
            _ => {
                debug!(
                    storage = %self.config.name,
                    entity = op.id().get(),
                    recycled = op.recycled(),
                    "skipping deferred operation on recycled entity"
                );
                return Ok(());
            }
        };

        match op {
            DeferredOp::AddComponent {
                component, value, ..
            } => {
                self.add_component_at(entry, component, value)?;
            }
            DeferredOp::RemoveComponent { component, .. } => {
                self.remove_component_at(entry, component)?;
            }
            DeferredOp::DestroyEntity { .. } => self.destroy_ids(&[entry.id()])?,
        }
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<(), StorageError> {
        if self.locked {
            return Err(StorageError::LockedStorage {
                storage: self.config.name.clone(),
            });
        }
        Ok(())
    }

    // -- Lifecycle --

    /// Discards every entity, archetype and queued operation.
    ///
    /// The storage takes a new [`StorageId`], so handles issued before the
    /// reset are rejected as [`StorageError::ForeignEntity`] even once their
    /// ids are handed out again.
    ///
    /// # Errors
    ///
    /// [`StorageError::LockedStorage`] while locked.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.ensure_unlocked()?;
        self.id = StorageId::next();
        self.index.reset();
        self.archetypes.clear();
        self.signatures.clear();
        self.queue.clear();
        info!(storage = %self.config.name, "storage reset");
        Ok(())
    }

    /// Inserts an entity with a known id and generation, bypassing normal
    /// allocation. Intended for restoring persisted state only.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateEntry`] if `id` is already live.
    pub fn insert_forced(
        &mut self,
        components: &[ComponentType],
        id: EntryId,
        recycled: u32,
    ) -> Result<Entity, StorageError> {
        if self.index.entry_for(id).is_ok() {
            return Err(StorageError::DuplicateEntry { id });
        }
        let archetype_id = self.new_or_existing_archetype(components);
        self.archetypes[archetype_id.as_usize()]
            .table_mut()
            .force_entry(id, recycled, &mut self.index)?;
        self.entity(id)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

//! Entity handles.
//!
//! An [`Entity`] is a cached view of one entry: its id, the generation it was
//! issued with, its last known location and component set. It does not borrow
//! the storage; every operation takes the owning [`Storage`] explicitly and
//! checks the handle against the canonical entry first.

use std::any::Any;

use engine_component::{Component, ComponentType, Entry, EntryId, TableId};

use crate::deferred::DeferredOp;
use crate::error::StorageError;
use crate::storage::{Storage, StorageId};

/// A handle to an entity in a [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    storage: StorageId,
    entry: Entry,
    components: Vec<ComponentType>,
}

impl Entity {
    pub(crate) fn new(storage: StorageId, entry: Entry, components: Vec<ComponentType>) -> Self {
        Self {
            storage,
            entry,
            components,
        }
    }

    /// The entity's id.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.entry.id()
    }

    /// The cached entry.
    #[must_use]
    pub fn entry(&self) -> Entry {
        self.entry
    }

    /// The generation this handle was issued with.
    #[must_use]
    pub fn recycled(&self) -> u32 {
        self.entry.recycled()
    }

    /// Last known row.
    #[must_use]
    pub fn index(&self) -> usize {
        self.entry.index()
    }

    /// Last known archetype.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.entry.table()
    }

    /// The storage that issued this handle.
    #[must_use]
    pub fn storage_id(&self) -> StorageId {
        self.storage
    }

    /// Last known component set, sorted by component id.
    #[must_use]
    pub fn components(&self) -> &[ComponentType] {
        &self.components
    }

    /// Returns `true` if the cached component set contains `T`.
    #[must_use]
    pub fn has<T: Component>(&self) -> bool {
        let id = T::component_type_id();
        self.components.iter().any(|ty| ty.id() == id)
    }

    /// Renders the component names, sorted, as `[A, B]`.
    #[must_use]
    pub fn components_as_string(&self) -> String {
        let mut names: Vec<&str> = self.components.iter().map(ComponentType::name).collect();
        names.sort_unstable();
        format!("[{}]", names.join(", "))
    }

    /// Returns `true` if this handle still refers to a live entity of
    /// `storage`.
    #[must_use]
    pub fn is_valid(&self, storage: &Storage) -> bool {
        storage.resolve(self).is_ok()
    }

    /// Reloads location and component set from the canonical entry.
    ///
    /// # Errors
    ///
    /// [`StorageError::StaleEntity`] / [`StorageError::ForeignEntity`].
    pub fn refresh(&mut self, storage: &Storage) -> Result<(), StorageError> {
        let entry = storage.resolve(self)?;
        self.sync(storage, entry);
        Ok(())
    }

    // -- Direct mutation --

    /// Adds `component` with its default value, migrating the entity.
    /// No-op if already present.
    ///
    /// # Errors
    ///
    /// [`StorageError::LockedStorage`] while locked, stale/foreign handles,
    /// or [`StorageError::Migration`].
    pub fn add_component(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
    ) -> Result<(), StorageError> {
        let entry = storage.add_component(self, component, None)?;
        self.sync(storage, entry);
        Ok(())
    }

    /// Adds `component` initialised with `value`.
    ///
    /// # Errors
    ///
    /// As [`Entity::add_component`], plus [`TableError::TypeMismatch`] if
    /// `value` is not the component's element type.
    ///
    /// [`TableError::TypeMismatch`]: engine_component::TableError::TypeMismatch
    pub fn add_component_with_value<V: Any + Send>(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
        value: V,
    ) -> Result<(), StorageError> {
        let entry = storage.add_component(self, component, Some(Box::new(value)))?;
        self.sync(storage, entry);
        Ok(())
    }

    /// Typed shorthand for [`Entity::add_component_with_value`].
    ///
    /// # Errors
    ///
    /// As [`Entity::add_component`].
    pub fn insert<T: Component>(
        &mut self,
        storage: &mut Storage,
        value: T,
    ) -> Result<(), StorageError> {
        self.add_component_with_value(storage, T::component_type(), value)
    }

    /// Removes `component`, migrating the entity. No-op if absent.
    ///
    /// # Errors
    ///
    /// As [`Entity::add_component`].
    pub fn remove_component(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
    ) -> Result<(), StorageError> {
        let entry = storage.remove_component(self, component)?;
        self.sync(storage, entry);
        Ok(())
    }

    // -- Lock-safe mutation --

    /// Adds `component` now if unlocked, otherwise queues it.
    ///
    /// # Errors
    ///
    /// When applied immediately, as [`Entity::add_component`]. When queued,
    /// only stale/foreign handles are reported.
    pub fn enqueue_add_component(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
    ) -> Result<(), StorageError> {
        self.enqueue_add(storage, component, None)
    }

    /// Adds `component` with `value` now if unlocked, otherwise queues it.
    /// The value's type is checked when the operation is applied.
    ///
    /// # Errors
    ///
    /// As [`Entity::enqueue_add_component`].
    pub fn enqueue_add_component_with_value<V: Any + Send>(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
        value: V,
    ) -> Result<(), StorageError> {
        self.enqueue_add(storage, component, Some(Box::new(value)))
    }

    /// Removes `component` now if unlocked, otherwise queues it.
    ///
    /// # Errors
    ///
    /// As [`Entity::enqueue_add_component`].
    pub fn enqueue_remove_component(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
    ) -> Result<(), StorageError> {
        if !storage.locked() {
            return self.remove_component(storage, component);
        }
        let entry = storage.resolve(self)?;
        storage.enqueue(DeferredOp::RemoveComponent {
            id: entry.id(),
            recycled: entry.recycled(),
            component,
        });
        Ok(())
    }

    fn enqueue_add(
        &mut self,
        storage: &mut Storage,
        component: ComponentType,
        value: Option<Box<dyn Any + Send>>,
    ) -> Result<(), StorageError> {
        if !storage.locked() {
            let entry = storage.add_component(self, component, value)?;
            self.sync(storage, entry);
            return Ok(());
        }
        let entry = storage.resolve(self)?;
        storage.enqueue(DeferredOp::AddComponent {
            id: entry.id(),
            recycled: entry.recycled(),
            component,
            value,
        });
        Ok(())
    }

    fn sync(&mut self, storage: &Storage, entry: Entry) {
        self.entry = entry;
        self.components = storage.components_of(entry.table());
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.entry.id(), self.entry.recycled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Name, Position, Velocity};

    #[test]
    fn test_components_as_string() {
        let mut storage = Storage::new();
        let mut entities = storage
            .new_entities(1, &[Velocity::component_type(), Position::component_type()])
            .unwrap();
        assert_eq!(entities[0].components_as_string(), "[Position, Velocity]");

        entities[0]
            .remove_component(&mut storage, Position::component_type())
            .unwrap();
        entities[0]
            .remove_component(&mut storage, Velocity::component_type())
            .unwrap();
        assert_eq!(entities[0].components_as_string(), "[]");
    }

    #[test]
    fn test_insert_typed_value() {
        let mut storage = Storage::new();
        let mut entities = storage.new_entities(1, &[Position::component_type()]).unwrap();
        entities[0]
            .insert(&mut storage, Name("scout".to_string()))
            .unwrap();
        assert!(entities[0].has::<Name>());
        assert_eq!(storage.get::<Name>(&entities[0]).unwrap().0, "scout");
    }

    #[test]
    fn test_refresh_after_deferred_change() {
        let mut storage = Storage::new();
        let mut entities = storage.new_entities(2, &[Position::component_type()]).unwrap();
        let mut copy = entities[0].clone();

        entities[0]
            .add_component(&mut storage, Velocity::component_type())
            .unwrap();
        assert!(!copy.has::<Velocity>());
        assert_ne!(copy.table(), entities[0].table());

        copy.refresh(&storage).unwrap();
        assert_eq!(copy, entities[0]);
    }

    #[test]
    fn test_handle_from_lookup_matches() {
        let mut storage = Storage::new();
        let entities = storage.new_entities(2, &[Position::component_type()]).unwrap();
        let looked_up = storage.entity(entities[1].id()).unwrap();
        assert_eq!(looked_up, entities[1]);
        assert!(looked_up.is_valid(&storage));
        assert_eq!(looked_up.to_string(), "Entry(2)#0");
    }

    #[test]
    fn test_is_valid_after_destroy() {
        let mut storage = Storage::new();
        let entities = storage.new_entities(2, &[Position::component_type()]).unwrap();
        storage.destroy_entities(&entities[..1]).unwrap();
        assert!(!entities[0].is_valid(&storage));
        assert!(entities[1].is_valid(&storage));
    }

    #[test]
    fn test_enqueue_on_stale_handle_fails_while_locked() {
        let mut storage = Storage::new();
        let mut entities = storage.new_entities(2, &[Position::component_type()]).unwrap();
        storage.destroy_entities(&entities[..1]).unwrap();
        storage.lock();
        let err = entities[0]
            .enqueue_add_component(&mut storage, Velocity::component_type())
            .unwrap_err();
        assert!(matches!(err, StorageError::StaleEntity { .. }));
        assert_eq!(storage.pending_operations(), 0);
    }
}

//! Columnar table storage.
//!
//! A [`Table`] stores rows in struct-of-arrays layout: one [`Column`] per
//! component type plus a parallel identifier column. All columns always have
//! the same length. Rows are removed by swapping the last row into the hole
//! and truncating; whichever entry moved has its index patched in the same
//! call.

use std::any::Any;

use crate::component::{Component, ComponentType, ComponentTypeId};
use crate::entry::{Entry, EntryId, EntryIndex, TableId};
use crate::error::TableError;

/// A type-erased column of component values.
///
/// Implemented by [`TypedColumn`]. Values only ever move between columns of
/// the same component type; any other pairing is a [`TableError::TypeMismatch`].
pub trait Column: Any + Send + Sync {
    /// The component type stored in this column.
    fn component_type(&self) -> ComponentTypeId;

    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `count` default values.
    fn push_default(&mut self, count: usize);

    /// Remove the value at `row`, moving the last value into its place.
    fn swap_remove(&mut self, row: usize);

    /// Swap-remove the value at `row` and append it to `dest`.
    fn move_row_into(&mut self, row: usize, dest: &mut dyn Column) -> Result<(), TableError>;

    /// Overwrite the value at `row` with a dynamically typed value.
    fn set_any(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<(), TableError>;

    /// Encode the value at `row` as MessagePack.
    fn encode_row(&self, row: usize) -> Result<Vec<u8>, TableError>;

    /// Overwrite the value at `row` from MessagePack bytes.
    fn decode_row(&mut self, row: usize, bytes: &[u8]) -> Result<(), TableError>;

    /// Drop every value.
    fn clear(&mut self);

    /// Reserve space for `additional` values.
    fn reserve(&mut self, additional: usize);

    /// Upcast for checked downcasting to [`TypedColumn`].
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for checked downcasting to [`TypedColumn`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A densely packed column of `T` values.
#[derive(Debug, Default)]
pub struct TypedColumn<T> {
    values: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    /// Create an empty column.
    #[must_use]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// The values in row order.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Get the value at `row`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    /// Get the value at `row` mutably.
    #[must_use]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)
    }

    fn bounds(&self, row: usize) -> Result<(), TableError> {
        if row >= self.values.len() {
            return Err(TableError::Access {
                index: row,
                upper_bound: self.values.len(),
            });
        }
        Ok(())
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn component_type(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn component_name(&self) -> &'static str {
        T::type_name()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn push_default(&mut self, count: usize) {
        self.values.extend(std::iter::repeat_with(T::default).take(count));
    }

    fn swap_remove(&mut self, row: usize) {
        self.values.swap_remove(row);
    }

    fn move_row_into(&mut self, row: usize, dest: &mut dyn Column) -> Result<(), TableError> {
        self.bounds(row)?;
        let dest = dest
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .ok_or(TableError::TypeMismatch {
                component: T::type_name(),
            })?;
        dest.values.push(self.values.swap_remove(row));
        Ok(())
    }

    fn set_any(&mut self, row: usize, value: Box<dyn Any + Send>) -> Result<(), TableError> {
        self.bounds(row)?;
        let value = value.downcast::<T>().map_err(|_| TableError::TypeMismatch {
            component: T::type_name(),
        })?;
        self.values[row] = *value;
        Ok(())
    }

    fn encode_row(&self, row: usize) -> Result<Vec<u8>, TableError> {
        self.bounds(row)?;
        Ok(rmp_serde::to_vec_named(&self.values[row])?)
    }

    fn decode_row(&mut self, row: usize, bytes: &[u8]) -> Result<(), TableError> {
        self.bounds(row)?;
        self.values[row] = rmp_serde::from_slice(bytes)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Rows of a single component signature.
///
/// `component_types` is sorted by [`ComponentTypeId`] and has no duplicates;
/// `columns[i]` stores `component_types[i]`. `entries[row]` is the id
/// occupying `row` in every column.
pub struct Table {
    id: TableId,
    component_types: Vec<ComponentType>,
    columns: Vec<Box<dyn Column>>,
    entries: Vec<EntryId>,
}

impl Table {
    /// Create an empty table with one column per distinct component type.
    #[must_use]
    pub fn new(id: TableId, component_types: &[ComponentType]) -> Self {
        let mut component_types = component_types.to_vec();
        component_types.sort_by_key(ComponentType::id);
        component_types.dedup();

        let columns = component_types.iter().map(ComponentType::new_column).collect();
        Self {
            id,
            component_types,
            columns,
            entries: Vec::new(),
        }
    }

    /// Create an empty table with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(id: TableId, component_types: &[ComponentType], capacity: usize) -> Self {
        let mut table = Self::new(id, component_types);
        table.entries.reserve(capacity);
        for column in &mut table.columns {
            column.reserve(capacity);
        }
        table
    }

    /// The table identifier.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The component types of this table, sorted by id.
    #[must_use]
    pub fn component_types(&self) -> &[ComponentType] {
        &self.component_types
    }

    /// Returns `true` if this table has a column for `type_id`.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.column_index(type_id).is_some()
    }

    /// Returns the column position for `type_id`, if present.
    #[must_use]
    pub fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.component_types
            .binary_search_by_key(&type_id, ComponentType::id)
            .ok()
    }

    /// Returns the column for `type_id`.
    #[must_use]
    pub fn column(&self, type_id: ComponentTypeId) -> Option<&dyn Column> {
        let i = self.column_index(type_id)?;
        Some(self.columns[i].as_ref())
    }

    /// Returns the column for `type_id` mutably.
    ///
    /// Column values may be rewritten freely; the row count must not change.
    #[must_use]
    pub fn column_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut dyn Column> {
        let i = self.column_index(type_id)?;
        Some(self.columns[i].as_mut())
    }

    /// Returns the typed column for `T`.
    ///
    /// # Errors
    ///
    /// [`TableError::TypeMismatch`] if the column exists but stores a
    /// different Rust type under the same component name.
    pub fn typed_column<T: Component>(&self) -> Result<Option<&TypedColumn<T>>, TableError> {
        let Some(column) = self.column(T::component_type_id()) else {
            return Ok(None);
        };
        column
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .map(Some)
            .ok_or(TableError::TypeMismatch {
                component: T::type_name(),
            })
    }

    /// Returns the typed column for `T` mutably.
    ///
    /// # Errors
    ///
    /// Same as [`Table::typed_column`].
    pub fn typed_column_mut<T: Component>(
        &mut self,
    ) -> Result<Option<&mut TypedColumn<T>>, TableError> {
        let Some(column) = self.column_mut(T::component_type_id()) else {
            return Ok(None);
        };
        column
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .map(Some)
            .ok_or(TableError::TypeMismatch {
                component: T::type_name(),
            })
    }

    /// The id occupying `row`.
    #[must_use]
    pub fn entry_id(&self, row: usize) -> Option<EntryId> {
        self.entries.get(row).copied()
    }

    /// All ids in row order.
    #[must_use]
    pub fn entry_ids(&self) -> &[EntryId] {
        &self.entries
    }

    /// Appends `n` default rows and allocates an id for each from `index`.
    ///
    /// # Errors
    ///
    /// [`TableError::BatchOperation`] if `n` is zero;
    /// [`TableError::RowLengthMismatch`] if the columns fall out of lockstep.
    pub fn new_entries(
        &mut self,
        n: usize,
        index: &mut EntryIndex,
    ) -> Result<Vec<Entry>, TableError> {
        let start = self.len();
        let entries = index.new_entries(n, start, self.id)?;
        for column in &mut self.columns {
            column.push_default(n);
        }
        self.entries.extend(entries.iter().map(Entry::id));
        self.check_row_lengths()?;
        Ok(entries)
    }

    /// Appends one default row for a known id, registering it with
    /// [`EntryIndex::force_new_entry`].
    ///
    /// # Errors
    ///
    /// Propagates index errors and [`TableError::RowLengthMismatch`].
    pub fn force_entry(
        &mut self,
        id: EntryId,
        recycled: u32,
        index: &mut EntryIndex,
    ) -> Result<usize, TableError> {
        let row = self.len();
        index.force_new_entry(id, recycled, row, self.id)?;
        for column in &mut self.columns {
            column.push_default(1);
        }
        self.entries.push(id);
        self.check_row_lengths()?;
        Ok(row)
    }

    /// Removes `row` by swap-remove and patches the index of the entry that
    /// took its place. The removed id itself is left untouched in `index`.
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] if `row` is out of bounds.
    pub fn delete_entry(&mut self, row: usize, index: &mut EntryIndex) -> Result<EntryId, TableError> {
        self.bounds(row)?;
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        let removed = self.entries.swap_remove(row);
        if let Some(&moved) = self.entries.get(row) {
            index.update_index(moved, row)?;
        }
        self.check_row_lengths()?;
        Ok(removed)
    }

    /// Moves `row` into `dest`, returning the destination row.
    ///
    /// Values of component types present in both tables are moved; values
    /// absent from `dest` are dropped; columns only `dest` has get a default.
    /// The moved entry is relocated in `index`, and the entry swapped into
    /// the vacated source row has its index patched.
    ///
    /// # Errors
    ///
    /// [`TableError::Access`] if `row` is out of bounds,
    /// [`TableError::TypeMismatch`] if two same-named columns disagree on type.
    pub fn transfer_entry(
        &mut self,
        dest: &mut Table,
        row: usize,
        index: &mut EntryIndex,
    ) -> Result<usize, TableError> {
        self.bounds(row)?;
        let id = self.entries[row];
        let dest_row = dest.len();

        for (ty, column) in self.component_types.iter().zip(self.columns.iter_mut()) {
            match dest.column_index(ty.id()) {
                Some(i) => column.move_row_into(row, dest.columns[i].as_mut())?,
                None => column.swap_remove(row),
            }
        }
        for column in &mut dest.columns {
            if column.len() == dest_row {
                column.push_default(1);
            }
        }

        dest.entries.push(id);
        self.entries.swap_remove(row);

        index.update_location(id, dest.id, dest_row)?;
        if let Some(&moved) = self.entries.get(row) {
            index.update_index(moved, row)?;
        }

        self.check_row_lengths()?;
        dest.check_row_lengths()?;
        Ok(dest_row)
    }

    /// Drops every row. The caller is responsible for the index.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.entries.clear();
    }

    fn bounds(&self, row: usize) -> Result<(), TableError> {
        if row >= self.entries.len() {
            return Err(TableError::Access {
                index: row,
                upper_bound: self.entries.len(),
            });
        }
        Ok(())
    }

    fn check_row_lengths(&self) -> Result<(), TableError> {
        let expected = self.entries.len();
        for column in &self.columns {
            if column.len() != expected {
                return Err(TableError::RowLengthMismatch {
                    component: column.component_type(),
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("component_types", &self.component_types)
            .field("rows", &self.entries.len())
            .finish()
    }
}

//! Archetypes: a table tagged with its component signature.
//!
//! Entities sharing the same set of components live in the same archetype.
//! A storage holds at most one archetype per signature.

use std::collections::BTreeSet;

use engine_component::{ComponentType, ComponentTypeId, Table, TableId};

/// Identifies an archetype within its storage. Equal to its table's id.
pub type ArchetypeId = TableId;

/// Computes the order-independent signature of a component set.
#[must_use]
pub fn signature_of(components: &[ComponentType]) -> BTreeSet<ComponentTypeId> {
    components.iter().map(ComponentType::id).collect()
}

/// A component signature and the table holding its rows.
#[derive(Debug)]
pub struct Archetype {
    signature: BTreeSet<ComponentTypeId>,
    table: Table,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, components: &[ComponentType], row_capacity: usize) -> Self {
        Self {
            signature: signature_of(components),
            table: Table::with_capacity(id, components, row_capacity),
        }
    }

    /// The archetype identifier.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.table.id()
    }

    /// The set of component types defining this archetype.
    #[must_use]
    pub fn signature(&self) -> &BTreeSet<ComponentTypeId> {
        &self.signature
    }

    /// Component descriptors, sorted by id.
    #[must_use]
    pub fn component_types(&self) -> &[ComponentType] {
        self.table.component_types()
    }

    /// Returns `true` if this archetype contains the given component type.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.signature.contains(&type_id)
    }

    /// The backing table.
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the archetype holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::Component;

    use super::*;
    use crate::testing::{Position, Velocity};

    #[test]
    fn test_signature_order_independent() {
        let a = signature_of(&[Position::component_type(), Velocity::component_type()]);
        let b = signature_of(&[Velocity::component_type(), Position::component_type()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_archetype_creation() {
        let archetype = Archetype::new(
            TableId(2),
            &[Velocity::component_type(), Position::component_type()],
            16,
        );
        assert_eq!(archetype.id(), TableId(2));
        assert!(archetype.contains(Position::component_type_id()));
        assert!(archetype.is_empty());
        assert_eq!(archetype.component_types().len(), 2);
        assert_eq!(archetype.table().component_types().len(), 2);
    }
}

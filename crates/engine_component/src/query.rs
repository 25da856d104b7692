//! Declarative archetype queries.
//!
//! A [`Query`] selects archetypes by signature, never individual rows. A
//! signature matches when it contains every included component type and none
//! of the excluded ones:
//!
//! ```text
//! signature ⊇ included  AND  signature ∩ excluded = ∅
//! ```

use std::collections::BTreeSet;

use crate::component::{Component, ComponentTypeId};

/// A filter that narrows the set of archetypes matched by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFilter {
    /// Only match archetypes that have this component.
    With(ComponentTypeId),
    /// Only match archetypes that do NOT have this component.
    Without(ComponentTypeId),
}

/// An immutable AND/NOT predicate over component signatures.
///
/// Built with the consuming builder methods; the empty query matches every
/// archetype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    included: BTreeSet<ComponentTypeId>,
    excluded: BTreeSet<ComponentTypeId>,
}

impl Query {
    /// Create a query that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.filter(QueryFilter::With(T::component_type_id()))
    }

    /// Exclude component `T`.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.filter(QueryFilter::Without(T::component_type_id()))
    }

    /// Add a filter.
    #[must_use]
    pub fn filter(mut self, f: QueryFilter) -> Self {
        match f {
            QueryFilter::With(id) => self.included.insert(id),
            QueryFilter::Without(id) => self.excluded.insert(id),
        };
        self
    }

    /// Conjunction of two queries: both sets of requirements must hold.
    #[must_use]
    pub fn and(mut self, other: Query) -> Self {
        self.included.extend(other.included);
        self.excluded.extend(other.excluded);
        self
    }

    /// Component types an archetype must have.
    #[must_use]
    pub fn included(&self) -> &BTreeSet<ComponentTypeId> {
        &self.included
    }

    /// Component types an archetype must not have.
    #[must_use]
    pub fn excluded(&self) -> &BTreeSet<ComponentTypeId> {
        &self.excluded
    }

    /// Returns `true` if `signature` satisfies this query.
    #[must_use]
    pub fn matches(&self, signature: &BTreeSet<ComponentTypeId>) -> bool {
        self.included.is_subset(signature) && self.excluded.is_disjoint(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION: ComponentTypeId = ComponentTypeId(1);
    const VELOCITY: ComponentTypeId = ComponentTypeId(2);
    const FROZEN: ComponentTypeId = ComponentTypeId(3);

    fn signature(ids: &[ComponentTypeId]) -> BTreeSet<ComponentTypeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let q = Query::new();
        assert!(q.matches(&signature(&[])));
        assert!(q.matches(&signature(&[POSITION, VELOCITY])));
    }

    #[test]
    fn test_inclusion_requires_superset() {
        let q = Query::new()
            .filter(QueryFilter::With(POSITION))
            .filter(QueryFilter::With(VELOCITY));
        assert!(q.matches(&signature(&[POSITION, VELOCITY])));
        assert!(q.matches(&signature(&[POSITION, VELOCITY, FROZEN])));
        assert!(!q.matches(&signature(&[POSITION])));
    }

    #[test]
    fn test_exclusion_requires_disjoint() {
        let q = Query::new()
            .filter(QueryFilter::With(POSITION))
            .filter(QueryFilter::Without(VELOCITY));
        assert!(q.matches(&signature(&[POSITION])));
        assert!(q.matches(&signature(&[POSITION, FROZEN])));
        assert!(!q.matches(&signature(&[POSITION, VELOCITY])));
    }

    #[test]
    fn test_contradictory_query_matches_nothing() {
        let q = Query::new()
            .filter(QueryFilter::With(POSITION))
            .filter(QueryFilter::Without(POSITION));
        assert!(!q.matches(&signature(&[POSITION])));
        assert!(!q.matches(&signature(&[])));
    }

    #[test]
    fn test_and_merges_requirements() {
        let moving = Query::new().filter(QueryFilter::With(VELOCITY));
        let thawed = Query::new().filter(QueryFilter::Without(FROZEN));
        let q = moving.and(thawed);
        assert_eq!(q.included(), &signature(&[VELOCITY]));
        assert_eq!(q.excluded(), &signature(&[FROZEN]));
        assert!(q.matches(&signature(&[POSITION, VELOCITY])));
        assert!(!q.matches(&signature(&[VELOCITY, FROZEN])));
    }

    #[test]
    fn test_matches_agrees_with_set_definition() {
        let universe = [POSITION, VELOCITY, FROZEN];
        // Every subset of the universe as an archetype, every (include, exclude)
        // pair of subsets as a query.
        let subsets: Vec<BTreeSet<ComponentTypeId>> = (0u8..8)
            .map(|mask| {
                universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, id)| *id)
                    .collect()
            })
            .collect();

        for archetype in &subsets {
            for included in &subsets {
                for excluded in &subsets {
                    let q = included
                        .iter()
                        .map(|&id| QueryFilter::With(id))
                        .chain(excluded.iter().map(|&id| QueryFilter::Without(id)))
                        .fold(Query::new(), Query::filter);
                    let expected = included.iter().all(|id| archetype.contains(id))
                        && excluded.iter().all(|id| !archetype.contains(id));
                    assert_eq!(q.matches(archetype), expected);
                }
            }
        }
    }
}

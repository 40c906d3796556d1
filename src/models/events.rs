//! Change set delivered to commit handlers.
//!
//! A [`TransactionData`] describes what a transaction did relative to the
//! state committed before it began. Every property entry carries the value
//! committed before the transaction, so handlers can reconstruct the
//! pre-transaction image of any entity.

use super::graph::{NodeId, PropertyValue, RelationshipId};
use super::version::is_internal_key;
use std::collections::BTreeSet;

/// One property assignment or removal.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry<Id> {
    /// The entity whose property changed.
    pub entity: Id,
    /// The property key.
    pub key: String,
    /// Value committed before the transaction, `None` if the key was absent.
    pub previous: Option<PropertyValue>,
    /// Value after the transaction, `None` for removals.
    pub value: Option<PropertyValue>,
}

impl<Id> PropertyEntry<Id> {
    /// Returns true if the key belongs to the versioning layer.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        is_internal_key(&self.key)
    }
}

/// Everything a transaction changed, relative to the last committed state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionData {
    /// Nodes created by the transaction and still present at commit.
    pub created_nodes: BTreeSet<NodeId>,
    /// Previously committed nodes physically removed by the transaction.
    pub deleted_nodes: BTreeSet<NodeId>,
    /// Relationships created by the transaction and still present at commit.
    pub created_relationships: BTreeSet<RelationshipId>,
    /// Previously committed relationships physically removed by the transaction.
    pub deleted_relationships: BTreeSet<RelationshipId>,
    /// Node properties whose value differs from the committed one.
    pub assigned_node_properties: Vec<PropertyEntry<NodeId>>,
    /// Node properties that were committed and are now absent.
    pub removed_node_properties: Vec<PropertyEntry<NodeId>>,
    /// Relationship properties whose value differs from the committed one.
    pub assigned_relationship_properties: Vec<PropertyEntry<RelationshipId>>,
    /// Relationship properties that were committed and are now absent.
    pub removed_relationship_properties: Vec<PropertyEntry<RelationshipId>>,
}

impl TransactionData {
    /// Returns true if the transaction changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.deleted_relationships.is_empty()
            && self.assigned_node_properties.is_empty()
            && self.removed_node_properties.is_empty()
            && self.assigned_relationship_properties.is_empty()
            && self.removed_relationship_properties.is_empty()
    }

    /// Nodes whose `key` was assigned by the transaction.
    pub fn nodes_assigned(&self, key: &str) -> impl Iterator<Item = NodeId> {
        self.assigned_node_properties
            .iter()
            .filter(move |entry| entry.key == key)
            .map(|entry| entry.entity)
    }

    /// Relationships whose `key` was assigned by the transaction.
    pub fn relationships_assigned(&self, key: &str) -> impl Iterator<Item = RelationshipId> {
        self.assigned_relationship_properties
            .iter()
            .filter(move |entry| entry.key == key)
            .map(|entry| entry.entity)
    }

    /// Node property assignments and removals on ordinary keys.
    pub fn node_property_changes(&self) -> impl Iterator<Item = &PropertyEntry<NodeId>> {
        self.assigned_node_properties
            .iter()
            .chain(&self.removed_node_properties)
            .filter(|entry| !entry.is_internal())
    }

    /// Nodes with at least one ordinary property assigned or removed.
    #[must_use]
    pub fn nodes_with_property_changes(&self) -> BTreeSet<NodeId> {
        self.node_property_changes()
            .map(|entry| entry.entity)
            .collect()
    }
}

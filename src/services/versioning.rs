//! Commit-time version stamping and chain rotation.
//!
//! [`VersioningHandler`] runs inside every committing transaction. It
//! allocates the transaction's version `v` and then:
//!
//! 1. stamps created nodes and relationships with `[v, ∞)`
//! 2. closes delete-marked relationships to `[from, v - 1]`
//! 3. closes delete-marked nodes to `[from, v - 1]`
//! 4. rotates the pre-transaction image of every other changed node into a
//!    new snapshot at the head of its chain
//!
//! All writes join the committing transaction, so an aborted commit leaves
//! no trace of them.

use crate::models::version::{DELETED, VALID_FROM, VALID_TO, is_internal_key};
use crate::models::{
    Direction, EntityRef, NodeId, PropertyEntry, Range, RelationshipId, RelationshipType,
    TransactionData, Version,
};
use crate::services::counter::VersionCounter;
use crate::services::resolution::{read_bound, write_bound};
use crate::storage::{GraphWrite, TransactionEventHandler};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Commit handler maintaining validity stamps and history chains.
pub struct VersioningHandler {
    counter: Arc<dyn VersionCounter>,
    reference: NodeId,
}

impl fmt::Debug for VersioningHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersioningHandler")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl VersioningHandler {
    /// Creates a handler allocating versions from `counter`.
    ///
    /// `reference` is the store's metadata node, which is never versioned.
    #[must_use]
    pub fn new(counter: Arc<dyn VersionCounter>, reference: NodeId) -> Self {
        Self { counter, reference }
    }

    /// Removes entities that were created and delete-marked in the same
    /// transaction. They were never valid at any committed version.
    fn discard_stillborn(
        data: &TransactionData,
        tx: &mut dyn GraphWrite,
    ) -> Result<(BTreeSet<NodeId>, BTreeSet<RelationshipId>)> {
        let nodes: BTreeSet<NodeId> = data
            .nodes_assigned(DELETED)
            .filter(|node| data.created_nodes.contains(node))
            .collect();
        let mut relationships: BTreeSet<RelationshipId> = data
            .relationships_assigned(DELETED)
            .filter(|rel| data.created_relationships.contains(rel))
            .collect();

        for node in &nodes {
            relationships.extend(tx.relationships(*node, Direction::Both, None)?);
        }
        for rel in &relationships {
            if tx.relationship_exists(*rel) {
                tx.delete_relationship(*rel)?;
            }
        }
        for node in &nodes {
            tx.delete_node(*node)?;
        }

        if !nodes.is_empty() || !relationships.is_empty() {
            debug!(
                nodes = nodes.len(),
                relationships = relationships.len(),
                "discarded entities created and deleted in one transaction"
            );
        }
        Ok((nodes, relationships))
    }

    /// Closes an entity's validity at `v - 1`.
    ///
    /// Returns false if the validity was already closed.
    fn close(tx: &mut dyn GraphWrite, entity: EntityRef, version: Version) -> Result<bool> {
        if let Some(to) = read_bound(&*tx, entity, VALID_TO)? {
            if to != Range::OPEN_END {
                warn!(%entity, to, "delete marker on an already deleted entity ignored");
                return Ok(false);
            }
        }
        write_bound(tx, entity, VALID_TO, version.previous().value())?;
        Ok(true)
    }

    /// Copies the pre-transaction image of `node` into a new snapshot and
    /// splices it in at the head of the chain.
    fn rotate(
        tx: &mut dyn GraphWrite,
        node: NodeId,
        changes: &[&PropertyEntry<NodeId>],
        version: Version,
    ) -> Result<NodeId> {
        let snapshot = tx.create_node();

        for key in tx.property_keys(node.into())? {
            if is_internal_key(&key) {
                continue;
            }
            if let Some(value) = tx.property(node.into(), &key)? {
                tx.set_property(snapshot.into(), &key, value)?;
            }
        }
        for change in changes {
            match &change.previous {
                Some(previous) => tx.set_property(snapshot.into(), &change.key, previous.clone())?,
                None => {
                    tx.remove_property(snapshot.into(), &change.key)?;
                },
            }
        }

        let link = RelationshipType::prev_version();
        for old_link in tx.relationships(node, Direction::Outgoing, Some(&link))? {
            let predecessor = tx.relationship(old_link)?.end;
            tx.delete_relationship(old_link)?;
            tx.create_relationship(snapshot, predecessor, link.clone())?;
        }
        tx.create_relationship(node, snapshot, link)?;

        if let Some(from) = read_bound(&*tx, node.into(), VALID_FROM)? {
            write_bound(tx, snapshot.into(), VALID_FROM, from)?;
        }
        write_bound(tx, snapshot.into(), VALID_TO, version.previous().value())?;
        write_bound(tx, node.into(), VALID_FROM, version.value())?;

        Ok(snapshot)
    }
}

impl TransactionEventHandler for VersioningHandler {
    #[instrument(
        skip_all,
        fields(
            created_nodes = data.created_nodes.len(),
            created_relationships = data.created_relationships.len(),
            version = tracing::field::Empty
        )
    )]
    fn before_commit(&self, data: &TransactionData, tx: &mut dyn GraphWrite) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let version = self.counter.allocate(tx)?;
        tracing::Span::current().record("version", version.value());
        metrics::counter!("chronograph_versions_allocated_total").increment(1);

        let (stillborn_nodes, stillborn_rels) = Self::discard_stillborn(data, tx)?;
        let live = Range::open(version.value());

        for node in data.created_nodes.difference(&stillborn_nodes) {
            write_bound(tx, (*node).into(), VALID_FROM, live.from())?;
            write_bound(tx, (*node).into(), VALID_TO, live.to())?;
        }
        for rel in data.created_relationships.difference(&stillborn_rels) {
            if !tx.relationship_exists(*rel) {
                continue;
            }
            write_bound(tx, (*rel).into(), VALID_FROM, live.from())?;
            write_bound(tx, (*rel).into(), VALID_TO, live.to())?;
        }
        debug!(%version, "stamped created entities");

        let deleted_rels: BTreeSet<RelationshipId> = data
            .relationships_assigned(DELETED)
            .filter(|rel| !data.created_relationships.contains(rel))
            .collect();
        for rel in deleted_rels {
            if tx.relationship_exists(rel) && Self::close(tx, rel.into(), version)? {
                metrics::counter!("chronograph_deletions_total", "kind" => "relationship")
                    .increment(1);
                debug!(%rel, %version, "closed relationship validity");
            }
        }

        let mut changes: BTreeMap<NodeId, Vec<&PropertyEntry<NodeId>>> = BTreeMap::new();
        for change in data.node_property_changes() {
            changes.entry(change.entity).or_default().push(change);
        }

        let deleted_nodes: BTreeSet<NodeId> = data
            .nodes_assigned(DELETED)
            .filter(|node| !data.created_nodes.contains(node) && *node != self.reference)
            .collect();
        for node in &deleted_nodes {
            if !tx.node_exists(*node) {
                continue;
            }
            // the post-transaction image of a node deleted now is never valid
            for change in changes.get(node).into_iter().flatten() {
                match &change.previous {
                    Some(previous) => tx.set_property((*node).into(), &change.key, previous.clone())?,
                    None => {
                        tx.remove_property((*node).into(), &change.key)?;
                    },
                }
            }
            if Self::close(tx, (*node).into(), version)? {
                metrics::counter!("chronograph_deletions_total", "kind" => "node").increment(1);
                debug!(%node, %version, "closed node validity");
            }
        }

        for (node, node_changes) in &changes {
            if data.created_nodes.contains(node)
                || deleted_nodes.contains(node)
                || *node == self.reference
                || !tx.node_exists(*node)
            {
                continue;
            }
            if let Some(to) = read_bound(&*tx, (*node).into(), VALID_TO)? {
                if to != Range::OPEN_END {
                    return Err(Error::DeletedEntity {
                        entity: (*node).into(),
                    });
                }
            }
            let snapshot = Self::rotate(tx, *node, node_changes, version)?;
            metrics::counter!("chronograph_rotations_total").increment(1);
            debug!(%node, %snapshot, %version, "rotated node into history chain");
        }

        info!(%version, "version stamped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;
    use crate::services::counter::StoreVersionCounter;
    use crate::services::resolution::{history, resolve_holder, validity};
    use crate::storage::graph::REFERENCE_NODE;
    use crate::storage::{GraphRead, GraphStore, GraphTransaction, InMemoryGraphStore};

    fn store() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        let counter = Arc::new(StoreVersionCounter::new(store.reference_node()));
        store
            .register_handler(Arc::new(VersioningHandler::new(counter, REFERENCE_NODE)))
            .unwrap();
        store
    }

    fn set(store: &InMemoryGraphStore, node: NodeId, key: &str, value: &str) {
        let mut tx = store.begin_tx().unwrap();
        tx.set_property(node.into(), key, PropertyValue::from(value))
            .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_created_entities_are_stamped_open() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let a = tx.create_node();
        let b = tx.create_node();
        let rel = tx
            .create_relationship(a, b, RelationshipType::new("KNOWS"))
            .unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(validity(&snapshot, a.into()).unwrap(), Range::open(1));
        assert_eq!(validity(&snapshot, rel.into()).unwrap(), Range::open(1));
        assert!(history(&snapshot, a).unwrap().len() == 1);
    }

    #[test]
    fn test_change_rotates_previous_image() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let node = tx.create_node();
        tx.set_property(node.into(), "key", PropertyValue::from("foo"))
            .unwrap();
        tx.commit().unwrap();

        set(&store, node, "key", "bar");
        set(&store, node, "key", "zoo");

        let snapshot = store.snapshot().unwrap();
        let chain = history(&snapshot, node).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].validity, Range::open(3));
        assert_eq!(chain[1].validity, Range::point(2));
        assert_eq!(chain[1].properties["key"], PropertyValue::from("bar"));
        assert_eq!(chain[2].validity, Range::point(1));
        assert_eq!(chain[2].properties["key"], PropertyValue::from("foo"));

        let holder = resolve_holder(&snapshot, node, Version::new(1)).unwrap();
        assert_eq!(holder, chain[2].holder);
    }

    #[test]
    fn test_internal_changes_do_not_rotate() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let node = tx.create_node();
        tx.commit().unwrap();

        let mut tx = store.begin_tx().unwrap();
        tx.set_property(node.into(), VALID_FROM, PropertyValue::Int(1))
            .unwrap();
        tx.set_property(REFERENCE_NODE.into(), "label", PropertyValue::from("meta"))
            .unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(history(&snapshot, node).unwrap().len(), 1);
        assert!(snapshot.property_keys(REFERENCE_NODE.into()).unwrap().len() == 2);
    }

    #[test]
    fn test_delete_marker_closes_validity() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let node = tx.create_node();
        tx.commit().unwrap();

        let mut tx = store.begin_tx().unwrap();
        tx.set_property(node.into(), DELETED, PropertyValue::Int(1))
            .unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(validity(&snapshot, node.into()).unwrap(), Range::point(1));
    }

    #[test]
    fn test_changing_deleted_node_aborts_commit() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let node = tx.create_node();
        tx.commit().unwrap();

        let mut tx = store.begin_tx().unwrap();
        tx.set_property(node.into(), DELETED, PropertyValue::Int(1))
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_tx().unwrap();
        tx.set_property(node.into(), "name", PropertyValue::from("ghost"))
            .unwrap();
        let result = tx.commit();
        assert!(matches!(result, Err(Error::DeletedEntity { .. })));

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.property(node.into(), "name").unwrap(), None);
    }

    #[test]
    fn test_stillborn_node_is_removed() {
        let store = store();
        let mut tx = store.begin_tx().unwrap();
        let keep = tx.create_node();
        let gone = tx.create_node();
        tx.create_relationship(keep, gone, RelationshipType::new("KNOWS"))
            .unwrap();
        tx.set_property(gone.into(), DELETED, PropertyValue::Int(0))
            .unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.node_exists(keep));
        assert!(!snapshot.node_exists(gone));
        assert!(
            snapshot
                .relationships(keep, Direction::Both, None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_empty_transaction_allocates_nothing() {
        let store = store();
        let tx = store.begin_tx().unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        let counter = StoreVersionCounter::new(REFERENCE_NODE);
        assert_eq!(counter.latest(&snapshot).unwrap(), Version::ZERO);
    }
}

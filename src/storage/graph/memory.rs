//! In-memory graph store.
//!
//! Provides a fast, non-persistent implementation of [`GraphStore`]. The
//! committed state is an immutable [`GraphState`] behind an `Arc`; readers
//! clone the `Arc` and never block writers for longer than that clone.
//! A transaction holds the writer mutex for its whole lifetime, works on a
//! private copy of the committed state, and publishes it by swapping the
//! `Arc` on commit.

// Allow significant_drop_tightening - the writer guard must live as long as
// the transaction.
#![allow(clippy::significant_drop_tightening)]

use crate::models::{
    Direction, EntityRef, NodeId, PropertyEntry, PropertyValue, Relationship, RelationshipId,
    RelationshipType, TransactionData,
};
use crate::storage::traits::graph::{
    GraphRead, GraphStore, GraphTransaction, GraphWrite, TransactionEventHandler,
};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

type Properties = BTreeMap<String, PropertyValue>;

/// Id of the node every store is created with.
pub const REFERENCE_NODE: NodeId = NodeId::new(0);

fn lock_poisoned(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "Lock poisoned".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    properties: Properties,
    outgoing: BTreeSet<RelationshipId>,
    incoming: BTreeSet<RelationshipId>,
}

#[derive(Debug, Clone)]
struct RelationshipRecord {
    relationship: Relationship,
    properties: Properties,
}

/// A complete graph image.
///
/// Records are shared between states through `Arc` and copied only when a
/// transaction writes to them.
#[derive(Debug, Clone)]
pub struct GraphState {
    nodes: BTreeMap<NodeId, Arc<NodeRecord>>,
    relationships: BTreeMap<RelationshipId, Arc<RelationshipRecord>>,
    next_node: u64,
    next_relationship: u64,
}

impl Default for GraphState {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphState {
    /// Creates a state holding only the reference node.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(REFERENCE_NODE, Arc::new(NodeRecord::default()));
        Self {
            nodes,
            relationships: BTreeMap::new(),
            next_node: REFERENCE_NODE.value() + 1,
            next_relationship: 0,
        }
    }

    /// Returns the number of nodes, the reference node included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    fn entity_exists(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Node(node) => self.node_exists(node),
            EntityRef::Relationship(rel) => self.relationship_exists(rel),
        }
    }

    fn node(&self, node: NodeId) -> Result<&NodeRecord> {
        self.nodes
            .get(&node)
            .map(AsRef::as_ref)
            .ok_or(Error::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(&node)
            .map(Arc::make_mut)
            .ok_or(Error::NodeNotFound(node))
    }

    fn record(&self, rel: RelationshipId) -> Result<&RelationshipRecord> {
        self.relationships
            .get(&rel)
            .map(AsRef::as_ref)
            .ok_or(Error::RelationshipNotFound(rel))
    }

    fn properties(&self, entity: EntityRef) -> Result<&Properties> {
        match entity {
            EntityRef::Node(node) => self.node(node).map(|n| &n.properties),
            EntityRef::Relationship(rel) => self.record(rel).map(|r| &r.properties),
        }
    }

    fn properties_mut(&mut self, entity: EntityRef) -> Result<&mut Properties> {
        match entity {
            EntityRef::Node(node) => self.node_mut(node).map(|n| &mut n.properties),
            EntityRef::Relationship(rel) => self
                .relationships
                .get_mut(&rel)
                .map(|r| &mut Arc::make_mut(r).properties)
                .ok_or(Error::RelationshipNotFound(rel)),
        }
    }

    /// Reads a property without distinguishing a missing entity from a
    /// missing key.
    fn stored_property(&self, entity: EntityRef, key: &str) -> Option<PropertyValue> {
        self.properties(entity)
            .ok()
            .and_then(|properties| properties.get(key).cloned())
    }
}

impl GraphRead for GraphState {
    fn node_exists(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn relationship_exists(&self, relationship: RelationshipId) -> bool {
        self.relationships.contains_key(&relationship)
    }

    fn relationship(&self, relationship: RelationshipId) -> Result<Relationship> {
        self.record(relationship).map(|r| r.relationship.clone())
    }

    fn property(&self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self.properties(entity)?.get(key).cloned())
    }

    fn property_keys(&self, entity: EntityRef) -> Result<Vec<String>> {
        Ok(self.properties(entity)?.keys().cloned().collect())
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&RelationshipType>,
    ) -> Result<Vec<RelationshipId>> {
        let record = self.node(node)?;
        let candidates: BTreeSet<RelationshipId> = match direction {
            Direction::Outgoing => record.outgoing.clone(),
            Direction::Incoming => record.incoming.clone(),
            Direction::Both => record.outgoing.union(&record.incoming).copied().collect(),
        };

        Ok(candidates
            .into_iter()
            .filter(|id| {
                rel_type.is_none_or(|wanted| {
                    self.relationships
                        .get(id)
                        .is_some_and(|r| &r.relationship.rel_type == wanted)
                })
            })
            .collect())
    }
}

impl GraphWrite for GraphState {
    fn create_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Arc::new(NodeRecord::default()));
        id
    }

    fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: RelationshipType,
    ) -> Result<RelationshipId> {
        self.node(start)?;
        self.node(end)?;

        let id = RelationshipId::new(self.next_relationship);
        self.next_relationship += 1;
        self.relationships.insert(
            id,
            Arc::new(RelationshipRecord {
                relationship: Relationship {
                    id,
                    start,
                    end,
                    rel_type,
                },
                properties: Properties::new(),
            }),
        );
        self.node_mut(start)?.outgoing.insert(id);
        self.node_mut(end)?.incoming.insert(id);
        Ok(id)
    }

    fn set_property(&mut self, entity: EntityRef, key: &str, value: PropertyValue) -> Result<()> {
        self.properties_mut(entity)?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_property(&mut self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self.properties_mut(entity)?.remove(key))
    }

    fn delete_relationship(&mut self, relationship: RelationshipId) -> Result<()> {
        let record = self
            .relationships
            .remove(&relationship)
            .ok_or(Error::RelationshipNotFound(relationship))?;
        let Relationship { start, end, .. } = record.relationship;

        if let Some(node) = self.nodes.get_mut(&start) {
            Arc::make_mut(node).outgoing.remove(&relationship);
        }
        if let Some(node) = self.nodes.get_mut(&end) {
            Arc::make_mut(node).incoming.remove(&relationship);
        }
        Ok(())
    }

    fn delete_node(&mut self, node: NodeId) -> Result<()> {
        if node == REFERENCE_NODE {
            return Err(Error::InvalidInput(
                "the reference node cannot be deleted".to_string(),
            ));
        }
        let record = self.node(node)?;
        if !record.outgoing.is_empty() || !record.incoming.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{node} still has relationships"
            )));
        }
        self.nodes.remove(&node);
        Ok(())
    }
}

/// What a transaction touched, in terms of ids and keys.
#[derive(Debug, Default)]
struct WriteLog {
    created_nodes: BTreeSet<NodeId>,
    deleted_nodes: BTreeSet<NodeId>,
    created_relationships: BTreeSet<RelationshipId>,
    deleted_relationships: BTreeSet<RelationshipId>,
    touched: BTreeSet<(EntityRef, String)>,
}

/// An open transaction on an [`InMemoryGraphStore`].
///
/// Holds the store's writer lock until it is committed, rolled back or
/// dropped. Dropping an unfinished transaction rolls it back. Opening a second
/// transaction on the same thread while this one is alive blocks forever.
pub struct MemoryTransaction<'a> {
    store: &'a InMemoryGraphStore,
    base: Arc<GraphState>,
    working: GraphState,
    log: WriteLog,
    finished: bool,
    _writer: MutexGuard<'a, ()>,
}

impl MemoryTransaction<'_> {
    /// Builds the change set by comparing every touched key with the
    /// committed state.
    fn transaction_data(&self) -> TransactionData {
        let base = &self.base;
        let working = &self.working;
        let mut data = TransactionData {
            created_nodes: self
                .log
                .created_nodes
                .iter()
                .copied()
                .filter(|node| working.node_exists(*node))
                .collect(),
            deleted_nodes: self
                .log
                .deleted_nodes
                .iter()
                .copied()
                .filter(|node| base.node_exists(*node))
                .collect(),
            created_relationships: self
                .log
                .created_relationships
                .iter()
                .copied()
                .filter(|rel| working.relationship_exists(*rel))
                .collect(),
            deleted_relationships: self
                .log
                .deleted_relationships
                .iter()
                .copied()
                .filter(|rel| base.relationship_exists(*rel))
                .collect(),
            ..TransactionData::default()
        };

        for (entity, key) in &self.log.touched {
            if !working.entity_exists(*entity) {
                continue;
            }
            let previous = base.stored_property(*entity, key);
            let value = working.stored_property(*entity, key);
            let unchanged = match (&previous, &value) {
                (Some(previous), Some(value)) => previous.is_identical(value),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                continue;
            }
            let removed = value.is_none();
            match *entity {
                EntityRef::Node(node) => {
                    let entry = property_entry(node, key, previous, value);
                    if removed {
                        data.removed_node_properties.push(entry);
                    } else {
                        data.assigned_node_properties.push(entry);
                    }
                },
                EntityRef::Relationship(rel) => {
                    let entry = property_entry(rel, key, previous, value);
                    if removed {
                        data.removed_relationship_properties.push(entry);
                    } else {
                        data.assigned_relationship_properties.push(entry);
                    }
                },
            }
        }

        data
    }
}

fn property_entry<Id>(
    entity: Id,
    key: &str,
    previous: Option<PropertyValue>,
    value: Option<PropertyValue>,
) -> PropertyEntry<Id> {
    PropertyEntry {
        entity,
        key: key.to_string(),
        previous,
        value,
    }
}

impl fmt::Debug for MemoryTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("log", &self.log)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl GraphRead for MemoryTransaction<'_> {
    fn node_exists(&self, node: NodeId) -> bool {
        self.working.node_exists(node)
    }

    fn relationship_exists(&self, relationship: RelationshipId) -> bool {
        self.working.relationship_exists(relationship)
    }

    fn relationship(&self, relationship: RelationshipId) -> Result<Relationship> {
        self.working.relationship(relationship)
    }

    fn property(&self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>> {
        self.working.property(entity, key)
    }

    fn property_keys(&self, entity: EntityRef) -> Result<Vec<String>> {
        self.working.property_keys(entity)
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&RelationshipType>,
    ) -> Result<Vec<RelationshipId>> {
        self.working.relationships(node, direction, rel_type)
    }
}

impl GraphWrite for MemoryTransaction<'_> {
    fn create_node(&mut self) -> NodeId {
        let node = self.working.create_node();
        self.log.created_nodes.insert(node);
        node
    }

    fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: RelationshipType,
    ) -> Result<RelationshipId> {
        let rel = self.working.create_relationship(start, end, rel_type)?;
        self.log.created_relationships.insert(rel);
        Ok(rel)
    }

    fn set_property(&mut self, entity: EntityRef, key: &str, value: PropertyValue) -> Result<()> {
        self.working.set_property(entity, key, value)?;
        self.log.touched.insert((entity, key.to_string()));
        Ok(())
    }

    fn remove_property(&mut self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>> {
        let previous = self.working.remove_property(entity, key)?;
        self.log.touched.insert((entity, key.to_string()));
        Ok(previous)
    }

    fn delete_relationship(&mut self, relationship: RelationshipId) -> Result<()> {
        self.working.delete_relationship(relationship)?;
        self.log.deleted_relationships.insert(relationship);
        Ok(())
    }

    fn delete_node(&mut self, node: NodeId) -> Result<()> {
        self.working.delete_node(node)?;
        self.log.deleted_nodes.insert(node);
        Ok(())
    }
}

impl GraphTransaction for MemoryTransaction<'_> {
    fn commit(mut self) -> Result<()> {
        self.finished = true;
        let data = self.transaction_data();
        let handlers = self.store.handlers()?;
        let mut working = std::mem::take(&mut self.working);

        for handler in &handlers {
            if let Err(err) = handler.before_commit(&data, &mut working) {
                debug!(error = %err, "commit aborted by handler");
                for handler in &handlers {
                    handler.after_rollback();
                }
                return Err(err);
            }
        }

        self.store.publish(working)?;
        debug!(
            created_nodes = data.created_nodes.len(),
            created_relationships = data.created_relationships.len(),
            node_changes = data.assigned_node_properties.len() + data.removed_node_properties.len(),
            "transaction committed"
        );

        for handler in &handlers {
            handler.after_commit(&data);
        }
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.store.notify_rollback();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.notify_rollback();
        }
    }
}

/// In-memory, non-persistent graph store.
///
/// Uses `RwLock` for the committed state and a `Mutex` to admit one writer
/// at a time. Data is not persisted between runs.
///
/// # Example
///
/// ```rust
/// use chronograph::models::PropertyValue;
/// use chronograph::storage::{GraphRead, GraphStore, GraphTransaction, GraphWrite, InMemoryGraphStore};
///
/// # fn main() -> chronograph::Result<()> {
/// let store = InMemoryGraphStore::new();
/// let mut tx = store.begin_tx()?;
/// let node = tx.create_node();
/// tx.set_property(node.into(), "name", PropertyValue::from("a"))?;
/// tx.commit()?;
///
/// assert_eq!(store.snapshot()?.property(node.into(), "name")?, Some(PropertyValue::from("a")));
/// # Ok(())
/// # }
/// ```
pub struct InMemoryGraphStore {
    state: RwLock<Arc<GraphState>>,
    writer: Mutex<()>,
    handlers: RwLock<Vec<Arc<dyn TransactionEventHandler>>>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("InMemoryGraphStore")
            .field("handlers", &handlers)
            .finish_non_exhaustive()
    }
}

impl InMemoryGraphStore {
    /// Creates a store holding only the reference node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(GraphState::new())),
            writer: Mutex::new(()),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the number of committed nodes, the reference node included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.read().map(|s| s.node_count()).unwrap_or(0)
    }

    /// Returns the number of committed relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.state.read().map(|s| s.relationship_count()).unwrap_or(0)
    }

    fn handlers(&self) -> Result<Vec<Arc<dyn TransactionEventHandler>>> {
        self.handlers
            .read()
            .map(|handlers| handlers.clone())
            .map_err(|_| lock_poisoned("commit"))
    }

    fn notify_rollback(&self) {
        if let Ok(handlers) = self.handlers.read() {
            for handler in handlers.iter() {
                handler.after_rollback();
            }
        }
    }

    fn publish(&self, state: GraphState) -> Result<()> {
        let mut committed = self.state.write().map_err(|_| lock_poisoned("commit"))?;
        *committed = Arc::new(state);
        Ok(())
    }
}

impl GraphStore for InMemoryGraphStore {
    type Snapshot = Arc<GraphState>;
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin_tx(&self) -> Result<MemoryTransaction<'_>> {
        let writer = self.writer.lock().map_err(|_| lock_poisoned("begin_tx"))?;
        let base = self.snapshot()?;
        let working = (*base).clone();
        Ok(MemoryTransaction {
            store: self,
            base,
            working,
            log: WriteLog::default(),
            finished: false,
            _writer: writer,
        })
    }

    fn snapshot(&self) -> Result<Arc<GraphState>> {
        self.state
            .read()
            .map(|state| Arc::clone(&state))
            .map_err(|_| lock_poisoned("snapshot"))
    }

    fn register_handler(&self, handler: Arc<dyn TransactionEventHandler>) -> Result<()> {
        self.handlers
            .write()
            .map_err(|_| lock_poisoned("register_handler"))?
            .push(handler);
        Ok(())
    }

    fn reference_node(&self) -> NodeId {
        REFERENCE_NODE
    }
}

//! Graph store traits.
//!
//! The versioning layer never talks to a concrete store. It needs a handful of
//! primitives: property reads and writes on nodes and relationships, typed
//! traversal, transactions, and a hook that runs inside every committing
//! transaction.
//!
//! # Available Implementations
//!
//! | Store | Use Case | Features |
//! |-------|----------|----------|
//! | `InMemoryGraphStore` | Default; tests, embedding | Copy-on-write transactions, single writer |
//!
//! # Error Modes and Guarantees
//!
//! All fallible operations return `Result<T>` with errors propagated via
//! [`crate::Error`].
//!
//! | Operation | Error | Notes |
//! |-----------|-------|-------|
//! | `property` / `property_keys` | `NodeNotFound`, `RelationshipNotFound` | Unknown id |
//! | `relationships` | `NodeNotFound` | Unknown start node |
//! | `delete_node` | `InvalidInput` | Node still has relationships |
//! | `begin_tx` / `snapshot` | `OperationFailed` | Store lock poisoned |
//!
//! A handler error returned from
//! [`TransactionEventHandler::before_commit`] aborts the commit; nothing the
//! transaction or the handlers wrote becomes visible.
//!
//! # Example
//!
//! ```rust
//! use chronograph::models::{Direction, PropertyValue, RelationshipType};
//! use chronograph::storage::{GraphRead, GraphStore, GraphTransaction, GraphWrite, InMemoryGraphStore};
//!
//! # fn main() -> chronograph::Result<()> {
//! let store = InMemoryGraphStore::new();
//! let mut tx = store.begin_tx()?;
//! let a = tx.create_node();
//! let b = tx.create_node();
//! tx.create_relationship(a, b, RelationshipType::new("KNOWS"))?;
//! tx.set_property(a.into(), "name", PropertyValue::from("a"))?;
//! tx.commit()?;
//!
//! let snapshot = store.snapshot()?;
//! assert_eq!(snapshot.relationships(a, Direction::Outgoing, None)?.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::Result;
use crate::models::{
    Direction, EntityRef, NodeId, PropertyValue, Relationship, RelationshipId, RelationshipType,
    TransactionData,
};
use std::sync::Arc;

/// Read access to a consistent graph state.
///
/// # Implementor Notes
///
/// - Every call on one value must observe the same state
/// - Unknown ids surface as `NodeNotFound` / `RelationshipNotFound`
/// - Traversal order must be deterministic
pub trait GraphRead {
    /// Checks whether a node exists.
    fn node_exists(&self, node: NodeId) -> bool;

    /// Checks whether a relationship exists.
    fn relationship_exists(&self, relationship: RelationshipId) -> bool;

    /// Returns a relationship's endpoints and type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelationshipNotFound`] for an unknown id.
    fn relationship(&self, relationship: RelationshipId) -> Result<Relationship>;

    /// Reads a property, `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    fn property(&self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>>;

    /// Lists all property keys of an entity, internal keys included.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    fn property_keys(&self, entity: EntityRef) -> Result<Vec<String>>;

    /// Lists relationships of `node` in `direction`, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotFound`] for an unknown node.
    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&RelationshipType>,
    ) -> Result<Vec<RelationshipId>>;
}

/// Mutation primitives.
pub trait GraphWrite: GraphRead {
    /// Creates an empty node.
    fn create_node(&mut self) -> NodeId;

    /// Creates a relationship between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotFound`] if an endpoint does not exist.
    fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: RelationshipType,
    ) -> Result<RelationshipId>;

    /// Sets a property, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    fn set_property(&mut self, entity: EntityRef, key: &str, value: PropertyValue) -> Result<()>;

    /// Removes a property, returning its previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist.
    fn remove_property(&mut self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>>;

    /// Physically deletes a relationship.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelationshipNotFound`] for an unknown id.
    fn delete_relationship(&mut self, relationship: RelationshipId) -> Result<()>;

    /// Physically deletes a node that has no relationships left.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] while relationships remain.
    fn delete_node(&mut self, node: NodeId) -> Result<()>;
}

/// A unit of work that is either committed or discarded as a whole.
pub trait GraphTransaction: GraphWrite {
    /// Runs commit handlers and publishes the transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns the first handler error; the writes are then discarded.
    fn commit(self) -> Result<()>;

    /// Discards the transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot release the transaction.
    fn rollback(self) -> Result<()>;
}

/// Callbacks around a transaction's commit.
///
/// Handlers run in registration order. Writes a handler performs in
/// `before_commit` join the committing transaction but are not reported to
/// any handler.
pub trait TransactionEventHandler: Send + Sync {
    /// Runs inside the committing transaction, before its writes are visible.
    ///
    /// # Errors
    ///
    /// Any error aborts the commit.
    fn before_commit(&self, data: &TransactionData, tx: &mut dyn GraphWrite) -> Result<()>;

    /// Runs after the transaction's writes became visible.
    fn after_commit(&self, _data: &TransactionData) {}

    /// Runs after the transaction was discarded.
    fn after_rollback(&self) {}
}

/// A transactional property graph.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc`
/// - Transactions must be isolated from each other and from snapshots
/// - `reference_node` must exist for the store's whole lifetime
pub trait GraphStore: Send + Sync {
    /// A consistent read view.
    type Snapshot: GraphRead + Send + Sync;

    /// An open transaction.
    type Transaction<'a>: GraphTransaction
    where
        Self: 'a;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot start a transaction.
    fn begin_tx(&self) -> Result<Self::Transaction<'_>>;

    /// Returns a read view of the last committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed state cannot be read.
    fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Registers a commit handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the handler list cannot be updated.
    fn register_handler(&self, handler: Arc<dyn TransactionEventHandler>) -> Result<()>;

    /// Returns the store's distinguished metadata node.
    fn reference_node(&self) -> NodeId;
}

impl<T: GraphRead + ?Sized> GraphRead for Arc<T> {
    fn node_exists(&self, node: NodeId) -> bool {
        (**self).node_exists(node)
    }

    fn relationship_exists(&self, relationship: RelationshipId) -> bool {
        (**self).relationship_exists(relationship)
    }

    fn relationship(&self, relationship: RelationshipId) -> Result<Relationship> {
        (**self).relationship(relationship)
    }

    fn property(&self, entity: EntityRef, key: &str) -> Result<Option<PropertyValue>> {
        (**self).property(entity, key)
    }

    fn property_keys(&self, entity: EntityRef) -> Result<Vec<String>> {
        (**self).property_keys(entity)
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&RelationshipType>,
    ) -> Result<Vec<RelationshipId>> {
        (**self).relationships(node, direction, rel_type)
    }
}

//! # Chronograph
//!
//! As-of-version reads over a mutable property graph.
//!
//! Chronograph adds bitemporal history to a graph store that only keeps the
//! present. Every committed transaction is assigned a version; entities are
//! stamped with validity intervals, and whenever a node's properties change the
//! previous property image is rotated into an immutable history chain. Reads
//! can then be scoped to any committed version.
//!
//! ## Features
//!
//! - Closed integer interval algebra with compaction ([`models::Range`])
//! - Commit-time stamping and chain rotation ([`services::VersioningHandler`])
//! - Version-scoped node and relationship views ([`services::VersionContext`])
//! - Pluggable host store behind small traits, with an in-memory
//!   implementation ([`storage::InMemoryGraphStore`])
//!
//! ## Example
//!
//! ```rust
//! use chronograph::models::PropertyValue;
//! use chronograph::storage::{GraphTransaction, GraphWrite};
//! use chronograph::VersionedGraph;
//!
//! # fn main() -> chronograph::Result<()> {
//! let graph = VersionedGraph::in_memory()?;
//!
//! let mut tx = graph.begin_tx()?;
//! let node = tx.create_node();
//! tx.set_property(node.into(), "name", PropertyValue::from("first"))?;
//! tx.commit()?;
//! let first = graph.latest_version()?;
//!
//! let mut tx = graph.begin_tx()?;
//! tx.set_property(node.into(), "name", PropertyValue::from("second"))?;
//! tx.commit()?;
//!
//! let snapshot = graph.snapshot()?;
//! let past = graph.version_context(first).for_node(&snapshot, node)?;
//! assert_eq!(past.property("name")?, PropertyValue::from("first"));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{ChronographConfig, CounterKind, LoggingSettings};
pub use models::{
    Direction, EntityRef, NodeId, PropertyValue, Range, RelationshipId, RelationshipType, Version,
};
pub use services::{
    PropertyHolder, VersionContext, VersionCounter, VersionedGraph, VersionedNode,
    VersionedRelationship, VersioningHandler,
};
pub use storage::{GraphRead, GraphStore, GraphTransaction, GraphWrite, InMemoryGraphStore};

/// Error type for chronograph operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidRange` | A range is built with `from > to`, or stored validity bounds are inverted |
/// | `VersionNotFound` | No holder in a chain covers the requested version |
/// | `MissingVersionStamp` | An entity presented for resolution lacks validity properties |
/// | `PropertyNotFound` | The resolved holder has no such key |
/// | `AmbiguousSingleRelationship` | A single-relationship query matches more than once |
/// | `NodeNotFound` / `RelationshipNotFound` | A store primitive is given an unknown id |
/// | `DeletedEntity` | A commit changes ordinary properties of a deleted node |
/// | `ChainCorrupted` | Chain inspection finds overlapping or missing validity |
/// | `InvalidInput` | Malformed configuration, or a structurally invalid store request |
/// | `OperationFailed` | Lock poisoning, config I/O, logging initialization |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A range was constructed with its lower bound after its upper bound.
    ///
    /// Raised when:
    /// - [`Range::new`] is called with `from > to`
    /// - Validity properties read back from the store are inverted
    #[error("invalid range: from [{from}] was after to [{to}]")]
    InvalidRange {
        /// The requested lower bound.
        from: u64,
        /// The requested upper bound.
        to: u64,
    },

    /// No holder valid at the requested version exists.
    ///
    /// Raised when:
    /// - The history chain is exhausted without a matching validity interval
    /// - The entity was deleted at or before the requested version
    /// - A relationship is requested at a version where it is not visible
    #[error("version [{0}] not found")]
    VersionNotFound(Version),

    /// An entity has no validity stamp.
    ///
    /// Entities created outside the versioning protocol are tolerated while
    /// stamping but cannot be resolved.
    #[error("missing version stamp on {entity}")]
    MissingVersionStamp {
        /// The unstamped entity.
        entity: EntityRef,
    },

    /// The property is absent at the resolved holder.
    #[error("property '{key}' not found on {entity}")]
    PropertyNotFound {
        /// The entity the caller asked about.
        entity: EntityRef,
        /// The missing key.
        key: String,
    },

    /// More than one relationship matched a single-relationship query.
    #[error(
        "more than one relationship [{rel_type}, {direction}] found for {node} at version {version}"
    )]
    AmbiguousSingleRelationship {
        /// The node the query started from.
        node: NodeId,
        /// The relationship type queried.
        rel_type: RelationshipType,
        /// The direction queried.
        direction: Direction,
        /// The version of the querying context.
        version: Version,
    },

    /// The store has no node with this id.
    #[error("{0} not found")]
    NodeNotFound(NodeId),

    /// The store has no relationship with this id.
    #[error("{0} not found")]
    RelationshipNotFound(RelationshipId),

    /// A committing transaction changed a node that is already deleted.
    #[error("{entity} is deleted and can no longer be modified")]
    DeletedEntity {
        /// The deleted entity.
        entity: EntityRef,
    },

    /// A history chain violates the disjoint-coverage invariant.
    #[error("history chain of {node} is corrupted: {reason}")]
    ChainCorrupted {
        /// The live node owning the chain.
        node: NodeId,
        /// What was found.
        reason: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A configuration value cannot be parsed
    /// - A node with remaining relationships is deleted from the store
    /// - A relationship endpoint is asked for with an unrelated node
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - A store lock is poisoned
    /// - A configuration file cannot be read or parsed
    /// - Logging is initialized twice or fails to install
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for chronograph operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Versioning services.
//!
//! Services implement the versioning protocol on top of the storage traits:
//! version allocation, commit-time stamping and rotation, snapshot
//! resolution, and the version-scoped views built on it.

mod context;
mod counter;
mod graph;
pub mod resolution;
mod versioning;

pub use context::{PropertyHolder, PropertyValues, VersionContext, VersionedNode, VersionedRelationship};
pub use counter::{AtomicVersionCounter, StoreVersionCounter, VersionCounter};
pub use graph::VersionedGraph;
pub use resolution::ChainEntry;
pub use versioning::VersioningHandler;

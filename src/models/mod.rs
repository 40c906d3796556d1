//! Data models for chronograph.
//!
//! This module contains the core data structures used throughout the crate:
//! version ranges, version numbers, graph primitives and commit change sets.

mod events;
pub mod graph;
mod range;
pub mod version;

pub use events::{PropertyEntry, TransactionData};
pub use graph::{
    Direction, EntityRef, NodeId, PropertyValue, Relationship, RelationshipId, RelationshipType,
};
pub use range::Range;
pub use version::Version;

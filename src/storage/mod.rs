//! Storage layer abstraction.
//!
//! The versioning core is written against the traits in [`traits`] only; the
//! [`graph`] module provides the in-memory store it ships with.

pub mod graph;
pub mod traits;

pub use graph::{GraphState, InMemoryGraphStore, MemoryTransaction};
pub use traits::{GraphRead, GraphStore, GraphTransaction, GraphWrite, TransactionEventHandler};

//! Graph store implementations.
//!
//! # Available Stores
//!
//! | Store | Use Case | Features |
//! |-------|----------|----------|
//! | [`InMemoryGraphStore`] | Default; tests, embedding | Copy-on-write transactions, single writer |

mod memory;

pub use memory::{GraphState, InMemoryGraphStore, MemoryTransaction, REFERENCE_NODE};

//! Storage traits.

pub mod graph;

pub use graph::{GraphRead, GraphStore, GraphTransaction, GraphWrite, TransactionEventHandler};

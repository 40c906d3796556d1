//! Versioned graph facade.
//!
//! Wires a [`GraphStore`], a [`VersionCounter`] and the [`VersioningHandler`]
//! together according to a [`ChronographConfig`].
//!
//! # Example
//!
//! ```rust
//! use chronograph::models::{PropertyValue, Range};
//! use chronograph::storage::{GraphTransaction, GraphWrite};
//! use chronograph::VersionedGraph;
//!
//! # fn main() -> chronograph::Result<()> {
//! let graph = VersionedGraph::in_memory()?;
//! let mut tx = graph.begin_tx()?;
//! let node = tx.create_node();
//! tx.set_property(node.into(), "n", PropertyValue::from(1))?;
//! tx.commit()?;
//!
//! let mut tx = graph.begin_tx()?;
//! tx.set_property(node.into(), "n", PropertyValue::from(2))?;
//! tx.commit()?;
//!
//! assert_eq!(graph.history(node)?.len(), 2);
//! assert_eq!(graph.lifetime(node)?, vec![Range::open(1)]);
//! graph.verify_chain(node)?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ChronographConfig, CounterKind};
use crate::models::{NodeId, Range, Version};
use crate::services::context::VersionContext;
use crate::services::counter::{AtomicVersionCounter, StoreVersionCounter, VersionCounter};
use crate::services::resolution::{self, ChainEntry};
use crate::services::versioning::VersioningHandler;
use crate::storage::{GraphStore, InMemoryGraphStore};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A graph store with as-of-version reads.
///
/// # Thread Safety
///
/// The facade is `Send + Sync` whenever the store is; transactions are
/// isolated by the store itself.
pub struct VersionedGraph<S: GraphStore = InMemoryGraphStore> {
    store: Arc<S>,
    counter: Arc<dyn VersionCounter>,
    config: ChronographConfig,
}

impl<S: GraphStore> fmt::Debug for VersionedGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedGraph")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VersionedGraph<InMemoryGraphStore> {
    /// Creates a versioned in-memory graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the versioning handler cannot be registered.
    pub fn new(config: ChronographConfig) -> Result<Self> {
        let store = InMemoryGraphStore::new();
        let counter: Arc<dyn VersionCounter> = match config.version_counter {
            CounterKind::Store => Arc::new(StoreVersionCounter::new(store.reference_node())),
            CounterKind::Atomic => Arc::new(AtomicVersionCounter::new()),
        };
        Self::with_store(store, counter, config)
    }

    /// Creates a versioned in-memory graph with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the versioning handler cannot be registered.
    pub fn in_memory() -> Result<Self> {
        Self::new(ChronographConfig::default())
    }
}

impl<S: GraphStore> VersionedGraph<S> {
    /// Adds versioning to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the versioning handler cannot be registered.
    pub fn with_store(
        store: S,
        counter: Arc<dyn VersionCounter>,
        config: ChronographConfig,
    ) -> Result<Self> {
        let handler = VersioningHandler::new(Arc::clone(&counter), store.reference_node());
        store.register_handler(Arc::new(handler))?;
        debug!(
            strict_endpoints = config.strict_endpoints,
            counter = %config.version_counter,
            "versioning enabled"
        );
        Ok(Self {
            store: Arc::new(store),
            counter,
            config,
        })
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ChronographConfig {
        &self.config
    }

    /// Opens a transaction. Its changes are versioned when it commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot start a transaction.
    pub fn begin_tx(&self) -> Result<S::Transaction<'_>> {
        self.store.begin_tx()
    }

    /// Returns a read view of the last committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the committed state cannot be read.
    pub fn snapshot(&self) -> Result<S::Snapshot> {
        self.store.snapshot()
    }

    /// Returns the latest committed version.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read.
    pub fn latest_version(&self) -> Result<Version> {
        let snapshot = self.store.snapshot()?;
        self.counter.latest(&snapshot)
    }

    /// Returns a context reading at `version`.
    #[must_use]
    pub const fn version_context(&self, version: Version) -> VersionContext {
        VersionContext::new(version).strict_endpoints(self.config.strict_endpoints)
    }

    /// Returns a context reading at the latest committed version.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read.
    pub fn current_context(&self) -> Result<VersionContext> {
        Ok(self.version_context(self.latest_version()?))
    }

    /// Lists every holder of `node`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be read.
    pub fn history(&self, node: NodeId) -> Result<Vec<ChainEntry>> {
        resolution::history(&self.store.snapshot()?, node)
    }

    /// Returns the compacted validity of `node`'s whole chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be read.
    pub fn lifetime(&self, node: NodeId) -> Result<Vec<Range>> {
        resolution::lifetime(&self.store.snapshot()?, node)
    }

    /// Checks `node`'s chain for overlapping or missing validity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainCorrupted`] on the first violation.
    pub fn verify_chain(&self, node: NodeId) -> Result<()> {
        resolution::verify_chain(&self.store.snapshot()?, node)
    }

    /// Renders `node`'s history as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be read or serialized.
    pub fn history_json(&self, node: NodeId) -> Result<String> {
        let history = self.history(node)?;
        serde_json::to_string_pretty(&history).map_err(|e| Error::OperationFailed {
            operation: "history_json".to_string(),
            cause: e.to_string(),
        })
    }
}

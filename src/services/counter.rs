//! Version allocation.
//!
//! Exactly one version is allocated per committing transaction, from inside
//! that transaction's commit hook. The hook serializes allocation through the
//! store's single-writer isolation, so no counter needs its own lock.
//!
//! | Counter | Storage | Aborted commit |
//! |---------|---------|----------------|
//! | [`StoreVersionCounter`] | `__latest_version__` on the reference node | allocation rolled back, no gaps |
//! | [`AtomicVersionCounter`] | process memory | version skipped, gaps allowed |

use crate::models::version::LATEST_VERSION;
use crate::models::{EntityRef, NodeId, PropertyValue, Version};
use crate::storage::{GraphRead, GraphWrite};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of commit versions.
pub trait VersionCounter: Send + Sync {
    /// Allocates the version of the transaction `tx` is about to commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter state cannot be read or written.
    fn allocate(&self, tx: &mut dyn GraphWrite) -> Result<Version>;

    /// Returns the latest allocated version, [`Version::ZERO`] if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter state cannot be read.
    fn latest(&self, graph: &dyn GraphRead) -> Result<Version>;
}

/// Counter persisted on the store's reference node.
///
/// The increment is written by the committing transaction itself, so it
/// becomes visible exactly when that transaction commits.
#[derive(Debug, Clone, Copy)]
pub struct StoreVersionCounter {
    reference: NodeId,
}

impl StoreVersionCounter {
    /// Creates a counter kept on `reference`.
    #[must_use]
    pub const fn new(reference: NodeId) -> Self {
        Self { reference }
    }

    fn read<G: GraphRead + ?Sized>(&self, graph: &G) -> Result<u64> {
        let Some(value) = graph.property(EntityRef::Node(self.reference), LATEST_VERSION)? else {
            return Ok(0);
        };
        value
            .as_int()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{LATEST_VERSION} on {} is not a version: {value}",
                    self.reference
                ))
            })
    }
}

impl VersionCounter for StoreVersionCounter {
    fn allocate(&self, tx: &mut dyn GraphWrite) -> Result<Version> {
        let next = self.read(&*tx)? + 1;
        let stored = i64::try_from(next).map_err(|_| Error::OperationFailed {
            operation: "allocate_version".to_string(),
            cause: "version counter exhausted".to_string(),
        })?;
        tx.set_property(
            EntityRef::Node(self.reference),
            LATEST_VERSION,
            PropertyValue::Int(stored),
        )?;
        Ok(Version::new(next))
    }

    fn latest(&self, graph: &dyn GraphRead) -> Result<Version> {
        self.read(graph).map(Version::new)
    }
}

/// In-process fetch-and-increment counter.
///
/// Versions taken by commits that later abort are never reused.
#[derive(Debug, Default)]
pub struct AtomicVersionCounter {
    latest: AtomicU64,
}

impl AtomicVersionCounter {
    /// Creates a counter whose first allocation is version 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: AtomicU64::new(0),
        }
    }

    /// Creates a counter that resumes after `latest`.
    #[must_use]
    pub const fn starting_at(latest: Version) -> Self {
        Self {
            latest: AtomicU64::new(latest.value()),
        }
    }
}

impl VersionCounter for AtomicVersionCounter {
    fn allocate(&self, _tx: &mut dyn GraphWrite) -> Result<Version> {
        let previous = self.latest.fetch_add(1, Ordering::SeqCst);
        Ok(Version::new(previous + 1))
    }

    fn latest(&self, _graph: &dyn GraphRead) -> Result<Version> {
        Ok(Version::new(self.latest.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::GraphState;
    use crate::storage::graph::REFERENCE_NODE;

    #[test]
    fn test_store_counter_starts_at_one() {
        let mut state = GraphState::new();
        let counter = StoreVersionCounter::new(REFERENCE_NODE);

        assert_eq!(counter.latest(&state).unwrap(), Version::ZERO);
        assert_eq!(counter.allocate(&mut state).unwrap(), Version::new(1));
        assert_eq!(counter.allocate(&mut state).unwrap(), Version::new(2));
        assert_eq!(counter.latest(&state).unwrap(), Version::new(2));
    }

    #[test]
    fn test_store_counter_rejects_garbage() {
        let mut state = GraphState::new();
        state
            .set_property(REFERENCE_NODE.into(), LATEST_VERSION, PropertyValue::from("x"))
            .unwrap();
        let counter = StoreVersionCounter::new(REFERENCE_NODE);
        assert!(matches!(
            counter.latest(&state),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_atomic_counter() {
        let mut state = GraphState::new();
        let counter = AtomicVersionCounter::starting_at(Version::new(10));
        assert_eq!(counter.latest(&state).unwrap(), Version::new(10));
        assert_eq!(counter.allocate(&mut state).unwrap(), Version::new(11));
        assert_eq!(counter.latest(&state).unwrap(), Version::new(11));
        assert_eq!(AtomicVersionCounter::new().allocate(&mut state).unwrap(), Version::new(1));
    }
}

//! Property-based tests for the interval algebra and version resolution.
//!
//! Uses proptest to verify invariants across random inputs:
//! - `intersect` and `union` are commutative and idempotent
//! - `compact` is idempotent, sorted, disjoint and preserves coverage
//! - Random commit sequences resolve to the state committed at each version

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chronograph::models::{PropertyValue, Range, Version};
use chronograph::storage::{GraphTransaction, GraphWrite};
use chronograph::{ChronographConfig, CounterKind, VersionedGraph};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn range() -> impl Strategy<Value = Range> {
    (0u64..40, 0u64..12).prop_map(|(from, len)| Range::new(from, from + len).unwrap())
}

fn points(ranges: &[Range]) -> BTreeSet<u64> {
    ranges
        .iter()
        .flat_map(|range| range.from()..=range.to())
        .collect()
}

/// One step of a random edit script: `None` removes the key.
#[derive(Debug, Clone)]
struct Edit {
    key: &'static str,
    value: Option<i64>,
}

fn edit() -> impl Strategy<Value = Edit> {
    (
        prop::sample::select(vec!["a", "b", "c"]),
        prop::option::of(0i64..4),
    )
        .prop_map(|(key, value)| Edit { key, value })
}

proptest! {
    /// Property: intersection does not depend on argument order.
    #[test]
    fn prop_intersect_commutative(a in range(), b in range()) {
        prop_assert_eq!(a.intersect(&b), b.intersect(&a));
    }

    /// Property: union does not depend on argument order.
    #[test]
    fn prop_union_commutative(a in range(), b in range()) {
        prop_assert_eq!(a.union(&b), b.union(&a));
    }

    /// Property: a range intersected or united with itself is unchanged.
    #[test]
    fn prop_self_operations_idempotent(a in range()) {
        prop_assert_eq!(a.intersect(&a), Some(a));
        prop_assert_eq!(a.union(&a), BTreeSet::from([a]));
    }

    /// Property: the intersection lies inside both operands.
    #[test]
    fn prop_intersection_within_operands(a in range(), b in range()) {
        if let Some(both) = a.intersect(&b) {
            for point in both.from()..=both.to() {
                prop_assert!(a.contains(point) && b.contains(point));
            }
        } else {
            prop_assert!(!a.overlaps(&b));
        }
    }

    /// Property: compact output is sorted, disjoint and covers the same points.
    #[test]
    fn prop_compact_canonical(ranges in prop::collection::vec(range(), 0..12)) {
        let compacted = Range::compact(ranges.iter().copied());

        for pair in compacted.windows(2) {
            prop_assert!(pair[0] < pair[1]);
            prop_assert!(!pair[0].overlaps(&pair[1]));
        }
        prop_assert_eq!(points(&compacted), points(&ranges));
        prop_assert_eq!(Range::compact(compacted.iter().copied()), compacted);
    }

    /// Property: every committed version reads back exactly what it committed.
    #[test]
    fn prop_versions_resolve_committed_state(
        edits in prop::collection::vec(edit(), 1..20),
        atomic in any::<bool>(),
    ) {
        let counter = if atomic { CounterKind::Atomic } else { CounterKind::Store };
        let graph = VersionedGraph::new(
            ChronographConfig::default().with_version_counter(counter),
        )
        .unwrap();

        let mut tx = graph.begin_tx().unwrap();
        let node = tx.create_node();
        tx.commit().unwrap();

        let mut state: BTreeMap<String, i64> = BTreeMap::new();
        let mut expected: BTreeMap<u64, BTreeMap<String, i64>> =
            BTreeMap::from([(1, state.clone())]);

        for edit in &edits {
            let mut tx = graph.begin_tx().unwrap();
            match edit.value {
                Some(value) => {
                    tx.set_property(node.into(), edit.key, PropertyValue::from(value))
                        .unwrap();
                    state.insert(edit.key.to_string(), value);
                },
                None => {
                    tx.remove_property(node.into(), edit.key).unwrap();
                    state.remove(edit.key);
                },
            }
            tx.commit().unwrap();
            expected.insert(graph.latest_version().unwrap().value(), state.clone());
        }

        let snapshot = graph.snapshot().unwrap();
        for (version, properties) in &expected {
            let view = graph
                .version_context(Version::new(*version))
                .for_node(&*snapshot, node)
                .unwrap();
            let mut keys = view.property_keys().unwrap();
            keys.sort();
            prop_assert_eq!(keys, properties.keys().cloned().collect::<Vec<_>>());
            for (key, value) in properties {
                prop_assert_eq!(view.property(key).unwrap(), PropertyValue::from(*value));
            }
        }

        prop_assert_eq!(graph.lifetime(node).unwrap(), vec![Range::open(1)]);
        prop_assert!(graph.verify_chain(node).is_ok());
    }
}

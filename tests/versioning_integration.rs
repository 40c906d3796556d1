//! End-to-end versioning tests.
//!
//! Drives a [`VersionedGraph`] through ordinary transactions and reads the
//! result back through version contexts.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chronograph::models::{Direction, NodeId, PropertyValue, Range, RelationshipType, Version};
use chronograph::services::StoreVersionCounter;
use chronograph::storage::{GraphStore, GraphTransaction, GraphWrite, InMemoryGraphStore};
use chronograph::{ChronographConfig, Error, VersionedGraph};
use std::sync::Arc;

fn graph() -> VersionedGraph {
    VersionedGraph::in_memory().expect("in-memory graph")
}

fn set(graph: &VersionedGraph, node: NodeId, key: &str, value: impl Into<PropertyValue>) {
    let mut tx = graph.begin_tx().unwrap();
    tx.set_property(node.into(), key, value.into()).unwrap();
    tx.commit().unwrap();
}

fn read(
    graph: &VersionedGraph,
    node: NodeId,
    version: u64,
    key: &str,
) -> chronograph::Result<PropertyValue> {
    let snapshot = graph.snapshot()?;
    let context = graph.version_context(Version::new(version));
    context.for_node(&*snapshot, node)?.property(key)
}

#[test]
fn test_property_history_is_readable_per_version() {
    let graph = graph();

    let mut tx = graph.begin_tx().unwrap();
    let node = tx.create_node();
    tx.set_property(node.into(), "key", PropertyValue::from("foo"))
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(graph.latest_version().unwrap(), Version::new(1));

    set(&graph, node, "key", "bar");

    let mut tx = graph.begin_tx().unwrap();
    tx.set_property(node.into(), "key", PropertyValue::from("zoo"))
        .unwrap();
    tx.set_property(node.into(), "other", PropertyValue::from("asdf"))
        .unwrap();
    tx.commit().unwrap();

    let mut tx = graph.begin_tx().unwrap();
    tx.remove_property(node.into(), "key").unwrap();
    tx.commit().unwrap();
    assert_eq!(graph.latest_version().unwrap(), Version::new(4));

    assert_eq!(read(&graph, node, 1, "key").unwrap(), PropertyValue::from("foo"));
    assert_eq!(read(&graph, node, 2, "key").unwrap(), PropertyValue::from("bar"));
    assert_eq!(read(&graph, node, 3, "key").unwrap(), PropertyValue::from("zoo"));
    assert!(matches!(
        read(&graph, node, 4, "key"),
        Err(Error::PropertyNotFound { .. })
    ));
    assert_eq!(read(&graph, node, 4, "other").unwrap(), PropertyValue::from("asdf"));
    assert!(matches!(
        read(&graph, node, 2, "other"),
        Err(Error::PropertyNotFound { .. })
    ));

    let snapshot = graph.snapshot().unwrap();
    let view = graph
        .version_context(Version::new(4))
        .for_node(&*snapshot, node)
        .unwrap();
    assert_eq!(view.property_keys().unwrap(), vec!["other".to_string()]);
    assert_eq!(
        view.property_or("key", PropertyValue::from("none")).unwrap(),
        PropertyValue::from("none")
    );

    assert_eq!(graph.history(node).unwrap().len(), 4);
    assert_eq!(graph.lifetime(node).unwrap(), vec![Range::open(1)]);
    graph.verify_chain(node).unwrap();
}

#[test]
fn test_node_reads_before_creation_fail() {
    let graph = graph();
    set(&graph, graph.store().reference_node(), "seed", 1);

    let mut tx = graph.begin_tx().unwrap();
    let node = tx.create_node();
    tx.commit().unwrap();

    assert!(matches!(
        read(&graph, node, 1, "anything"),
        Err(Error::VersionNotFound(_))
    ));
    assert!(matches!(
        read(&graph, node, 2, "anything"),
        Err(Error::PropertyNotFound { .. })
    ));
}

#[test]
fn test_relationship_visible_until_deleted() {
    let graph = graph();
    let knows = RelationshipType::new("KNOWS");

    let mut tx = graph.begin_tx().unwrap();
    let a = tx.create_node();
    let b = tx.create_node();
    tx.commit().unwrap();

    let mut tx = graph.begin_tx().unwrap();
    let rel = tx.create_relationship(a, b, knows.clone()).unwrap();
    tx.set_property(rel.into(), "since", PropertyValue::from(2020))
        .unwrap();
    tx.commit().unwrap();

    set(&graph, a, "name", "alice");

    let mut tx = graph.begin_tx().unwrap();
    graph
        .version_context(Version::new(4))
        .delete_relationship(&mut tx, rel)
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(graph.latest_version().unwrap(), Version::new(4));

    let snapshot = graph.snapshot().unwrap();
    for version in 1..=5 {
        let context = graph.version_context(Version::new(version));
        let view = context.for_node(&*snapshot, a).unwrap();
        let visible = view.relationships(Direction::Outgoing, &[knows.clone()]).unwrap();
        let expected = (2..4).contains(&version);
        assert_eq!(!visible.is_empty(), expected, "version {version}");
        assert_eq!(context.for_relationship(&*snapshot, rel).is_ok(), expected);
    }

    let context = graph.version_context(Version::new(3));
    let view = context.for_node(&*snapshot, b).unwrap();
    let incoming = view
        .single_relationship(&knows, Direction::Incoming)
        .unwrap()
        .expect("incoming relationship");
    assert_eq!(incoming.other_node_id(b).unwrap(), a);
    assert_eq!(incoming.property("since").unwrap(), PropertyValue::from(2020));
    assert_eq!(incoming.validity(), Range::new(2, 3).unwrap());
    assert!(
        !incoming
            .other_node(b)
            .unwrap()
            .property_keys()
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_single_relationship_rejects_ambiguity() {
    let graph = graph();
    let knows = RelationshipType::new("KNOWS");

    let mut tx = graph.begin_tx().unwrap();
    let a = tx.create_node();
    let b = tx.create_node();
    let c = tx.create_node();
    tx.create_relationship(a, b, knows.clone()).unwrap();
    tx.commit().unwrap();

    let mut tx = graph.begin_tx().unwrap();
    tx.create_relationship(a, c, knows.clone()).unwrap();
    tx.commit().unwrap();

    let snapshot = graph.snapshot().unwrap();
    let at_one = graph
        .version_context(Version::new(1))
        .for_node(&*snapshot, a)
        .unwrap();
    assert!(
        at_one
            .single_relationship(&knows, Direction::Outgoing)
            .unwrap()
            .is_some()
    );

    let at_two = graph
        .version_context(Version::new(2))
        .for_node(&*snapshot, a)
        .unwrap();
    assert!(matches!(
        at_two.single_relationship(&knows, Direction::Outgoing),
        Err(Error::AmbiguousSingleRelationship { .. })
    ));
    assert!(
        at_two
            .single_relationship(&RelationshipType::new("OWNS"), Direction::Outgoing)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_deleted_node_disappears_from_later_versions() {
    let graph = graph();

    let mut tx = graph.begin_tx().unwrap();
    let node = tx.create_node();
    tx.set_property(node.into(), "name", PropertyValue::from("a"))
        .unwrap();
    tx.commit().unwrap();

    set(&graph, node, "name", "b");

    let mut tx = graph.begin_tx().unwrap();
    graph
        .version_context(Version::new(3))
        .delete_node(&mut tx, node)
        .unwrap();
    tx.commit().unwrap();

    set(&graph, graph.store().reference_node(), "tick", 1);

    assert_eq!(read(&graph, node, 1, "name").unwrap(), PropertyValue::from("a"));
    assert_eq!(read(&graph, node, 2, "name").unwrap(), PropertyValue::from("b"));
    for version in 3..=5 {
        assert!(matches!(
            read(&graph, node, version, "name"),
            Err(Error::VersionNotFound(_))
        ));
    }

    assert_eq!(graph.lifetime(node).unwrap(), vec![Range::new(1, 2).unwrap()]);
    graph.verify_chain(node).unwrap();

    let mut tx = graph.begin_tx().unwrap();
    tx.set_property(node.into(), "name", PropertyValue::from("ghost"))
        .unwrap();
    assert!(matches!(tx.commit(), Err(Error::DeletedEntity { .. })));
}

#[test]
fn test_delete_with_pending_changes_keeps_last_committed_image() {
    let graph = graph();

    let mut tx = graph.begin_tx().unwrap();
    let node = tx.create_node();
    tx.set_property(node.into(), "name", PropertyValue::from("kept"))
        .unwrap();
    tx.commit().unwrap();

    let mut tx = graph.begin_tx().unwrap();
    tx.set_property(node.into(), "name", PropertyValue::from("discarded"))
        .unwrap();
    graph
        .version_context(Version::new(2))
        .delete_node(&mut tx, node)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(read(&graph, node, 1, "name").unwrap(), PropertyValue::from("kept"));
    assert_eq!(graph.history(node).unwrap().len(), 1);
}

#[test]
fn test_strict_endpoints_hide_dangling_relationships() {
    let config = ChronographConfig::default().with_strict_endpoints(true);
    let strict = VersionedGraph::new(config).unwrap();
    let knows = RelationshipType::new("KNOWS");

    let mut tx = strict.begin_tx().unwrap();
    let a = tx.create_node();
    let b = tx.create_node();
    let rel = tx.create_relationship(a, b, knows.clone()).unwrap();
    tx.commit().unwrap();

    let mut tx = strict.begin_tx().unwrap();
    strict
        .version_context(Version::new(2))
        .delete_node(&mut tx, b)
        .unwrap();
    tx.commit().unwrap();

    let snapshot = strict.snapshot().unwrap();

    let strict_at_two = strict.version_context(Version::new(2));
    assert!(strict_at_two.is_strict());
    let view = strict_at_two.for_node(&*snapshot, a).unwrap();
    assert!(!view.has_relationship(Direction::Outgoing, &[knows.clone()]).unwrap());
    assert!(matches!(
        strict_at_two.for_relationship(&*snapshot, rel),
        Err(Error::VersionNotFound(_))
    ));

    let strict_at_one = strict.version_context(Version::new(1));
    let view = strict_at_one.for_node(&*snapshot, a).unwrap();
    assert!(view.has_relationship(Direction::Outgoing, &[knows.clone()]).unwrap());

    let lenient_at_two = strict_at_two.strict_endpoints(false);
    let view = lenient_at_two.for_node(&*snapshot, a).unwrap();
    assert!(view.has_relationship(Direction::Outgoing, &[knows.clone()]).unwrap());
}

#[test]
fn test_entities_from_before_versioning_fail_only_on_resolution() {
    let store = InMemoryGraphStore::new();
    let mut tx = store.begin_tx().unwrap();
    let legacy = tx.create_node();
    tx.set_property(legacy.into(), "name", PropertyValue::from("old"))
        .unwrap();
    tx.commit().unwrap();

    let counter = Arc::new(StoreVersionCounter::new(store.reference_node()));
    let graph = VersionedGraph::with_store(store, counter, ChronographConfig::default()).unwrap();

    let mut tx = graph.begin_tx().unwrap();
    tx.set_property(legacy.into(), "name", PropertyValue::from("new"))
        .unwrap();
    assert!(tx.commit().is_ok());
    assert_eq!(graph.latest_version().unwrap(), Version::new(1));

    let snapshot = graph.snapshot().unwrap();
    for version in [1, 2] {
        let result = graph
            .version_context(Version::new(version))
            .for_node(&*snapshot, legacy);
        assert!(matches!(
            result,
            Err(Error::MissingVersionStamp { entity }) if entity == legacy.into()
        ));
    }
}

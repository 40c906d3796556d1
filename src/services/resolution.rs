//! Snapshot resolution.
//!
//! Every logical node is a live node plus a backward chain of immutable
//! snapshots linked by `__PREV_VERSION__`. The validity ranges along a chain
//! are pairwise disjoint and together cover the node's lifetime, so at most
//! one holder answers for any version.
//!
//! ```text
//! live [4, ∞) --__PREV_VERSION__--> [3, 3] --> [2, 2] --> [1, 1]
//! ```

use crate::models::version::{VALID_FROM, VALID_TO, is_internal_key};
use crate::models::{
    Direction, EntityRef, NodeId, PropertyValue, Range, RelationshipId, RelationshipType, Version,
};
use crate::storage::{GraphRead, GraphWrite};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One holder in a history chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEntry {
    /// The node holding this image.
    pub holder: NodeId,
    /// Versions for which the image is authoritative.
    pub validity: Range,
    /// Ordinary properties of the image.
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Reads one validity bound, `None` if absent or not a valid stamp.
pub(crate) fn read_bound<G: GraphRead + ?Sized>(
    graph: &G,
    entity: EntityRef,
    key: &str,
) -> Result<Option<u64>> {
    Ok(graph
        .property(entity, key)?
        .and_then(|value| value.as_int())
        .and_then(|value| u64::try_from(value).ok()))
}

/// Writes one validity bound.
pub(crate) fn write_bound<G: GraphWrite + ?Sized>(
    graph: &mut G,
    entity: EntityRef,
    key: &str,
    value: u64,
) -> Result<()> {
    let stored = i64::try_from(value).map_err(|_| Error::InvalidInput(format!(
        "{key} of {entity} is out of range: {value}"
    )))?;
    graph.set_property(entity, key, PropertyValue::Int(stored))
}

/// Reads the validity range of an entity.
///
/// # Errors
///
/// - [`Error::MissingVersionStamp`] if either bound is absent
/// - [`Error::InvalidRange`] if the stored bounds are inverted
pub fn validity<G: GraphRead + ?Sized>(graph: &G, entity: EntityRef) -> Result<Range> {
    let from = read_bound(graph, entity, VALID_FROM)?;
    let to = read_bound(graph, entity, VALID_TO)?;
    match (from, to) {
        (Some(from), Some(to)) => Range::new(from, to),
        _ => Err(Error::MissingVersionStamp { entity }),
    }
}

/// Returns the holder directly preceding `holder` in its chain.
///
/// # Errors
///
/// Returns [`Error::ChainCorrupted`] if `holder` has more than one outgoing
/// chain link.
pub fn previous_holder<G: GraphRead + ?Sized>(graph: &G, holder: NodeId) -> Result<Option<NodeId>> {
    let links = graph.relationships(
        holder,
        Direction::Outgoing,
        Some(&RelationshipType::prev_version()),
    )?;
    match links.as_slice() {
        [] => Ok(None),
        [link] => Ok(Some(graph.relationship(*link)?.end)),
        _ => Err(Error::ChainCorrupted {
            node: holder,
            reason: format!("{} outgoing chain links", links.len()),
        }),
    }
}

/// Walks a chain from its live node, newest first.
fn walk<G, F>(graph: &G, node: NodeId, mut visit: F) -> Result<()>
where
    G: GraphRead + ?Sized,
    F: FnMut(NodeId) -> Result<bool>,
{
    let mut visited = BTreeSet::new();
    let mut holder = Some(node);
    while let Some(current) = holder {
        if !visited.insert(current) {
            return Err(Error::ChainCorrupted {
                node,
                reason: format!("chain loops back to {current}"),
            });
        }
        if !visit(current)? {
            return Ok(());
        }
        holder = previous_holder(graph, current)?;
    }
    Ok(())
}

/// Finds the holder of `node`'s properties at `version`.
///
/// # Errors
///
/// - [`Error::VersionNotFound`] if no holder's validity contains `version`
/// - [`Error::MissingVersionStamp`] if a holder on the way is unstamped
pub fn resolve_holder<G: GraphRead + ?Sized>(
    graph: &G,
    node: NodeId,
    version: Version,
) -> Result<NodeId> {
    let mut found = None;
    walk(graph, node, |holder| {
        if validity(graph, holder.into())?.contains(version.value()) {
            found = Some(holder);
            return Ok(false);
        }
        Ok(true)
    })?;
    found.ok_or(Error::VersionNotFound(version))
}

/// Checks whether a relationship is visible at `version`.
///
/// Unstamped relationships, chain links among them, are never visible.
pub(crate) fn relationship_visible<G: GraphRead + ?Sized>(
    graph: &G,
    relationship: RelationshipId,
    version: Version,
) -> Result<bool> {
    match validity(graph, relationship.into()) {
        Ok(range) => Ok(range.contains(version.value())),
        Err(Error::MissingVersionStamp { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Checks whether some holder of `node` is valid at `version`.
pub(crate) fn node_visible<G: GraphRead + ?Sized>(
    graph: &G,
    node: NodeId,
    version: Version,
) -> Result<bool> {
    match resolve_holder(graph, node, version) {
        Ok(_) => Ok(true),
        Err(Error::VersionNotFound(_) | Error::MissingVersionStamp { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Returns the ordinary properties of an entity.
pub(crate) fn ordinary_properties<G: GraphRead + ?Sized>(
    graph: &G,
    entity: EntityRef,
) -> Result<BTreeMap<String, PropertyValue>> {
    let mut properties = BTreeMap::new();
    for key in graph.property_keys(entity)? {
        if is_internal_key(&key) {
            continue;
        }
        if let Some(value) = graph.property(entity, &key)? {
            properties.insert(key, value);
        }
    }
    Ok(properties)
}

/// Lists every holder of `node`, newest first.
///
/// # Errors
///
/// Returns an error if a holder is unstamped or the chain is malformed.
pub fn history<G: GraphRead + ?Sized>(graph: &G, node: NodeId) -> Result<Vec<ChainEntry>> {
    let mut entries = Vec::new();
    walk(graph, node, |holder| {
        entries.push(ChainEntry {
            holder,
            validity: validity(graph, holder.into())?,
            properties: ordinary_properties(graph, holder.into())?,
        });
        Ok(true)
    })?;
    Ok(entries)
}

/// Returns the versions covered by `node`'s chain as sorted, disjoint ranges.
///
/// Unlike [`Range::compact`], consecutive ranges such as `[1, 1]` and
/// `[2, 2]` are joined, so a healthy chain yields exactly one range.
///
/// # Errors
///
/// Returns an error if a holder is unstamped or the chain is malformed.
pub fn lifetime<G: GraphRead + ?Sized>(graph: &G, node: NodeId) -> Result<Vec<Range>> {
    let entries = history(graph, node)?;
    let mut covered: Vec<Range> = Vec::new();
    for range in Range::compact(entries.into_iter().map(|e| e.validity)) {
        match covered.last_mut() {
            Some(last) if last.to().saturating_add(1) == range.from() => {
                *last = last.close_at(range.to())?;
            },
            _ => covered.push(range),
        }
    }
    Ok(covered)
}

/// Checks that the validity ranges along `node`'s chain are disjoint and
/// leave no gap.
///
/// # Errors
///
/// Returns [`Error::ChainCorrupted`] describing the first violation.
pub fn verify_chain<G: GraphRead + ?Sized>(graph: &G, node: NodeId) -> Result<()> {
    let entries = history(graph, node)?;
    for pair in entries.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        if older.validity.overlaps(&newer.validity) {
            return Err(Error::ChainCorrupted {
                node,
                reason: format!(
                    "{} {} overlaps {} {}",
                    older.holder, older.validity, newer.holder, newer.validity
                ),
            });
        }
        if older.validity.to().saturating_add(1) != newer.validity.from() {
            return Err(Error::ChainCorrupted {
                node,
                reason: format!(
                    "gap between {} {} and {} {}",
                    older.holder, older.validity, newer.holder, newer.validity
                ),
            });
        }
    }
    Ok(())
}

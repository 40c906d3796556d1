//! Version-scoped views.
//!
//! A [`VersionContext`] binds one target version. It turns node and
//! relationship ids into views whose reads are routed through the holder
//! valid at that version, and whose traversals only see relationships valid
//! at that version.
//!
//! # Example
//!
//! ```rust
//! use chronograph::models::{PropertyValue, Version};
//! use chronograph::storage::{GraphTransaction, GraphWrite};
//! use chronograph::{VersionContext, VersionedGraph};
//!
//! # fn main() -> chronograph::Result<()> {
//! let graph = VersionedGraph::in_memory()?;
//! let mut tx = graph.begin_tx()?;
//! let node = tx.create_node();
//! tx.set_property(node.into(), "status", PropertyValue::from("draft"))?;
//! tx.commit()?;
//!
//! let mut tx = graph.begin_tx()?;
//! VersionContext::new(Version::new(1)).delete_node(&mut tx, node)?;
//! tx.commit()?;
//!
//! let snapshot = graph.snapshot()?;
//! assert!(graph.version_context(Version::new(1)).for_node(&snapshot, node).is_ok());
//! assert!(graph.version_context(Version::new(2)).for_node(&snapshot, node).is_err());
//! # Ok(())
//! # }
//! ```

use crate::models::version::{DELETED, is_internal_key};
use crate::models::{
    Direction, EntityRef, NodeId, PropertyValue, Range, Relationship, RelationshipId,
    RelationshipType, Version,
};
use crate::services::resolution::{
    node_visible, relationship_visible, resolve_holder, validity,
};
use crate::storage::{GraphRead, GraphWrite};
use crate::{Error, Result};
use std::fmt;

/// Read scope bound to one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionContext {
    version: Version,
    strict_endpoints: bool,
}

impl VersionContext {
    /// Creates a context reading at `version`.
    #[must_use]
    pub const fn new(version: Version) -> Self {
        Self {
            version,
            strict_endpoints: false,
        }
    }

    /// Also requires the far endpoint of a relationship to exist at the
    /// context version before the relationship counts as adjacent.
    #[must_use]
    pub const fn strict_endpoints(mut self, strict: bool) -> Self {
        self.strict_endpoints = strict;
        self
    }

    /// Returns the context version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns true if endpoint checks are enabled.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict_endpoints
    }

    /// Returns a view of `node` at the context version.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionNotFound`] if the node did not exist at the version
    /// - [`Error::MissingVersionStamp`] if the node was never stamped
    pub fn for_node<'g, G: GraphRead + ?Sized>(
        &self,
        graph: &'g G,
        node: NodeId,
    ) -> Result<VersionedNode<'g, G>> {
        let holder = resolve_holder(graph, node, self.version)?;
        let holder = if holder == node {
            PropertyHolder::Live(node)
        } else {
            PropertyHolder::Snapshot {
                live: node,
                snapshot: holder,
            }
        };
        Ok(VersionedNode {
            graph,
            context: *self,
            holder,
        })
    }

    /// Returns a view of `relationship` at the context version.
    ///
    /// In strict mode both endpoints must exist at the version as well.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionNotFound`] if the relationship is not visible
    /// - [`Error::MissingVersionStamp`] if the relationship was never stamped
    pub fn for_relationship<'g, G: GraphRead + ?Sized>(
        &self,
        graph: &'g G,
        relationship: RelationshipId,
    ) -> Result<VersionedRelationship<'g, G>> {
        let structure = graph.relationship(relationship)?;
        let mut visible = !structure.rel_type.is_prev_version()
            && validity(graph, relationship.into())?.contains(self.version.value());
        if visible && self.strict_endpoints {
            visible = node_visible(graph, structure.start, self.version)?
                && node_visible(graph, structure.end, self.version)?;
        }
        if !visible {
            return Err(Error::VersionNotFound(self.version));
        }
        self.relationship_view(graph, structure)
    }

    /// Marks `node` deleted. Its validity closes when `tx` commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist.
    pub fn delete_node<W: GraphWrite + ?Sized>(&self, tx: &mut W, node: NodeId) -> Result<()> {
        tx.set_property(node.into(), DELETED, self.marker()?)
    }

    /// Marks `relationship` deleted. Its validity closes when `tx` commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the relationship does not exist.
    pub fn delete_relationship<W: GraphWrite + ?Sized>(
        &self,
        tx: &mut W,
        relationship: RelationshipId,
    ) -> Result<()> {
        tx.set_property(relationship.into(), DELETED, self.marker()?)
    }

    fn marker(&self) -> Result<PropertyValue> {
        i64::try_from(self.version.value())
            .map(PropertyValue::Int)
            .map_err(|_| Error::InvalidInput(format!("version {} out of range", self.version)))
    }

    fn relationship_view<'g, G: GraphRead + ?Sized>(
        &self,
        graph: &'g G,
        structure: Relationship,
    ) -> Result<VersionedRelationship<'g, G>> {
        let validity = validity(graph, structure.id.into())?;
        Ok(VersionedRelationship {
            graph,
            context: *self,
            structure,
            validity,
        })
    }
}

/// Where a versioned node's properties are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyHolder {
    /// The live node is valid at the version.
    Live(NodeId),
    /// A historic snapshot in the live node's chain is valid at the version.
    Snapshot {
        /// The logical node.
        live: NodeId,
        /// The snapshot holding the properties.
        snapshot: NodeId,
    },
}

impl PropertyHolder {
    /// Returns the logical node id.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        match self {
            Self::Live(node) | Self::Snapshot { live: node, .. } => *node,
        }
    }

    /// Returns the node the properties are read from.
    #[must_use]
    pub const fn holder(&self) -> NodeId {
        match self {
            Self::Live(node) | Self::Snapshot { snapshot: node, .. } => *node,
        }
    }

    /// Returns true if reads go to the live node.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// A node as it was at one version.
pub struct VersionedNode<'g, G: GraphRead + ?Sized> {
    graph: &'g G,
    context: VersionContext,
    holder: PropertyHolder,
}

impl<G: GraphRead + ?Sized> fmt::Debug for VersionedNode<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedNode")
            .field("context", &self.context)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

impl<'g, G: GraphRead + ?Sized> VersionedNode<'g, G> {
    /// Returns the logical node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.holder.node()
    }

    /// Returns the property holder.
    #[must_use]
    pub const fn holder(&self) -> PropertyHolder {
        self.holder
    }

    /// Returns the context this view was resolved in.
    #[must_use]
    pub const fn context(&self) -> VersionContext {
        self.context
    }

    /// Returns the validity range of the resolved holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the holder's stamps cannot be read.
    pub fn validity(&self) -> Result<Range> {
        validity(self.graph, self.holder.holder().into())
    }

    /// Reads a property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PropertyNotFound`] if the key is absent at the
    /// version.
    pub fn property(&self, key: &str) -> Result<PropertyValue> {
        read_visible(self.graph, self.holder.holder().into(), self.id().into(), key)
    }

    /// Reads a property, falling back to `default` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store read fails.
    pub fn property_or(&self, key: &str, default: PropertyValue) -> Result<PropertyValue> {
        match self.property(key) {
            Err(Error::PropertyNotFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Checks whether a property exists at the version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn has_property(&self, key: &str) -> Result<bool> {
        if is_internal_key(key) {
            return Ok(false);
        }
        Ok(self
            .graph
            .property(self.holder.holder().into(), key)?
            .is_some())
    }

    /// Lists property keys at the version, internal keys excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn property_keys(&self) -> Result<Vec<String>> {
        visible_keys(self.graph, self.holder.holder().into())
    }

    /// Iterates property values at the version, in key order.
    ///
    /// Values are read lazily through the same holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be listed.
    pub fn property_values(&self) -> Result<PropertyValues<'g, G>> {
        Ok(PropertyValues {
            graph: self.graph,
            source: self.holder.holder().into(),
            owner: self.id().into(),
            keys: self.property_keys()?.into_iter(),
        })
    }

    /// Lists relationships of any of `rel_types` visible at the version.
    ///
    /// An empty `rel_types` matches every type. Relationships always hang
    /// off the live node. Chain links and relationships without stamps are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the traversal or a validity read fails.
    pub fn relationships(
        &self,
        direction: Direction,
        rel_types: &[RelationshipType],
    ) -> Result<Vec<VersionedRelationship<'g, G>>> {
        let node = self.id();
        let filter = match rel_types {
            [only] => Some(only),
            _ => None,
        };
        let mut visible = Vec::new();
        for id in self.graph.relationships(node, direction, filter)? {
            let structure = self.graph.relationship(id)?;
            if structure.rel_type.is_prev_version()
                || (!rel_types.is_empty() && !rel_types.contains(&structure.rel_type))
                || !relationship_visible(self.graph, id, self.context.version)?
            {
                continue;
            }
            if self.context.strict_endpoints {
                let far = structure.other_node(node).unwrap_or(node);
                if !node_visible(self.graph, far, self.context.version)? {
                    continue;
                }
            }
            visible.push(self.context.relationship_view(self.graph, structure)?);
        }
        Ok(visible)
    }

    /// Checks whether any relationship of `rel_types` is visible at the
    /// version. An empty `rel_types` matches every type.
    ///
    /// # Errors
    ///
    /// Returns an error if the traversal fails.
    pub fn has_relationship(
        &self,
        direction: Direction,
        rel_types: &[RelationshipType],
    ) -> Result<bool> {
        Ok(!self.relationships(direction, rel_types)?.is_empty())
    }

    /// Returns the only relationship of a type and direction, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousSingleRelationship`] if more than one
    /// relationship matches at the version.
    pub fn single_relationship(
        &self,
        rel_type: &RelationshipType,
        direction: Direction,
    ) -> Result<Option<VersionedRelationship<'g, G>>> {
        let mut matches = self.relationships(direction, std::slice::from_ref(rel_type))?;
        if matches.len() > 1 {
            return Err(Error::AmbiguousSingleRelationship {
                node: self.id(),
                rel_type: rel_type.clone(),
                direction,
                version: self.context.version,
            });
        }
        Ok(matches.pop())
    }
}

/// Lazy projection of a holder's keys to values.
pub struct PropertyValues<'g, G: GraphRead + ?Sized> {
    graph: &'g G,
    source: EntityRef,
    owner: EntityRef,
    keys: std::vec::IntoIter<String>,
}

impl<G: GraphRead + ?Sized> Iterator for PropertyValues<'_, G> {
    type Item = Result<PropertyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(read_visible(self.graph, self.source, self.owner, &key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// A relationship as seen at one version.
///
/// Relationship properties are not rotated; reads return their current
/// values.
pub struct VersionedRelationship<'g, G: GraphRead + ?Sized> {
    graph: &'g G,
    context: VersionContext,
    structure: Relationship,
    validity: Range,
}

impl<G: GraphRead + ?Sized> fmt::Debug for VersionedRelationship<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedRelationship")
            .field("context", &self.context)
            .field("structure", &self.structure)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl<'g, G: GraphRead + ?Sized> VersionedRelationship<'g, G> {
    /// Returns the relationship id.
    #[must_use]
    pub const fn id(&self) -> RelationshipId {
        self.structure.id
    }

    /// Returns the relationship type.
    #[must_use]
    pub const fn rel_type(&self) -> &RelationshipType {
        &self.structure.rel_type
    }

    /// Returns the relationship's validity range.
    #[must_use]
    pub const fn validity(&self) -> Range {
        self.validity
    }

    /// Returns the start node id.
    #[must_use]
    pub const fn start_node_id(&self) -> NodeId {
        self.structure.start
    }

    /// Returns the end node id.
    #[must_use]
    pub const fn end_node_id(&self) -> NodeId {
        self.structure.end
    }

    /// Returns the endpoint opposite to `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `node` is not an endpoint.
    pub fn other_node_id(&self, node: NodeId) -> Result<NodeId> {
        self.structure.other_node(node).ok_or_else(|| {
            Error::InvalidInput(format!("{node} is not an endpoint of {}", self.id()))
        })
    }

    /// Returns the start node at the same version.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not resolve at the version.
    pub fn start_node(&self) -> Result<VersionedNode<'g, G>> {
        self.context.for_node(self.graph, self.structure.start)
    }

    /// Returns the end node at the same version.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not resolve at the version.
    pub fn end_node(&self) -> Result<VersionedNode<'g, G>> {
        self.context.for_node(self.graph, self.structure.end)
    }

    /// Returns the endpoint opposite to `node` at the same version.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an endpoint or the other node does
    /// not resolve at the version.
    pub fn other_node(&self, node: NodeId) -> Result<VersionedNode<'g, G>> {
        self.context.for_node(self.graph, self.other_node_id(node)?)
    }

    /// Returns both endpoints, start first.
    ///
    /// # Errors
    ///
    /// Returns an error if either node does not resolve at the version.
    pub fn nodes(&self) -> Result<[VersionedNode<'g, G>; 2]> {
        Ok([self.start_node()?, self.end_node()?])
    }

    /// Reads a property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PropertyNotFound`] if the key is absent.
    pub fn property(&self, key: &str) -> Result<PropertyValue> {
        let entity = self.id().into();
        read_visible(self.graph, entity, entity, key)
    }

    /// Reads a property, falling back to `default` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store read fails.
    pub fn property_or(&self, key: &str, default: PropertyValue) -> Result<PropertyValue> {
        match self.property(key) {
            Err(Error::PropertyNotFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Checks whether a property exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn has_property(&self, key: &str) -> Result<bool> {
        if is_internal_key(key) {
            return Ok(false);
        }
        Ok(self.graph.property(self.id().into(), key)?.is_some())
    }

    /// Lists property keys, internal keys excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn property_keys(&self) -> Result<Vec<String>> {
        visible_keys(self.graph, self.id().into())
    }
}

/// Reads `key` from `source`, reporting absence against `owner`.
fn read_visible<G: GraphRead + ?Sized>(
    graph: &G,
    source: EntityRef,
    owner: EntityRef,
    key: &str,
) -> Result<PropertyValue> {
    let value = if is_internal_key(key) {
        None
    } else {
        graph.property(source, key)?
    };
    value.ok_or_else(|| Error::PropertyNotFound {
        entity: owner,
        key: key.to_string(),
    })
}

fn visible_keys<G: GraphRead + ?Sized>(graph: &G, entity: EntityRef) -> Result<Vec<String>> {
    Ok(graph
        .property_keys(entity)?
        .into_iter()
        .filter(|key| !is_internal_key(key))
        .collect())
}

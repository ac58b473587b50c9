//! # Graph Store
//!
//! The abstract persistent store behind the integrity engine, and its
//! in-memory implementation.
//!
//! The engine only ever talks to this trait: create/read/update node
//! records, link edges, bulk deletion, and group membership. Both the
//! in-memory `Graph` and the disk-backed `RedbGraph` implement it, so the
//! validation and deletion logic is backend-agnostic.
//!
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::query::NodeFilter;
use crate::types::{
    Direction, Group, LineageError, Link, LinkClass, LinkType, NodeId, NodeRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// The abstract persistent store.
///
/// Single logical writer; each method is one transaction. Referential
/// integrity of links (both endpoints exist) is the store's concern;
/// semantic link rules live in the validator and never here.
pub trait GraphStore {
    /// Persist a new node record. The record's `id` field is ignored; the
    /// store assigns and returns the next primary key.
    ///
    /// Rejects a record claiming an already-persisted UUID.
    fn create_node(&mut self, record: NodeRecord) -> Result<NodeId, LineageError>;

    /// Fetch a node record by primary key.
    fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, LineageError>;

    /// Fetch a node record by UUID.
    fn get_node_by_uuid(&self, uuid: &Uuid) -> Result<Option<NodeRecord>, LineageError>;

    /// Overwrite an existing node record (post-store mutations write back
    /// through this). The UUID and kind of a record never change.
    fn update_node(&mut self, record: &NodeRecord) -> Result<(), LineageError>;

    /// All records matching a filter, in primary-key order.
    fn query_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>, LineageError>;

    /// Persist a link. Both endpoints must exist. Creation order is a
    /// store-assigned monotonic counter.
    fn create_link(
        &mut self,
        source: NodeId,
        dest: NodeId,
        link_type: LinkType,
        label: &str,
    ) -> Result<Link, LineageError>;

    /// Delete incoming links into `dest` matching `(class, label)`.
    /// Returns how many were removed. Exists for the explicit replace
    /// operation; ordinary links are immutable once persisted.
    fn delete_incoming_links(
        &mut self,
        dest: NodeId,
        class: LinkClass,
        label: &str,
    ) -> Result<usize, LineageError>;

    /// Links touching a node in the given direction, optionally filtered
    /// by link type, in creation order.
    fn query_links(
        &self,
        node: NodeId,
        direction: Direction,
        types: Option<&[LinkType]>,
    ) -> Result<Vec<Link>, LineageError>;

    /// Every persisted link, in creation order. Used for edge views.
    fn all_links(&self) -> Result<Vec<Link>, LineageError>;

    /// Bulk-remove nodes and every link touching them, atomically. Group
    /// memberships of removed nodes are dropped as well. Returns how many
    /// node rows were removed.
    fn delete_nodes(&mut self, ids: &BTreeSet<NodeId>) -> Result<usize, LineageError>;

    fn node_count(&self) -> Result<usize, LineageError>;

    fn link_count(&self) -> Result<usize, LineageError>;

    /// Create a named group. Rejects a duplicate name.
    fn create_group(&mut self, name: &str, description: &str) -> Result<(), LineageError>;

    /// Add a node to a group. Set semantics: returns `false` when the node
    /// was already a member. Storage-state gating is the session's job.
    fn add_to_group(&mut self, name: &str, node: NodeId) -> Result<bool, LineageError>;

    /// Members of a group, in primary-key order.
    fn group_nodes(&self, name: &str) -> Result<Vec<NodeId>, LineageError>;

    /// All groups, in name order.
    fn list_groups(&self) -> Result<Vec<Group>, LineageError>;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// The in-memory graph store.
///
/// Outgoing and incoming adjacency are maintained separately for O(1)
/// traversal in both directions; links are integer-indexed rows, never
/// object references.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: NodeId -> record
    nodes: BTreeMap<NodeId, NodeRecord>,

    /// Reverse lookup: Uuid -> NodeId
    uuid_index: BTreeMap<Uuid, NodeId>,

    /// Adjacency: source -> links leaving it, in creation order
    outgoing: BTreeMap<NodeId, Vec<Link>>,

    /// Adjacency: dest -> links entering it, in creation order
    incoming: BTreeMap<NodeId, Vec<Link>>,

    /// Groups by name
    groups: BTreeMap<String, Group>,

    /// Next available NodeId
    next_node_id: u64,

    /// Next link creation-order counter
    next_link_order: u64,
}

impl Graph {
    /// Create a new empty graph store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn require_node(&self, id: NodeId) -> Result<(), LineageError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(LineageError::NotExistent(format!(
                "no node with id {}",
                id.0
            )))
        }
    }
}

impl GraphStore for Graph {
    fn create_node(&mut self, record: NodeRecord) -> Result<NodeId, LineageError> {
        if self.uuid_index.contains_key(&record.uuid) {
            return Err(LineageError::Structural(format!(
                "a node with UUID {} already exists",
                record.uuid
            )));
        }

        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);

        let mut record = record;
        record.id = id;
        self.uuid_index.insert(record.uuid, id);
        self.nodes.insert(id, record);
        Ok(id)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, LineageError> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn get_node_by_uuid(&self, uuid: &Uuid) -> Result<Option<NodeRecord>, LineageError> {
        Ok(self
            .uuid_index
            .get(uuid)
            .and_then(|id| self.nodes.get(id))
            .cloned())
    }

    fn update_node(&mut self, record: &NodeRecord) -> Result<(), LineageError> {
        let existing = self.nodes.get_mut(&record.id).ok_or_else(|| {
            LineageError::NotExistent(format!("no node with id {}", record.id.0))
        })?;
        *existing = record.clone();
        Ok(())
    }

    fn query_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>, LineageError> {
        Ok(self
            .nodes
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn create_link(
        &mut self,
        source: NodeId,
        dest: NodeId,
        link_type: LinkType,
        label: &str,
    ) -> Result<Link, LineageError> {
        self.require_node(source)?;
        self.require_node(dest)?;

        let link = Link {
            source,
            dest,
            link_type,
            label: label.to_string(),
            order: self.next_link_order,
        };
        self.next_link_order = self.next_link_order.saturating_add(1);

        self.outgoing.entry(source).or_default().push(link.clone());
        self.incoming.entry(dest).or_default().push(link.clone());
        Ok(link)
    }

    fn delete_incoming_links(
        &mut self,
        dest: NodeId,
        class: LinkClass,
        label: &str,
    ) -> Result<usize, LineageError> {
        self.require_node(dest)?;

        let matches =
            |l: &Link| l.dest == dest && l.link_type.class() == class && l.label == label;

        let removed = match self.incoming.get_mut(&dest) {
            Some(links) => {
                let before = links.len();
                links.retain(|l| !matches(l));
                before - links.len()
            }
            None => 0,
        };
        if removed > 0 {
            for links in self.outgoing.values_mut() {
                links.retain(|l| !matches(l));
            }
        }
        Ok(removed)
    }

    fn query_links(
        &self,
        node: NodeId,
        direction: Direction,
        types: Option<&[LinkType]>,
    ) -> Result<Vec<Link>, LineageError> {
        let side = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        Ok(side
            .get(&node)
            .into_iter()
            .flatten()
            .filter(|l| types.is_none_or(|ts| ts.contains(&l.link_type)))
            .cloned()
            .collect())
    }

    fn all_links(&self) -> Result<Vec<Link>, LineageError> {
        let mut links: Vec<Link> = self.outgoing.values().flatten().cloned().collect();
        links.sort_by_key(|l| l.order);
        Ok(links)
    }

    fn delete_nodes(&mut self, ids: &BTreeSet<NodeId>) -> Result<usize, LineageError> {
        // Links first: no edge may survive pointing at a removed node.
        let touches = |l: &Link| ids.contains(&l.source) || ids.contains(&l.dest);
        for links in self.outgoing.values_mut() {
            links.retain(|l| !touches(l));
        }
        for links in self.incoming.values_mut() {
            links.retain(|l| !touches(l));
        }

        let mut removed = 0;
        for id in ids {
            if let Some(record) = self.nodes.remove(id) {
                self.uuid_index.remove(&record.uuid);
                self.outgoing.remove(id);
                self.incoming.remove(id);
                removed += 1;
            }
        }
        for group in self.groups.values_mut() {
            group.members.retain(|m| !ids.contains(m));
        }
        Ok(removed)
    }

    fn node_count(&self) -> Result<usize, LineageError> {
        Ok(self.nodes.len())
    }

    fn link_count(&self) -> Result<usize, LineageError> {
        Ok(self.outgoing.values().map(Vec::len).sum())
    }

    fn create_group(&mut self, name: &str, description: &str) -> Result<(), LineageError> {
        if self.groups.contains_key(name) {
            return Err(LineageError::Structural(format!(
                "a group named `{name}` already exists"
            )));
        }
        self.groups
            .insert(name.to_string(), Group::new(name, description));
        Ok(())
    }

    fn add_to_group(&mut self, name: &str, node: NodeId) -> Result<bool, LineageError> {
        self.require_node(node)?;
        let group = self.groups.get_mut(name).ok_or_else(|| {
            LineageError::NotExistent(format!("no group named `{name}`"))
        })?;
        Ok(group.members.insert(node))
    }

    fn group_nodes(&self, name: &str) -> Result<Vec<NodeId>, LineageError> {
        let group = self
            .groups
            .get(name)
            .ok_or_else(|| LineageError::NotExistent(format!("no group named `{name}`")))?;
        Ok(group.members.iter().copied().collect())
    }

    fn list_groups(&self) -> Result<Vec<Group>, LineageError> {
        Ok(self.groups.values().cloned().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

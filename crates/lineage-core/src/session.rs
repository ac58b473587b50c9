//! # Session
//!
//! The single-writer orchestrator tying the engine together: an arena of
//! in-memory node handles over a storage backend plus a file repository.
//!
//! All graph mutations flow through here in a fixed order:
//! validation first (link rules, then the cycle check over the combined
//! persisted-plus-cached edge view), persistence second. A link whose
//! endpoints are not both stored is cached on its destination handle and
//! flushed automatically as soon as storage catches up.
//!
//! One session, one logical writer. Concurrent mutation is out of scope;
//! redb's MVCC protects the file, not the session's arena.

use crate::deletion::{self, DeletionPolicy};
use crate::graph::{Graph, GraphStore};
use crate::integrity::check_acyclic;
use crate::links::{validate_link, EndpointView, LinkProposal};
use crate::node::{CachedLink, Node};
use crate::query::NodeFilter;
use crate::repository::{FileRepository, MemoryRepository};
use crate::storage::RedbGraph;
use crate::types::{
    Direction, Group, LineageError, Link, LinkClass, LinkType, NodeId, NodeKind, NodeRecord,
    ProcessState,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// The store a session writes through.
pub enum StorageBackend {
    /// Ephemeral, for tests and scratch work.
    Memory(Graph),
    /// Disk-backed redb database.
    Persistent(RedbGraph),
}

impl StorageBackend {
    fn as_store(&self) -> &dyn GraphStore {
        match self {
            Self::Memory(graph) => graph,
            Self::Persistent(graph) => graph,
        }
    }

    fn as_store_mut(&mut self) -> &mut dyn GraphStore {
        match self {
            Self::Memory(graph) => graph,
            Self::Persistent(graph) => graph,
        }
    }
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("StorageBackend::Memory"),
            Self::Persistent(_) => f.write_str("StorageBackend::Persistent"),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A provenance-graph session.
pub struct Session {
    backend: StorageBackend,
    /// In-memory handles by UUID; transient nodes live only here.
    nodes: BTreeMap<Uuid, Node>,
    repository: Box<dyn FileRepository>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .field("arena_size", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over an explicit backend with an in-memory repository.
    #[must_use]
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            nodes: BTreeMap::new(),
            repository: Box::new(MemoryRepository::new()),
        }
    }

    /// Fully ephemeral session.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(StorageBackend::Memory(Graph::new()))
    }

    /// Session over a redb database at the given path.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, LineageError> {
        Ok(Self::new(StorageBackend::Persistent(RedbGraph::open(
            path,
        )?)))
    }

    /// Swap in a different file repository implementation.
    #[must_use]
    pub fn with_repository(mut self, repository: Box<dyn FileRepository>) -> Self {
        self.repository = repository;
        self
    }

    // =========================================================================
    // NODE CREATION & ACCESS
    // =========================================================================

    /// Create a new transient node and return its UUID.
    pub fn create_node(&mut self, kind: NodeKind) -> Uuid {
        let node = Node::new(kind);
        let uuid = node.uuid();
        self.nodes.insert(uuid, node);
        uuid
    }

    /// Adopt an externally built handle (imports, caller-supplied UUIDs).
    pub fn add_node(&mut self, node: Node) -> Uuid {
        let uuid = node.uuid();
        self.nodes.insert(uuid, node);
        uuid
    }

    /// Borrow a handle from the arena.
    pub fn node(&self, uuid: &Uuid) -> Result<&Node, LineageError> {
        self.nodes
            .get(uuid)
            .ok_or_else(|| LineageError::NotExistent(format!("no node {uuid} in this session")))
    }

    /// Pull a node into the arena, reading from the store if necessary.
    pub fn load(&mut self, uuid: &Uuid) -> Result<&Node, LineageError> {
        self.ensure_in_arena(uuid)?;
        self.node(uuid)
    }

    /// Resolve a UUID prefix to exactly one stored node and load it.
    ///
    /// Zero matches is `NotExistent`; more than one is `MultipleObjects`.
    pub fn load_by_uuid_prefix(&mut self, prefix: &str) -> Result<Uuid, LineageError> {
        let mut matches = self
            .backend
            .as_store()
            .query_nodes(&NodeFilter::by_uuid_prefix(prefix))?;
        match matches.len() {
            0 => Err(LineageError::NotExistent(format!(
                "no stored node matches UUID prefix `{prefix}`"
            ))),
            1 => {
                let record = matches.remove(0);
                let uuid = record.uuid;
                self.nodes
                    .entry(uuid)
                    .or_insert_with(|| Node::from_record(record));
                Ok(uuid)
            }
            n => Err(LineageError::MultipleObjects(format!(
                "{n} stored nodes match UUID prefix `{prefix}`"
            ))),
        }
    }

    /// Stored records matching a filter.
    pub fn query(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>, LineageError> {
        self.backend.as_store().query_nodes(filter)
    }

    /// Persisted links touching a stored node.
    pub fn links_of(
        &self,
        uuid: &Uuid,
        direction: Direction,
    ) -> Result<Vec<Link>, LineageError> {
        let id = self.stored_id(uuid)?;
        self.backend.as_store().query_links(id, direction, None)
    }

    pub fn node_count(&self) -> Result<usize, LineageError> {
        self.backend.as_store().node_count()
    }

    pub fn link_count(&self) -> Result<usize, LineageError> {
        self.backend.as_store().link_count()
    }

    // =========================================================================
    // MUTATION PASSTHROUGHS
    // =========================================================================
    //
    // Each passthrough applies the node-level gate, then writes the updated
    // record back to the store when the node is already persisted, so disk
    // never lags the arena.

    pub fn set_attribute(
        &mut self,
        uuid: &Uuid,
        key: &str,
        value: Value,
    ) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.set_attribute(key, value))
    }

    pub fn delete_attribute(&mut self, uuid: &Uuid, key: &str) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.delete_attribute(key))
    }

    pub fn set_extra(&mut self, uuid: &Uuid, key: &str, value: Value) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.set_extra(key, value))
    }

    pub fn delete_extra(&mut self, uuid: &Uuid, key: &str) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.delete_extra(key))
    }

    pub fn set_label(&mut self, uuid: &Uuid, label: &str) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.set_label(label))
    }

    pub fn set_description(&mut self, uuid: &Uuid, description: &str) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| {
            node.set_description(description);
            Ok(())
        })
    }

    pub fn set_process_state(
        &mut self,
        uuid: &Uuid,
        state: ProcessState,
    ) -> Result<(), LineageError> {
        self.with_node_mut(uuid, |node| node.set_process_state(state))
    }

    /// Seal a stored process node. Idempotent.
    pub fn seal(&mut self, uuid: &Uuid) -> Result<(), LineageError> {
        self.with_node_mut(uuid, Node::seal)
    }

    // =========================================================================
    // STORAGE
    // =========================================================================

    /// Persist a node. Idempotent: storing a stored node returns its id.
    ///
    /// Every cached incoming link of the node must already have a stored
    /// source; otherwise the stored node would silently shed its links.
    /// After the node gains its primary key, every cached link in the arena
    /// whose endpoints are now both stored is flushed to the store.
    pub fn store(&mut self, uuid: &Uuid) -> Result<NodeId, LineageError> {
        {
            let node = self.node(uuid)?;
            if node.is_stored() {
                return node.id().ok_or_else(|| {
                    LineageError::NotExistent(format!("stored node {uuid} has no id"))
                });
            }
            if !node.kind().is_storable() {
                return Err(LineageError::StoringNotAllowed(format!(
                    "{:?} nodes cannot be persisted",
                    node.kind()
                )));
            }
            for link in node.cached_incoming() {
                let source_stored = match self.nodes.get(&link.source) {
                    Some(source) => source.is_stored(),
                    None => self
                        .backend
                        .as_store()
                        .get_node_by_uuid(&link.source)?
                        .is_some(),
                };
                if !source_stored {
                    return Err(LineageError::ModificationNotAllowed(format!(
                        "cannot store {uuid}: link source {} is not stored \
                         (store it first, or use store_all)",
                        link.source
                    )));
                }
            }
        }

        let record = self.node(uuid)?.to_new_record();
        let id = self.backend.as_store_mut().create_node(record)?;
        self.node_mut(uuid)?.mark_stored(id)?;
        self.flush_cached_links()?;
        Ok(id)
    }

    /// Persist a node together with its unstored cached-link ancestry,
    /// sources first, so every flushed link finds both endpoints stored.
    pub fn store_all(&mut self, uuid: &Uuid) -> Result<NodeId, LineageError> {
        let sources: Vec<Uuid> = self
            .node(uuid)?
            .cached_incoming()
            .iter()
            .map(|link| link.source)
            .collect();
        for source in sources {
            let unstored = self
                .nodes
                .get(&source)
                .is_some_and(|node| !node.is_stored());
            if unstored {
                self.store_all(&source)?;
            }
        }
        self.store(uuid)
    }

    // =========================================================================
    // LINKS
    // =========================================================================

    /// Add an incoming link `source -> dest`.
    ///
    /// Validation order: link rule table, then the cycle check over the
    /// combined edge view. A link passing both is persisted immediately if
    /// both endpoints are stored, and cached on the destination otherwise.
    pub fn add_incoming(
        &mut self,
        source: &Uuid,
        dest: &Uuid,
        link_type: LinkType,
        label: &str,
    ) -> Result<(), LineageError> {
        self.ensure_in_arena(source)?;
        self.ensure_in_arena(dest)?;

        let source_node = self.node(source)?;
        let dest_node = self.node(dest)?;
        let proposal_source = Self::view_of(source_node);
        let proposal_dest = Self::view_of(dest_node);
        let source_id = source_node.is_stored().then(|| source_node.id()).flatten();
        let dest_id = dest_node.is_stored().then(|| dest_node.id()).flatten();

        let existing = self.incoming_label_view(dest)?;
        validate_link(&LinkProposal {
            source: proposal_source,
            dest: proposal_dest,
            link_type,
            label,
            existing_incoming: &existing,
        })?;

        let edges = self.edge_view()?;
        check_acyclic(&edges, *source, *dest)?;

        match (source_id, dest_id) {
            (Some(src), Some(dst)) => {
                self.backend
                    .as_store_mut()
                    .create_link(src, dst, link_type, label)?;
            }
            _ => {
                self.node_mut(dest)?.cache_incoming(CachedLink {
                    source: *source,
                    link_type,
                    label: label.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Replace the incoming link of `dest` in `link_type`'s class under
    /// `label` with a new one from `source`.
    ///
    /// Only legal while the destination is an unsealed process in its
    /// initial state; links are otherwise immutable once made.
    pub fn replace_incoming(
        &mut self,
        source: &Uuid,
        dest: &Uuid,
        link_type: LinkType,
        label: &str,
    ) -> Result<(), LineageError> {
        self.ensure_in_arena(dest)?;

        let (dest_id, class) = {
            let node = self.node(dest)?;
            if !node.kind().is_process() {
                return Err(LineageError::Structural(format!(
                    "incoming links of {:?} nodes cannot be replaced",
                    node.kind()
                )));
            }
            if node.is_sealed() {
                return Err(LineageError::ModificationNotAllowed(format!(
                    "node {dest} is sealed"
                )));
            }
            let accepts = node
                .process_state()
                .is_none_or(ProcessState::accepts_inputs);
            if !accepts {
                return Err(LineageError::ModificationNotAllowed(format!(
                    "process {dest} is past its initial state; links are frozen"
                )));
            }
            (
                node.is_stored().then(|| node.id()).flatten(),
                link_type.class(),
            )
        };

        if let Some(id) = dest_id {
            self.backend
                .as_store_mut()
                .delete_incoming_links(id, class, label)?;
        }
        self.node_mut(dest)?
            .retain_cached_incoming(|link| {
                !(link.link_type.class() == class && link.label == label)
            });

        self.add_incoming(source, dest, link_type, label)
    }

    // =========================================================================
    // DELETION
    // =========================================================================

    /// Delete stored nodes and their policy-determined descendants.
    ///
    /// Returns the UUIDs actually removed. Arena handles, cached links and
    /// repository files of removed nodes are dropped as well.
    pub fn delete_nodes(
        &mut self,
        seeds: &[Uuid],
        policy: DeletionPolicy,
    ) -> Result<BTreeSet<Uuid>, LineageError> {
        let mut seed_ids = BTreeSet::new();
        for uuid in seeds {
            seed_ids.insert(self.stored_id(uuid)?);
        }

        let doomed = deletion::collect(self.backend.as_store(), &seed_ids, policy)?;
        deletion::warn_dangling_callers(self.backend.as_store(), &doomed)?;

        let mut doomed_uuids = BTreeSet::new();
        for &id in &doomed {
            if let Some(record) = self.backend.as_store().get_node(id)? {
                doomed_uuids.insert(record.uuid);
            }
        }

        self.backend.as_store_mut().delete_nodes(&doomed)?;

        for uuid in &doomed_uuids {
            self.nodes.remove(uuid);
            self.repository.delete_files(*uuid)?;
        }
        for node in self.nodes.values_mut() {
            node.retain_cached_incoming(|link| !doomed_uuids.contains(&link.source));
        }
        Ok(doomed_uuids)
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    pub fn create_group(&mut self, name: &str, description: &str) -> Result<(), LineageError> {
        self.backend.as_store_mut().create_group(name, description)
    }

    /// Add a stored node to a group. Set semantics: re-adding returns false.
    pub fn add_to_group(&mut self, name: &str, uuid: &Uuid) -> Result<bool, LineageError> {
        if let Some(node) = self.nodes.get(uuid) {
            if !node.is_stored() {
                return Err(LineageError::ModificationNotAllowed(format!(
                    "node {uuid} must be stored before joining a group"
                )));
            }
        }
        let id = self.stored_id(uuid)?;
        self.backend.as_store_mut().add_to_group(name, id)
    }

    /// Members of a group as UUIDs.
    pub fn group_members(&self, name: &str) -> Result<Vec<Uuid>, LineageError> {
        let mut members = Vec::new();
        for id in self.backend.as_store().group_nodes(name)? {
            if let Some(record) = self.backend.as_store().get_node(id)? {
                members.push(record.uuid);
            }
        }
        Ok(members)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, LineageError> {
        self.backend.as_store().list_groups()
    }

    // =========================================================================
    // REPOSITORY
    // =========================================================================

    /// Attach a file to an unstored node. Repository content freezes with
    /// the node at storage time.
    pub fn attach_file(
        &mut self,
        uuid: &Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<(), LineageError> {
        let stored = match self.nodes.get(uuid) {
            Some(node) => node.is_stored(),
            None => self
                .backend
                .as_store()
                .get_node_by_uuid(uuid)?
                .ok_or_else(|| {
                    LineageError::NotExistent(format!("no node {uuid} in this session"))
                })
                .map(|_| true)?,
        };
        if stored {
            return Err(LineageError::ModificationNotAllowed(format!(
                "repository content of {uuid} is frozen; the node is stored"
            )));
        }
        self.repository.put_file(*uuid, name, content)
    }

    pub fn node_file(&self, uuid: &Uuid, name: &str) -> Result<Vec<u8>, LineageError> {
        self.repository.get_file(*uuid, name)
    }

    pub fn list_node_files(&self, uuid: &Uuid) -> Result<Vec<String>, LineageError> {
        self.repository.list_files(*uuid)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn node_mut(&mut self, uuid: &Uuid) -> Result<&mut Node, LineageError> {
        self.nodes
            .get_mut(uuid)
            .ok_or_else(|| LineageError::NotExistent(format!("no node {uuid} in this session")))
    }

    /// Apply a mutation to an arena node, then write the record back to the
    /// store if the node is already persisted.
    fn with_node_mut<R>(
        &mut self,
        uuid: &Uuid,
        mutate: impl FnOnce(&mut Node) -> Result<R, LineageError>,
    ) -> Result<R, LineageError> {
        self.ensure_in_arena(uuid)?;
        let node = self.node_mut(uuid)?;
        let result = mutate(node)?;
        if node.is_stored() {
            let record = node.to_record()?;
            self.backend.as_store_mut().update_node(&record)?;
        }
        Ok(result)
    }

    /// Materialize a store-resident node in the arena if it is not there yet.
    fn ensure_in_arena(&mut self, uuid: &Uuid) -> Result<(), LineageError> {
        if self.nodes.contains_key(uuid) {
            return Ok(());
        }
        let record = self
            .backend
            .as_store()
            .get_node_by_uuid(uuid)?
            .ok_or_else(|| {
                LineageError::NotExistent(format!("no node {uuid} in this session"))
            })?;
        self.nodes.insert(*uuid, Node::from_record(record));
        Ok(())
    }

    fn stored_id(&self, uuid: &Uuid) -> Result<NodeId, LineageError> {
        if let Some(node) = self.nodes.get(uuid) {
            if let Some(id) = node.id() {
                return Ok(id);
            }
        }
        self.backend
            .as_store()
            .get_node_by_uuid(uuid)?
            .map(|record| record.id)
            .ok_or_else(|| LineageError::NotExistent(format!("no stored node {uuid}")))
    }

    fn view_of(node: &Node) -> EndpointView {
        EndpointView {
            uuid: node.uuid(),
            kind: node.kind(),
            sealed: node.is_sealed(),
            process_state: node.process_state(),
        }
    }

    /// The destination's incoming labels, persisted and cached combined.
    fn incoming_label_view(
        &self,
        dest: &Uuid,
    ) -> Result<Vec<(LinkClass, String)>, LineageError> {
        let mut pairs = Vec::new();
        if let Some(node) = self.nodes.get(dest) {
            if node.is_stored() {
                if let Some(id) = node.id() {
                    for link in
                        self.backend
                            .as_store()
                            .query_links(id, Direction::Incoming, None)?
                    {
                        pairs.push((link.link_type.class(), link.label));
                    }
                }
            }
            for link in node.cached_incoming() {
                pairs.push((link.link_type.class(), link.label.clone()));
            }
        }
        Ok(pairs)
    }

    /// The full `(source, dest)` edge view in UUID space: every persisted
    /// link plus every cached link in the arena.
    fn edge_view(&self) -> Result<Vec<(Uuid, Uuid)>, LineageError> {
        let store = self.backend.as_store();
        let mut uuid_by_id = BTreeMap::new();
        for record in store.query_nodes(&NodeFilter::any())? {
            uuid_by_id.insert(record.id, record.uuid);
        }

        let mut edges = Vec::new();
        for link in store.all_links()? {
            if let (Some(&source), Some(&dest)) =
                (uuid_by_id.get(&link.source), uuid_by_id.get(&link.dest))
            {
                edges.push((source, dest));
            }
        }
        for node in self.nodes.values() {
            for link in node.cached_incoming() {
                edges.push((link.source, node.uuid()));
            }
        }
        Ok(edges)
    }

    /// Persist every cached link whose endpoints are both stored.
    fn flush_cached_links(&mut self) -> Result<(), LineageError> {
        let mut ready = Vec::new();
        for (dest_uuid, dest) in &self.nodes {
            if !dest.is_stored() {
                continue;
            }
            let Some(dest_id) = dest.id() else { continue };
            for link in dest.cached_incoming() {
                let source_id = self
                    .nodes
                    .get(&link.source)
                    .filter(|source| source.is_stored())
                    .and_then(Node::id);
                if let Some(source_id) = source_id {
                    ready.push((
                        *dest_uuid,
                        link.source,
                        source_id,
                        dest_id,
                        link.link_type,
                        link.label.clone(),
                    ));
                }
            }
        }

        for (dest_uuid, source_uuid, source_id, dest_id, link_type, label) in ready {
            self.backend
                .as_store_mut()
                .create_link(source_id, dest_id, link_type, &label)?;
            if let Some(dest) = self.nodes.get_mut(&dest_uuid) {
                dest.retain_cached_incoming(|link| {
                    !(link.source == source_uuid
                        && link.link_type == link_type
                        && link.label == label)
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

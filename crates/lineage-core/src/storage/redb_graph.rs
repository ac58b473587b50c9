//! # redb-backed Graph Storage
//!
//! A disk-backed graph store using the redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! ## Integration with Session
//!
//! `RedbGraph` is a drop-in persistent backend for sessions. Unlike the
//! in-memory `Graph`, everything written here survives process exit; a
//! reopened database resumes id and link-order counters where it left off.
//!
//! ## Encoding
//!
//! Node rows are postcard-encoded `RawNode` values. Attribute and extras
//! maps hold arbitrary JSON documents, which postcard cannot represent
//! (`serde_json::Value` requires self-describing deserialization), so the
//! two maps travel as JSON strings inside the postcard envelope. Links and
//! groups contain no JSON values and are postcard-encoded directly.

use crate::graph::GraphStore;
use crate::primitives::SCHEMA_VERSION;
use crate::query::NodeFilter;
use crate::types::{
    Direction, Group, LineageError, Link, LinkClass, LinkType, NodeId, NodeKind, NodeRecord,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

/// Table for nodes: NodeId(u64) -> serialized RawNode bytes
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for the UUID index: uuid(u128) -> NodeId(u64)
const UUID_INDEX: TableDefinition<u128, u64> = TableDefinition::new("uuid_index");

/// Table for links: creation order(u64) -> serialized Link bytes
const LINKS: TableDefinition<u64, &[u8]> = TableDefinition::new("links");

/// Table for groups: name -> serialized Group bytes
const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn io_err(e: impl std::fmt::Display) -> LineageError {
    LineageError::Io(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> LineageError {
    LineageError::Serialization(e.to_string())
}

// =============================================================================
// ON-DISK NODE ENVELOPE
// =============================================================================

/// The postcard-friendly on-disk form of a node row.
#[derive(Debug, Serialize, Deserialize)]
struct RawNode {
    id: u64,
    uuid: u128,
    kind: NodeKind,
    label: String,
    description: String,
    version: u64,
    attributes_json: String,
    extras_json: String,
}

impl RawNode {
    fn from_record(record: &NodeRecord) -> Result<Self, LineageError> {
        Ok(Self {
            id: record.id.0,
            uuid: record.uuid.as_u128(),
            kind: record.kind,
            label: record.label.clone(),
            description: record.description.clone(),
            version: record.version,
            attributes_json: serde_json::to_string(&record.attributes).map_err(ser_err)?,
            extras_json: serde_json::to_string(&record.extras).map_err(ser_err)?,
        })
    }

    fn into_record(self) -> Result<NodeRecord, LineageError> {
        Ok(NodeRecord {
            id: NodeId(self.id),
            uuid: Uuid::from_u128(self.uuid),
            kind: self.kind,
            label: self.label,
            description: self.description,
            version: self.version,
            attributes: serde_json::from_str(&self.attributes_json).map_err(ser_err)?,
            extras: serde_json::from_str(&self.extras_json).map_err(ser_err)?,
        })
    }
}

fn decode_node(bytes: &[u8]) -> Result<NodeRecord, LineageError> {
    postcard::from_bytes::<RawNode>(bytes)
        .map_err(ser_err)?
        .into_record()
}

fn encode_node(record: &NodeRecord) -> Result<Vec<u8>, LineageError> {
    postcard::to_allocvec(&RawNode::from_record(record)?).map_err(ser_err)
}

// =============================================================================
// REDB GRAPH
// =============================================================================

/// A disk-backed graph store using redb.
///
/// Maintains an in-memory UUID index for fast lookups, rebuilt from the
/// on-disk index table at open. Counters live in the metadata table and
/// are only advanced in memory after a successful commit.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
    /// In-memory cache of uuid -> node id for fast lookups.
    uuid_cache: BTreeMap<Uuid, NodeId>,
    /// Next available node ID.
    next_node_id: u64,
    /// Next link creation-order counter.
    next_link_order: u64,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph")
            .field("uuid_cache_size", &self.uuid_cache.len())
            .field("next_node_id", &self.next_node_id)
            .field("next_link_order", &self.next_link_order)
            .finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LineageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(NODES).map_err(io_err)?;
            let _ = write_txn.open_table(UUID_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(LINKS).map_err(io_err)?;
            let _ = write_txn.open_table(GROUPS).map_err(io_err)?;
            {
                let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
                let existing = meta
                    .get("schema_version")
                    .map_err(io_err)?
                    .map(|v| v.value());
                match existing {
                    None => {
                        meta.insert("schema_version", SCHEMA_VERSION)
                            .map_err(io_err)?;
                    }
                    Some(v) if v == SCHEMA_VERSION => {}
                    Some(v) => {
                        return Err(LineageError::Io(format!(
                            "on-disk schema version {v} does not match supported version {SCHEMA_VERSION}"
                        )));
                    }
                }
            }
            write_txn.commit().map_err(io_err)?;
        }

        // Load metadata and the UUID index
        let read_txn = db.begin_read().map_err(io_err)?;

        let (next_node_id, next_link_order) = {
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            let node = table
                .get("next_node_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let link = table
                .get("next_link_order")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            (node, link)
        };

        let uuid_cache = {
            let table = read_txn.open_table(UUID_INDEX).map_err(io_err)?;
            let mut cache = BTreeMap::new();
            for entry in table.iter().map_err(io_err)? {
                let (key, value) = entry.map_err(io_err)?;
                cache.insert(Uuid::from_u128(key.value()), NodeId(value.value()));
            }
            cache
        };

        Ok(Self {
            db,
            uuid_cache,
            next_node_id,
            next_link_order,
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), LineageError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    fn read_node(&self, id: NodeId) -> Result<Option<NodeRecord>, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(data) => Ok(Some(decode_node(data.value())?)),
            None => Ok(None),
        }
    }

    fn contains_node(&self, id: NodeId) -> Result<bool, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        Ok(table.get(id.0).map_err(io_err)?.is_some())
    }

    fn require_node(&self, id: NodeId) -> Result<(), LineageError> {
        if self.contains_node(id)? {
            Ok(())
        } else {
            Err(LineageError::NotExistent(format!(
                "no node with id {}",
                id.0
            )))
        }
    }

    /// Scan the link table in creation order, keeping rows the predicate
    /// accepts. Link rows are few enough per workflow that a scan beats
    /// maintaining secondary adjacency tables.
    fn scan_links(
        &self,
        mut keep: impl FnMut(&Link) -> bool,
    ) -> Result<Vec<Link>, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(LINKS).map_err(io_err)?;
        let mut links = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            let link: Link = postcard::from_bytes(data.value()).map_err(ser_err)?;
            if keep(&link) {
                links.push(link);
            }
        }
        Ok(links)
    }
}

// =============================================================================
// GRAPHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStore for RedbGraph {
    fn create_node(&mut self, record: NodeRecord) -> Result<NodeId, LineageError> {
        if self.uuid_cache.contains_key(&record.uuid) {
            return Err(LineageError::Structural(format!(
                "a node with UUID {} already exists",
                record.uuid
            )));
        }

        let id = NodeId(self.next_node_id);
        let next_node_id = self.next_node_id.saturating_add(1);

        let mut record = record;
        record.id = id;
        let bytes = encode_node(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut nodes_table = write_txn.open_table(NODES).map_err(io_err)?;
            nodes_table
                .insert(id.0, bytes.as_slice())
                .map_err(io_err)?;

            let mut uuid_table = write_txn.open_table(UUID_INDEX).map_err(io_err)?;
            uuid_table
                .insert(record.uuid.as_u128(), id.0)
                .map_err(io_err)?;

            let mut meta_table = write_txn.open_table(METADATA).map_err(io_err)?;
            meta_table
                .insert("next_node_id", next_node_id)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        // Update in-memory state only after successful commit.
        self.next_node_id = next_node_id;
        self.uuid_cache.insert(record.uuid, id);
        Ok(id)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<NodeRecord>, LineageError> {
        self.read_node(id)
    }

    fn get_node_by_uuid(&self, uuid: &Uuid) -> Result<Option<NodeRecord>, LineageError> {
        match self.uuid_cache.get(uuid) {
            Some(&id) => self.read_node(id),
            None => Ok(None),
        }
    }

    fn update_node(&mut self, record: &NodeRecord) -> Result<(), LineageError> {
        self.require_node(record.id)?;
        let bytes = encode_node(record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut nodes_table = write_txn.open_table(NODES).map_err(io_err)?;
            nodes_table
                .insert(record.id.0, bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn query_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            let record = decode_node(data.value())?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
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
        let next_link_order = self.next_link_order.saturating_add(1);
        let bytes = postcard::to_allocvec(&link).map_err(ser_err)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut links_table = write_txn.open_table(LINKS).map_err(io_err)?;
            links_table
                .insert(link.order, bytes.as_slice())
                .map_err(io_err)?;

            let mut meta_table = write_txn.open_table(METADATA).map_err(io_err)?;
            meta_table
                .insert("next_link_order", next_link_order)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_link_order = next_link_order;
        Ok(link)
    }

    fn delete_incoming_links(
        &mut self,
        dest: NodeId,
        class: LinkClass,
        label: &str,
    ) -> Result<usize, LineageError> {
        self.require_node(dest)?;

        let doomed = self.scan_links(|l| {
            l.dest == dest && l.link_type.class() == class && l.label == label
        })?;
        if doomed.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut links_table = write_txn.open_table(LINKS).map_err(io_err)?;
            for link in &doomed {
                let _ = links_table.remove(link.order).map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(doomed.len())
    }

    fn query_links(
        &self,
        node: NodeId,
        direction: Direction,
        types: Option<&[LinkType]>,
    ) -> Result<Vec<Link>, LineageError> {
        self.scan_links(|l| {
            let endpoint = match direction {
                Direction::Outgoing => l.source,
                Direction::Incoming => l.dest,
            };
            endpoint == node && types.is_none_or(|ts| ts.contains(&l.link_type))
        })
    }

    fn all_links(&self) -> Result<Vec<Link>, LineageError> {
        self.scan_links(|_| true)
    }

    fn delete_nodes(&mut self, ids: &BTreeSet<NodeId>) -> Result<usize, LineageError> {
        // Links first: no edge may survive pointing at a removed node.
        let doomed_links =
            self.scan_links(|l| ids.contains(&l.source) || ids.contains(&l.dest))?;

        // Groups that reference a doomed node need their rows rewritten.
        let mut touched_groups = Vec::new();
        for group in self.list_groups()? {
            if group.members.iter().any(|m| ids.contains(m)) {
                let mut group = group;
                group.members.retain(|m| !ids.contains(m));
                touched_groups.push(group);
            }
        }

        let mut removed = 0;
        let mut removed_uuids = Vec::new();

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut links_table = write_txn.open_table(LINKS).map_err(io_err)?;
            for link in &doomed_links {
                let _ = links_table.remove(link.order).map_err(io_err)?;
            }

            let mut nodes_table = write_txn.open_table(NODES).map_err(io_err)?;
            let mut uuid_table = write_txn.open_table(UUID_INDEX).map_err(io_err)?;
            for id in ids {
                if let Some(data) = nodes_table.remove(id.0).map_err(io_err)? {
                    let record = decode_node(data.value())?;
                    let _ = uuid_table.remove(record.uuid.as_u128()).map_err(io_err)?;
                    removed_uuids.push(record.uuid);
                    removed += 1;
                }
            }

            let mut groups_table = write_txn.open_table(GROUPS).map_err(io_err)?;
            for group in &touched_groups {
                let bytes = postcard::to_allocvec(group).map_err(ser_err)?;
                groups_table
                    .insert(group.name.as_str(), bytes.as_slice())
                    .map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;

        for uuid in removed_uuids {
            self.uuid_cache.remove(&uuid);
        }
        Ok(removed)
    }

    fn node_count(&self) -> Result<usize, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        let count = table.len().map_err(io_err)?;
        Ok(count as usize)
    }

    fn link_count(&self) -> Result<usize, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(LINKS).map_err(io_err)?;
        let count = table.len().map_err(io_err)?;
        Ok(count as usize)
    }

    fn create_group(&mut self, name: &str, description: &str) -> Result<(), LineageError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut groups_table = write_txn.open_table(GROUPS).map_err(io_err)?;
            if groups_table.get(name).map_err(io_err)?.is_some() {
                return Err(LineageError::Structural(format!(
                    "a group named `{name}` already exists"
                )));
            }
            let group = Group::new(name, description);
            let bytes = postcard::to_allocvec(&group).map_err(ser_err)?;
            groups_table
                .insert(name, bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn add_to_group(&mut self, name: &str, node: NodeId) -> Result<bool, LineageError> {
        self.require_node(node)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        let inserted;
        {
            let mut groups_table = write_txn.open_table(GROUPS).map_err(io_err)?;
            let mut group: Group = match groups_table.get(name).map_err(io_err)? {
                Some(data) => postcard::from_bytes(data.value()).map_err(ser_err)?,
                None => {
                    return Err(LineageError::NotExistent(format!(
                        "no group named `{name}`"
                    )));
                }
            };
            inserted = group.members.insert(node);
            if inserted {
                let bytes = postcard::to_allocvec(&group).map_err(ser_err)?;
                groups_table
                    .insert(name, bytes.as_slice())
                    .map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(inserted)
    }

    fn group_nodes(&self, name: &str) -> Result<Vec<NodeId>, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(GROUPS).map_err(io_err)?;
        match table.get(name).map_err(io_err)? {
            Some(data) => {
                let group: Group = postcard::from_bytes(data.value()).map_err(ser_err)?;
                Ok(group.members.iter().copied().collect())
            }
            None => Err(LineageError::NotExistent(format!(
                "no group named `{name}`"
            ))),
        }
    }

    fn list_groups(&self) -> Result<Vec<Group>, LineageError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(GROUPS).map_err(io_err)?;
        let mut groups = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            groups.push(postcard::from_bytes(data.value()).map_err(ser_err)?);
        }
        Ok(groups)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(kind: NodeKind) -> NodeRecord {
        NodeRecord {
            id: NodeId(0),
            uuid: Uuid::new_v4(),
            kind,
            label: String::new(),
            description: String::new(),
            version: 0,
            attributes: BTreeMap::new(),
            extras: BTreeMap::new(),
        }
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let data = graph.create_node(record(NodeKind::Data)).expect("create");
        let calc = graph
            .create_node(record(NodeKind::Calculation))
            .expect("create");

        assert_ne!(data, calc);
        assert_eq!(graph.node_count().expect("count"), 2);

        graph
            .create_link(data, calc, LinkType::InputCalc, "structure")
            .expect("link");
        assert_eq!(graph.link_count().expect("count"), 1);
    }

    #[test]
    fn duplicate_uuid_rejected() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let rec = record(NodeKind::Data);
        let mut clone = record(NodeKind::Data);
        clone.uuid = rec.uuid;

        graph.create_node(rec).expect("first");
        let err = graph.create_node(clone).expect_err("duplicate");
        assert!(matches!(err, LineageError::Structural(_)));
    }

    #[test]
    fn attributes_roundtrip_through_json_envelope() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let mut rec = record(NodeKind::Data);
        rec.attributes.insert(
            "cell".to_string(),
            serde_json::json!([[1.0, 0.0], [0.0, 1.0]]),
        );
        rec.extras
            .insert("tag".to_string(), serde_json::json!("reference"));
        let uuid = rec.uuid;

        let id = graph.create_node(rec).expect("create");
        let loaded = graph.get_node(id).expect("get").expect("present");
        assert_eq!(loaded.uuid, uuid);
        assert_eq!(
            loaded.attributes.get("cell"),
            Some(&serde_json::json!([[1.0, 0.0], [0.0, 1.0]]))
        );
        assert_eq!(
            loaded.extras.get("tag"),
            Some(&serde_json::json!("reference"))
        );
    }

    #[test]
    fn update_node_overwrites_row() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let id = graph.create_node(record(NodeKind::Data)).expect("create");
        let mut rec = graph.get_node(id).expect("get").expect("present");
        rec.label = "updated".to_string();
        rec.version = 3;
        graph.update_node(&rec).expect("update");

        let loaded = graph.get_node(id).expect("get").expect("present");
        assert_eq!(loaded.label, "updated");
        assert_eq!(loaded.version, 3);
    }

    #[test]
    fn persistence_across_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let uuid;
        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            let rec = record(NodeKind::Data);
            uuid = rec.uuid;
            let data = graph.create_node(rec).expect("create");
            let calc = graph
                .create_node(record(NodeKind::Calculation))
                .expect("create");
            graph
                .create_link(data, calc, LinkType::InputCalc, "x")
                .expect("link");
        }

        {
            let graph = RedbGraph::open(&db_path).expect("reopen db");
            assert_eq!(graph.node_count().expect("count"), 2);
            assert_eq!(graph.link_count().expect("count"), 1);
            assert!(
                graph
                    .get_node_by_uuid(&uuid)
                    .expect("get")
                    .is_some()
            );
        }
    }

    #[test]
    fn counters_resume_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let (first_id, first_order);
        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            first_id = graph.create_node(record(NodeKind::Data)).expect("create");
            let calc = graph
                .create_node(record(NodeKind::Calculation))
                .expect("create");
            first_order = graph
                .create_link(first_id, calc, LinkType::InputCalc, "x")
                .expect("link")
                .order;
        }

        {
            let mut graph = RedbGraph::open(&db_path).expect("reopen db");
            let new_id = graph.create_node(record(NodeKind::Data)).expect("create");
            assert!(new_id > first_id);

            let calc = graph
                .query_nodes(&NodeFilter::by_kind(NodeKind::Calculation))
                .expect("query")[0]
                .id;
            let new_link = graph
                .create_link(new_id, calc, LinkType::InputCalc, "y")
                .expect("link");
            assert!(new_link.order > first_order);
        }
    }

    #[test]
    fn query_links_by_direction() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let data = graph.create_node(record(NodeKind::Data)).expect("create");
        let calc = graph
            .create_node(record(NodeKind::Calculation))
            .expect("create");
        let out = graph.create_node(record(NodeKind::Data)).expect("create");

        graph
            .create_link(data, calc, LinkType::InputCalc, "structure")
            .expect("link");
        graph
            .create_link(calc, out, LinkType::Create, "result")
            .expect("link");

        let incoming = graph
            .query_links(calc, Direction::Incoming, None)
            .expect("query");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].link_type, LinkType::InputCalc);

        let outgoing = graph
            .query_links(calc, Direction::Outgoing, Some(&[LinkType::Create]))
            .expect("query");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].dest, out);
    }

    #[test]
    fn delete_nodes_removes_rows_links_and_memberships() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let data = graph.create_node(record(NodeKind::Data)).expect("create");
        let calc = graph
            .create_node(record(NodeKind::Calculation))
            .expect("create");
        graph
            .create_link(data, calc, LinkType::InputCalc, "x")
            .expect("link");
        graph.create_group("runs", "").expect("group");
        graph.add_to_group("runs", calc).expect("add");

        let removed = graph
            .delete_nodes(&BTreeSet::from([calc]))
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(graph.node_count().expect("count"), 1);
        assert_eq!(graph.link_count().expect("count"), 0);
        assert!(graph.group_nodes("runs").expect("nodes").is_empty());
    }

    #[test]
    fn deleted_uuid_can_no_longer_be_resolved() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let rec = record(NodeKind::Data);
        let uuid = rec.uuid;
        let id = graph.create_node(rec).expect("create");

        graph.delete_nodes(&BTreeSet::from([id])).expect("delete");
        assert!(graph.get_node_by_uuid(&uuid).expect("get").is_none());
    }

    #[test]
    fn delete_incoming_links_scoped_to_class_and_label() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let d1 = graph.create_node(record(NodeKind::Data)).expect("create");
        let d2 = graph.create_node(record(NodeKind::Data)).expect("create");
        let calc = graph
            .create_node(record(NodeKind::Calculation))
            .expect("create");
        graph
            .create_link(d1, calc, LinkType::InputCalc, "x")
            .expect("link");
        graph
            .create_link(d2, calc, LinkType::InputCalc, "y")
            .expect("link");

        let removed = graph
            .delete_incoming_links(calc, LinkClass::Input, "x")
            .expect("delete");
        assert_eq!(removed, 1);

        let remaining = graph
            .query_links(calc, Direction::Incoming, None)
            .expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].label, "y");
    }

    #[test]
    fn groups_persist_across_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let node;
        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            node = graph.create_node(record(NodeKind::Data)).expect("create");
            graph.create_group("runs", "reference runs").expect("group");
            graph.add_to_group("runs", node).expect("add");
        }

        {
            let graph = RedbGraph::open(&db_path).expect("reopen db");
            let groups = graph.list_groups().expect("list");
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].name, "runs");
            assert_eq!(graph.group_nodes("runs").expect("nodes"), vec![node]);
        }
    }

    #[test]
    fn group_membership_set_semantics() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut graph = RedbGraph::open(&db_path).expect("open db");

        let node = graph.create_node(record(NodeKind::Data)).expect("create");
        graph.create_group("runs", "").expect("group");
        assert!(graph.add_to_group("runs", node).expect("add"));
        assert!(!graph.add_to_group("runs", node).expect("add"));
    }

    #[test]
    fn compact_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            for _ in 0..20 {
                graph.create_node(record(NodeKind::Data)).expect("create");
            }
            graph.compact().expect("compact");
        }

        {
            let graph = RedbGraph::open(&db_path).expect("reopen db");
            assert_eq!(graph.node_count().expect("count"), 20);
        }
    }
}

//! # Node Handle
//!
//! A node is a struct composing identity, a kind tag, an `AttributeStore`,
//! and a `Lifecycle` value. There is no subclassing: behavior differences
//! across kinds flow through the link validation rule table and the
//! updatable-attribute whitelist.

use crate::attributes::AttributeStore;
use crate::lifecycle::Lifecycle;
use crate::primitives::{MAX_NODE_LABEL_LENGTH, PROCESS_STATE_KEY, SEALED_KEY};
use crate::types::{LineageError, LinkType, NodeId, NodeKind, NodeRecord, ProcessState};
use serde_json::Value;
use uuid::Uuid;

/// A link held in memory on its destination node, pending endpoint storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLink {
    /// UUID of the source node; it may itself still be transient.
    pub source: Uuid,
    pub link_type: LinkType,
    pub label: String,
}

/// An in-memory node handle.
///
/// Created transient with a fresh UUID; gains a `NodeId` at first storage.
/// Incoming links whose endpoints are not both stored are cached here until
/// the session can persist them.
#[derive(Debug, Clone)]
pub struct Node {
    uuid: Uuid,
    id: Option<NodeId>,
    kind: NodeKind,
    label: String,
    description: String,
    store: AttributeStore,
    lifecycle: Lifecycle,
    cached_incoming: Vec<CachedLink>,
}

impl Node {
    /// Create a new transient node of the given kind.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: None,
            kind,
            label: String::new(),
            description: String::new(),
            store: AttributeStore::new(),
            lifecycle: Lifecycle::Transient,
            cached_incoming: Vec::new(),
        }
    }

    /// Create a transient node with a caller-supplied UUID.
    ///
    /// The store rejects a second node claiming an existing UUID at storage
    /// time; this constructor exists for imports and for testing that rule.
    #[must_use]
    pub fn with_uuid(kind: NodeKind, uuid: Uuid) -> Self {
        let mut node = Self::new(kind);
        node.uuid = uuid;
        node
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub const fn id(&self) -> Option<NodeId> {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub const fn is_stored(&self) -> bool {
        self.lifecycle.is_stored()
    }

    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.lifecycle.is_sealed()
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.store.version()
    }

    /// The recorded process state; `None` means initial.
    #[must_use]
    pub fn process_state(&self) -> Option<ProcessState> {
        self.store
            .get_attribute_or(PROCESS_STATE_KEY, Value::Null)
            .as_str()
            .and_then(ProcessState::parse)
    }

    // =========================================================================
    // LABEL / DESCRIPTION
    // =========================================================================

    /// Set the node label. Mutable for the whole lifetime; bumps the
    /// version counter after storage.
    pub fn set_label(&mut self, label: &str) -> Result<(), LineageError> {
        if label.len() > MAX_NODE_LABEL_LENGTH {
            return Err(LineageError::Structural(format!(
                "node label exceeds {MAX_NODE_LABEL_LENGTH} bytes"
            )));
        }
        self.label = label.to_string();
        self.store.bump_version(self.lifecycle);
        Ok(())
    }

    /// Set the node description. Same rules as `set_label`.
    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
        self.store.bump_version(self.lifecycle);
    }

    // =========================================================================
    // ATTRIBUTES / EXTRAS (gated passthroughs)
    // =========================================================================

    pub fn set_attribute(&mut self, key: &str, value: Value) -> Result<(), LineageError> {
        self.store
            .set_attribute(self.lifecycle, self.kind.updatable_attributes(), key, value)
    }

    pub fn delete_attribute(&mut self, key: &str) -> Result<(), LineageError> {
        self.store
            .delete_attribute(self.lifecycle, self.kind.updatable_attributes(), key)
    }

    pub fn get_attribute(&self, key: &str) -> Result<Value, LineageError> {
        self.store.get_attribute(key)
    }

    #[must_use]
    pub fn get_attribute_or(&self, key: &str, default: Value) -> Value {
        self.store.get_attribute_or(key, default)
    }

    pub fn iterate_attributes(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.store.iterate_attributes()
    }

    pub fn set_extra(&mut self, key: &str, value: Value) -> Result<(), LineageError> {
        self.store.set_extra(self.lifecycle, key, value)
    }

    pub fn delete_extra(&mut self, key: &str) -> Result<(), LineageError> {
        self.store.delete_extra(self.lifecycle, key)
    }

    pub fn get_extra(&self, key: &str) -> Result<Value, LineageError> {
        self.store.get_extra(key)
    }

    pub fn iterate_extras(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.store.iterate_extras()
    }

    /// Set the process state attribute. Whitelisted, so legal post-store.
    pub fn set_process_state(&mut self, state: ProcessState) -> Result<(), LineageError> {
        if !self.kind.is_process() {
            return Err(LineageError::Structural(format!(
                "{:?} nodes have no process state",
                self.kind
            )));
        }
        self.set_attribute(PROCESS_STATE_KEY, Value::String(state.as_str().to_string()))
    }

    // =========================================================================
    // LIFECYCLE TRANSITIONS
    // =========================================================================

    /// Mark the node stored with its assigned primary key.
    ///
    /// Storability and cached-link preconditions are the session's job;
    /// this only performs the state transition.
    pub fn mark_stored(&mut self, id: NodeId) -> Result<(), LineageError> {
        self.lifecycle = self.lifecycle.store()?;
        self.id = Some(id);
        Ok(())
    }

    /// Seal the node: terminal, idempotent, process kinds only.
    ///
    /// The seal marker is written through the attribute escape hatch while
    /// the node is still `Stored`; the lifecycle flips afterwards, making
    /// this the last attribute write the node will ever accept.
    pub fn seal(&mut self) -> Result<(), LineageError> {
        if !self.kind.is_process() {
            return Err(LineageError::Structural(format!(
                "only process nodes can be sealed, not {:?}",
                self.kind
            )));
        }
        if self.lifecycle.is_sealed() {
            return Ok(());
        }
        // Rejects Transient.
        let next = self.lifecycle.seal()?;
        self.store.set_attribute_full(
            self.lifecycle,
            self.kind.updatable_attributes(),
            SEALED_KEY,
            Value::Bool(true),
            true,
        )?;
        self.lifecycle = next;
        Ok(())
    }

    // =========================================================================
    // CACHED LINKS
    // =========================================================================

    /// Cache an incoming link pending endpoint storage.
    pub fn cache_incoming(&mut self, link: CachedLink) {
        self.cached_incoming.push(link);
    }

    /// The cached incoming links, in insertion order.
    #[must_use]
    pub fn cached_incoming(&self) -> &[CachedLink] {
        &self.cached_incoming
    }

    /// Remove cached links matching a predicate, returning how many.
    pub fn retain_cached_incoming(&mut self, keep: impl FnMut(&CachedLink) -> bool) -> usize {
        let before = self.cached_incoming.len();
        self.cached_incoming.retain(keep);
        before - self.cached_incoming.len()
    }

    /// Take all cached incoming links, leaving the cache empty.
    pub fn drain_cached_incoming(&mut self) -> Vec<CachedLink> {
        std::mem::take(&mut self.cached_incoming)
    }

    // =========================================================================
    // RECORD CONVERSION
    // =========================================================================

    /// Snapshot the node into its persisted form.
    ///
    /// Returns an error while the node is transient: a record without a
    /// primary key cannot be exchanged with the store.
    pub fn to_record(&self) -> Result<NodeRecord, LineageError> {
        let id = self.id.ok_or_else(|| {
            LineageError::NotExistent(format!("node {} has not been stored", self.uuid))
        })?;
        let (attributes, extras) = self.store.to_maps();
        Ok(NodeRecord {
            id,
            uuid: self.uuid,
            kind: self.kind,
            label: self.label.clone(),
            description: self.description.clone(),
            version: self.store.version(),
            attributes,
            extras,
        })
    }

    /// Snapshot a transient node for first persistence. The id field is a
    /// placeholder the store overwrites on `create_node`.
    #[must_use]
    pub fn to_new_record(&self) -> NodeRecord {
        let (attributes, extras) = self.store.to_maps();
        NodeRecord {
            id: NodeId(0),
            uuid: self.uuid,
            kind: self.kind,
            label: self.label.clone(),
            description: self.description.clone(),
            version: self.store.version(),
            attributes,
            extras,
        }
    }

    /// Rebuild a handle from a persisted record.
    #[must_use]
    pub fn from_record(record: NodeRecord) -> Self {
        let lifecycle = if record.is_sealed() {
            Lifecycle::Sealed
        } else {
            Lifecycle::Stored
        };
        Self {
            uuid: record.uuid,
            id: Some(record.id),
            kind: record.kind,
            label: record.label,
            description: record.description,
            store: AttributeStore::from_maps(record.attributes, record.extras, record.version),
            lifecycle,
            cached_incoming: Vec::new(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

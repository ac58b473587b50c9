//! # Core Type Definitions
//!
//! This module contains all core types for the Lineage provenance graph:
//! - Node identity and kinds (`NodeId`, `NodeKind`, `NodeRecord`)
//! - Process execution state (`ProcessState`)
//! - Typed links and their label namespaces (`LinkType`, `LinkClass`, `Link`)
//! - Tagging collections (`Group`)
//! - Error taxonomy (`LineageError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` where they are used as `BTreeMap`/`BTreeSet` keys
//! - Use saturating arithmetic for counters to prevent overflow
//! - Carry explicit, testable error kinds instead of a single failure signal

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

use crate::primitives::{
    EXCEPTION_KEY, EXIT_STATUS_KEY, PROCESS_STATE_KEY, PROCESS_STATUS_KEY, SEALED_KEY,
};

// =============================================================================
// NODE IDENTITY & KIND
// =============================================================================

/// Primary key of a persisted node, assigned by the store at first storage.
///
/// Transient nodes have no `NodeId` yet; they are addressed by UUID only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// The kind of a node, determining which link roles it may play.
///
/// Behavior differences across kinds are expressed through the link
/// validation rule table and the updatable-attribute whitelist, not
/// through subtyping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Placeholder kind used for query templates; never storable.
    Base,
    /// A data artifact (input file, structure, result value).
    Data,
    /// A calculation process execution.
    Calculation,
    /// A workflow process execution (may call other processes).
    Workflow,
}

impl NodeKind {
    /// Whether this kind represents a process execution.
    #[must_use]
    pub const fn is_process(self) -> bool {
        matches!(self, Self::Calculation | Self::Workflow)
    }

    /// Whether nodes of this kind may be persisted at all.
    #[must_use]
    pub const fn is_storable(self) -> bool {
        !matches!(self, Self::Base)
    }

    /// Attribute keys that remain writable after storage, until sealing.
    ///
    /// The `sealed` key is itself a member of the process whitelist: sealing
    /// is recorded through the same attribute machinery it later locks.
    #[must_use]
    pub const fn updatable_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Calculation | Self::Workflow => &[
                SEALED_KEY,
                PROCESS_STATE_KEY,
                PROCESS_STATUS_KEY,
                EXIT_STATUS_KEY,
                EXCEPTION_KEY,
            ],
            Self::Base | Self::Data => &[],
        }
    }
}

// =============================================================================
// PROCESS STATE
// =============================================================================

/// Execution state of a process node, stored under the `process_state`
/// attribute. A process with no recorded state is considered initial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessState {
    /// Initial state: inputs may still be attached or replaced.
    New,
    /// Execution has started; the input interface is frozen.
    Running,
    /// Waiting on sub-processes or external resources.
    Waiting,
    /// Terminal: finished nominally.
    Finished,
    /// Terminal: raised an exception.
    Excepted,
    /// Terminal: killed by the user.
    Killed,
}

impl ProcessState {
    /// Canonical string form, as stored in the `process_state` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Finished => "finished",
            Self::Excepted => "excepted",
            Self::Killed => "killed",
        }
    }

    /// Parse the canonical string form. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "finished" => Some(Self::Finished),
            "excepted" => Some(Self::Excepted),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }

    /// Whether input links may still be attached in this state.
    #[must_use]
    pub const fn accepts_inputs(self) -> bool {
        matches!(self, Self::New)
    }
}

// =============================================================================
// LINKS
// =============================================================================

/// The semantic role of an edge in the provenance model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Data feeding a calculation.
    InputCalc,
    /// Data feeding a workflow.
    InputWork,
    /// A calculation creating a data node. At most one per destination.
    Create,
    /// A workflow returning a data node. Multiple allowed.
    Return,
    /// A process calling a calculation.
    CallCalc,
    /// A process calling a workflow.
    CallWork,
}

/// Label namespace of a link type. Incoming labels must be unique per
/// destination within one class; identical labels in different classes
/// coexist on the same destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkClass {
    Input,
    Create,
    Return,
    Call,
}

impl LinkType {
    /// The label namespace this link type belongs to.
    #[must_use]
    pub const fn class(self) -> LinkClass {
        match self {
            Self::InputCalc | Self::InputWork => LinkClass::Input,
            Self::Create => LinkClass::Create,
            Self::Return => LinkClass::Return,
            Self::CallCalc | Self::CallWork => LinkClass::Call,
        }
    }
}

/// Direction of a link query relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A persisted, directed, typed, labeled edge between two stored nodes.
///
/// `order` is a store-assigned monotonic counter recording creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub dest: NodeId,
    pub link_type: LinkType,
    pub label: String,
    pub order: u64,
}

// =============================================================================
// NODE RECORD
// =============================================================================

/// The persisted form of a node, as exchanged with a `GraphStore`.
///
/// Attribute and extras values are JSON documents; the engine deep-copies
/// them at every boundary so stored state never aliases caller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Primary key. Ignored on `create_node`; assigned by the store.
    pub id: NodeId,
    /// Globally unique identifier, immutable for the node's lifetime.
    pub uuid: Uuid,
    pub kind: NodeKind,
    pub label: String,
    pub description: String,
    /// Bumped on every successful post-store mutation.
    pub version: u64,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl NodeRecord {
    /// Whether the record carries the sealing marker attribute.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.attributes
            .get(SEALED_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// The recorded process state, if any. `None` means initial.
    #[must_use]
    pub fn process_state(&self) -> Option<ProcessState> {
        self.attributes
            .get(PROCESS_STATE_KEY)
            .and_then(serde_json::Value::as_str)
            .and_then(ProcessState::parse)
    }
}

// =============================================================================
// GROUPS
// =============================================================================

/// A named, unordered collection of stored nodes.
///
/// Groups sit outside the provenance DAG: no cycle or cardinality rules
/// apply. Membership has set semantics and only stored nodes may join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub description: String,
    pub members: BTreeSet<NodeId>,
}

impl Group {
    /// Create a new empty group.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            members: BTreeSet::new(),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the Lineage engine.
///
/// The split between `Structural` and `ModificationNotAllowed` is
/// load-bearing: callers distinguish "this shape of graph is illegal"
/// from "this mutation is forbidden in the current state". Likewise,
/// `MissingAttribute` (absence) is never conflated with forbiddance.
#[derive(Debug, Error)]
pub enum LineageError {
    /// Structural violation: self-link, duplicate CREATE target, duplicate
    /// incoming label, kind/type mismatch, cycle creation, duplicate UUID.
    #[error("structural violation: {0}")]
    Structural(String),

    /// A mutation was attempted on a sealed node, on a stored node's
    /// non-whitelisted attribute, or on a process past its initial state.
    #[error("modification not allowed: {0}")]
    ModificationNotAllowed(String),

    /// Read or delete of a nonexistent attribute or extras key.
    #[error("no attribute with key: {0}")]
    MissingAttribute(String),

    /// A lookup resolved to zero results where exactly one was expected.
    #[error("not existent: {0}")]
    NotExistent(String),

    /// A lookup resolved to more than one result where exactly one was
    /// expected.
    #[error("multiple objects found: {0}")]
    MultipleObjects(String),

    /// Attempt to persist a node kind that is inherently non-storable.
    #[error("storing not allowed: {0}")]
    StoringNotAllowed(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred in the backing store.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

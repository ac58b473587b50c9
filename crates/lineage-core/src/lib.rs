//! # lineage-core
//!
//! A provenance-tracking graph engine for computational science.
//!
//! Every piece of data and every process execution becomes an immutable
//! node in a directed acyclic graph; typed, labeled links record which
//! inputs fed which calculations and which outputs they produced. Once a
//! node is stored its content freezes, so the recorded history can be
//! trusted to replay.
//!
//! ## Architectural Constraints
//!
//! - Single logical writer: one `Session` owns all mutation
//! - Validation before persistence, always in the same order
//! - All collections are `BTreeMap`/`BTreeSet` for deterministic iteration
//! - No async, no network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod attributes;
pub mod deletion;
pub mod graph;
pub mod integrity;
pub mod lifecycle;
pub mod links;
pub mod node;
pub mod primitives;
pub mod query;
pub mod repository;
pub mod session;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Direction, Group, LineageError, Link, LinkClass, LinkType, NodeId, NodeKind, NodeRecord,
    ProcessState,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use attributes::AttributeStore;
pub use deletion::DeletionPolicy;
pub use graph::{Graph, GraphStore};
pub use integrity::{check_acyclic, would_close_cycle};
pub use lifecycle::Lifecycle;
pub use links::{EndpointView, LinkProposal, validate_link};
pub use node::{CachedLink, Node};
pub use query::NodeFilter;
pub use repository::{FileRepository, MemoryRepository};
pub use session::{Session, StorageBackend};
pub use storage::RedbGraph;

//! # Query Module
//!
//! Structured node filters for store queries.
//!
//! Filters are conjunctive: every populated field must match. An empty
//! filter matches every node, which is how full-graph scans (UUID-prefix
//! resolution, edge views for the cycle checker) are expressed.

use crate::types::{NodeKind, NodeRecord};

/// A conjunctive filter over persisted node records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Match only nodes of this kind.
    pub kind: Option<NodeKind>,
    /// Match only nodes with exactly this label.
    pub label: Option<String>,
    /// Match nodes whose hyphenated UUID string starts with this prefix.
    pub uuid_prefix: Option<String>,
}

impl NodeFilter {
    /// The match-everything filter.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter by node kind.
    #[must_use]
    pub fn by_kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Filter by UUID prefix.
    #[must_use]
    pub fn by_uuid_prefix(prefix: impl Into<String>) -> Self {
        Self {
            uuid_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Whether a record satisfies every populated field.
    #[must_use]
    pub fn matches(&self, record: &NodeRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if record.label != *label {
                return false;
            }
        }
        if let Some(prefix) = &self.uuid_prefix {
            if !record.uuid.to_string().starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// TESTS
// =============================================================================

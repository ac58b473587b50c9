//! # Graph Integrity Checker
//!
//! Cycle prevention at link-creation time.
//!
//! On a proposed edge `u -> v`, a BFS from `v` over outgoing edges decides
//! whether `u` is reachable; if so, the new edge would close a directed
//! cycle and is rejected. The edge view handed in must be the graph as it
//! will exist after the tentative addition: persisted edges plus any links
//! still cached in the session, since workflows batch links before the
//! first store.
//!
//! Graphs in this domain are modest (hundreds to low thousands of nodes
//! per workflow), so a plain BFS per edge addition is the right tool; no
//! incremental topological-order maintenance.

use crate::types::LineageError;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use uuid::Uuid;

/// Whether adding `source -> dest` would close a directed cycle.
///
/// `edges` is the full `(source, dest)` edge view, cached links included.
/// All link types participate: the provenance DAG is acyclic as a whole.
#[must_use]
pub fn would_close_cycle(edges: &[(Uuid, Uuid)], source: Uuid, dest: Uuid) -> bool {
    if source == dest {
        return true;
    }

    // Adjacency over the deterministic BTreeMap, outgoing direction only.
    let mut outgoing: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for (from, to) in edges {
        outgoing.entry(*from).or_default().push(*to);
    }

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(dest);
    visited.insert(dest);

    while let Some(current) = queue.pop_front() {
        if current == source {
            return true;
        }
        if let Some(targets) = outgoing.get(&current) {
            for &next in targets {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    false
}

/// Reject a proposed edge that would close a cycle.
pub fn check_acyclic(
    edges: &[(Uuid, Uuid)],
    source: Uuid,
    dest: Uuid,
) -> Result<(), LineageError> {
    if would_close_cycle(edges, source, dest) {
        return Err(LineageError::Structural(format!(
            "link {source} -> {dest} would close a cycle in the provenance graph"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

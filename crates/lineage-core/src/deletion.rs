//! # Cascading Deletion Engine
//!
//! Given a seed set of node ids and policy flags, compute the transitive
//! closure of nodes to delete, then hand the full id set to the store for
//! atomic bulk removal.
//!
//! The walk is breadth-first with a visited set:
//! - CREATE descendants are always swept in: created data cannot
//!   meaningfully outlive its creating calculation
//! - CALL descendants are swept in only under `follow_calls`
//! - RETURN descendants only under `follow_returns`
//! - nothing else is followed: deletion is conservative and policy-driven,
//!   never garbage-collection-complete
//!
//! Collect the full set first, delete atomically second; the engine never
//! interleaves expansion with removal.

use crate::graph::GraphStore;
use crate::types::{Direction, LineageError, LinkClass, NodeId};
use std::collections::{BTreeSet, VecDeque};

/// Which link classes the deletion walk expands through, besides CREATE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionPolicy {
    /// Also delete sub-processes the deleted processes called.
    pub follow_calls: bool,
    /// Also delete data returned by the deleted workflows.
    pub follow_returns: bool,
}

impl DeletionPolicy {
    /// Expand through every policy-controlled link class.
    #[must_use]
    pub const fn everything() -> Self {
        Self {
            follow_calls: true,
            follow_returns: true,
        }
    }

    const fn follows(self, class: LinkClass) -> bool {
        match class {
            LinkClass::Create => true,
            LinkClass::Call => self.follow_calls,
            LinkClass::Return => self.follow_returns,
            LinkClass::Input => false,
        }
    }
}

/// Compute the full deletion set for the given seeds under a policy.
///
/// Terminates on any finite graph: the visited set also guards against
/// cycles, which the integrity checker should have prevented anyway.
pub fn collect<S: GraphStore + ?Sized>(
    store: &S,
    seeds: &BTreeSet<NodeId>,
    policy: DeletionPolicy,
) -> Result<BTreeSet<NodeId>, LineageError> {
    let mut visited: BTreeSet<NodeId> = seeds.clone();
    let mut frontier: VecDeque<NodeId> = seeds.iter().copied().collect();

    while let Some(node) = frontier.pop_front() {
        for link in store.query_links(node, Direction::Outgoing, None)? {
            if !policy.follows(link.link_type.class()) {
                continue;
            }
            if visited.insert(link.dest) {
                frontier.push_back(link.dest);
            }
        }
    }
    Ok(visited)
}

/// Log a warning for every node in the deletion set whose CALL-caller
/// survives. A dangling call-parent after deletion is a warning, never
/// an error.
pub fn warn_dangling_callers<S: GraphStore + ?Sized>(
    store: &S,
    deletion_set: &BTreeSet<NodeId>,
) -> Result<(), LineageError> {
    for &node in deletion_set {
        for link in store.query_links(node, Direction::Incoming, None)? {
            if link.link_type.class() == LinkClass::Call && !deletion_set.contains(&link.source) {
                tracing::warn!(
                    deleted = node.0,
                    caller = link.source.0,
                    label = %link.label,
                    "deleting a called process while its caller survives"
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::types::{LinkType, NodeKind, NodeRecord};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn add_node(graph: &mut Graph, kind: NodeKind) -> NodeId {
        graph
            .create_node(NodeRecord {
                id: NodeId(0),
                uuid: Uuid::new_v4(),
                kind,
                label: String::new(),
                description: String::new(),
                version: 0,
                attributes: BTreeMap::new(),
                extras: BTreeMap::new(),
            })
            .expect("create node")
    }

    fn link(graph: &mut Graph, source: NodeId, dest: NodeId, lt: LinkType, label: &str) {
        graph.create_link(source, dest, lt, label).expect("link");
    }

    /// Shared fixture: in1,in2 -> wf -> {slave workflow, slave calc},
    /// each producing outputs.
    struct Fixture {
        graph: Graph,
        in1: NodeId,
        in2: NodeId,
        wf: NodeId,
        slave_wf: NodeId,
        slave_calc: NodeId,
        wf_out: NodeId,
        slave_wf_out: NodeId,
        slave_calc_out: NodeId,
    }

    fn fixture() -> Fixture {
        let mut graph = Graph::new();
        let in1 = add_node(&mut graph, NodeKind::Data);
        let in2 = add_node(&mut graph, NodeKind::Data);
        let wf = add_node(&mut graph, NodeKind::Workflow);
        let slave_wf = add_node(&mut graph, NodeKind::Workflow);
        let slave_calc = add_node(&mut graph, NodeKind::Calculation);
        let wf_out = add_node(&mut graph, NodeKind::Data);
        let slave_wf_out = add_node(&mut graph, NodeKind::Data);
        let slave_calc_out = add_node(&mut graph, NodeKind::Data);

        link(&mut graph, in1, wf, LinkType::InputWork, "in1");
        link(&mut graph, in2, wf, LinkType::InputWork, "in2");
        link(&mut graph, wf, slave_wf, LinkType::CallWork, "sub_wf");
        link(&mut graph, wf, slave_calc, LinkType::CallCalc, "sub_calc");
        link(&mut graph, wf, wf_out, LinkType::Return, "result");
        link(&mut graph, slave_wf, slave_wf_out, LinkType::Return, "result");
        link(
            &mut graph,
            slave_calc,
            slave_calc_out,
            LinkType::Create,
            "result",
        );

        Fixture {
            graph,
            in1,
            in2,
            wf,
            slave_wf,
            slave_calc,
            wf_out,
            slave_wf_out,
            slave_calc_out,
        }
    }

    fn seeds(ids: &[NodeId]) -> BTreeSet<NodeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn follow_everything_sweeps_workflow_and_descendants() {
        let f = fixture();
        let set = collect(&f.graph, &seeds(&[f.wf]), DeletionPolicy::everything())
            .expect("collect");

        assert!(set.contains(&f.wf));
        assert!(set.contains(&f.slave_wf));
        assert!(set.contains(&f.slave_calc));
        assert!(set.contains(&f.wf_out));
        assert!(set.contains(&f.slave_wf_out));
        // The slave calculation's CREATE output is swept in because CREATE
        // is always followed, even from a CALL descendant.
        assert!(set.contains(&f.slave_calc_out));
        // Inputs are never followed.
        assert!(!set.contains(&f.in1));
        assert!(!set.contains(&f.in2));
    }

    #[test]
    fn no_flags_deletes_only_the_seed() {
        let f = fixture();
        let set = collect(&f.graph, &seeds(&[f.wf]), DeletionPolicy::default())
            .expect("collect");
        assert_eq!(set, seeds(&[f.wf]));
    }

    #[test]
    fn follow_returns_only_spares_called_slaves() {
        let f = fixture();
        let policy = DeletionPolicy {
            follow_calls: false,
            follow_returns: true,
        };
        let set = collect(&f.graph, &seeds(&[f.wf]), policy).expect("collect");

        assert!(set.contains(&f.wf));
        assert!(set.contains(&f.wf_out));
        assert!(!set.contains(&f.slave_wf));
        assert!(!set.contains(&f.slave_calc));
        assert!(!set.contains(&f.slave_calc_out));
    }

    #[test]
    fn create_descendants_always_cascade() {
        let f = fixture();
        let set = collect(&f.graph, &seeds(&[f.slave_calc]), DeletionPolicy::default())
            .expect("collect");
        assert!(set.contains(&f.slave_calc_out));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn multiple_seeds_union() {
        let f = fixture();
        let set = collect(
            &f.graph,
            &seeds(&[f.slave_wf, f.slave_calc]),
            DeletionPolicy::default(),
        )
        .expect("collect");
        assert!(set.contains(&f.slave_wf));
        assert!(set.contains(&f.slave_calc));
        assert!(set.contains(&f.slave_calc_out));
        // RETURN not followed by default.
        assert!(!set.contains(&f.slave_wf_out));
    }

    #[test]
    fn dangling_caller_is_warned_not_rejected() {
        let f = fixture();
        // Deleting only the slave calc leaves wf as a dangling caller; the
        // engine logs and proceeds.
        let set = collect(&f.graph, &seeds(&[f.slave_calc]), DeletionPolicy::default())
            .expect("collect");
        warn_dangling_callers(&f.graph, &set).expect("warn pass");
        assert!(!set.contains(&f.wf));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // A stricter policy can only grow the deletion set.
            #[test]
            fn policy_monotonicity(seed_idx in 0usize..8) {
                let f = fixture();
                let all = [
                    f.in1, f.in2, f.wf, f.slave_wf, f.slave_calc,
                    f.wf_out, f.slave_wf_out, f.slave_calc_out,
                ];
                let seed = seeds(&[all[seed_idx]]);
                let minimal = collect(&f.graph, &seed, DeletionPolicy::default())
                    .expect("collect");
                let maximal = collect(&f.graph, &seed, DeletionPolicy::everything())
                    .expect("collect");
                prop_assert!(minimal.is_subset(&maximal));
                prop_assert!(minimal.is_superset(&seed));
            }
        }
    }
}

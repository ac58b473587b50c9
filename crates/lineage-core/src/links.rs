//! # Link Validator
//!
//! The pure decision function answering "is link (src, dest, type, label)
//! legal right now?". It sees only value snapshots of both endpoints plus
//! the destination's existing incoming labels, so the same rules apply to
//! persisted and cached links uniformly.
//!
//! Rule classes and their error kinds:
//! - structural rules (kind table, self-links, CREATE cardinality, label
//!   uniqueness) reject with `LineageError::Structural`
//! - state rules (sealed endpoints, process past its initial state) reject
//!   with `LineageError::ModificationNotAllowed`
//!
//! Tests assert the kind, not just failure.

use crate::primitives::MAX_LINK_LABEL_LENGTH;
use crate::types::{LineageError, LinkClass, LinkType, NodeKind, ProcessState};
use uuid::Uuid;

/// Value snapshot of one link endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointView {
    pub uuid: Uuid,
    pub kind: NodeKind,
    pub sealed: bool,
    /// Recorded process state; `None` means initial. Ignored for data.
    pub process_state: Option<ProcessState>,
}

/// A proposed link, plus the destination's current incoming-label view.
///
/// `existing_incoming` must be the union of persisted and cached incoming
/// links at the destination, as `(class, label)` pairs.
#[derive(Debug, Clone)]
pub struct LinkProposal<'a> {
    pub source: EndpointView,
    pub dest: EndpointView,
    pub link_type: LinkType,
    pub label: &'a str,
    pub existing_incoming: &'a [(LinkClass, String)],
}

/// Validate a proposed link against the full rule table.
pub fn validate_link(proposal: &LinkProposal<'_>) -> Result<(), LineageError> {
    validate_label(proposal.label)?;

    if proposal.source.uuid == proposal.dest.uuid {
        return Err(LineageError::Structural(format!(
            "cannot link node {} to itself",
            proposal.source.uuid
        )));
    }

    check_kind_table(proposal)?;
    check_endpoint_states(proposal)?;
    check_create_cardinality(proposal)?;
    check_label_uniqueness(proposal)?;

    Ok(())
}

/// Link labels are non-empty identifiers: alphanumerics and underscores.
fn validate_label(label: &str) -> Result<(), LineageError> {
    if label.is_empty() {
        return Err(LineageError::Structural(
            "link label must not be empty".to_string(),
        ));
    }
    if label.len() > MAX_LINK_LABEL_LENGTH {
        return Err(LineageError::Structural(format!(
            "link label exceeds {MAX_LINK_LABEL_LENGTH} bytes"
        )));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(LineageError::Structural(format!(
            "link label `{label}` contains characters outside [a-zA-Z0-9_]"
        )));
    }
    Ok(())
}

/// Rule 1: kind compatibility by link type.
fn check_kind_table(proposal: &LinkProposal<'_>) -> Result<(), LineageError> {
    let src = proposal.source.kind;
    let dst = proposal.dest.kind;
    let ok = match proposal.link_type {
        LinkType::InputCalc => src == NodeKind::Data && dst == NodeKind::Calculation,
        LinkType::InputWork => src == NodeKind::Data && dst == NodeKind::Workflow,
        LinkType::Create => src == NodeKind::Calculation && dst == NodeKind::Data,
        LinkType::Return => src == NodeKind::Workflow && dst == NodeKind::Data,
        LinkType::CallCalc => src.is_process() && dst == NodeKind::Calculation,
        LinkType::CallWork => src.is_process() && dst == NodeKind::Workflow,
    };
    if ok {
        Ok(())
    } else {
        Err(LineageError::Structural(format!(
            "link type {:?} does not accept {src:?} -> {dst:?}",
            proposal.link_type
        )))
    }
}

/// Rules 4 and 5: state-dependent link permissions.
fn check_endpoint_states(proposal: &LinkProposal<'_>) -> Result<(), LineageError> {
    if proposal.source.sealed {
        return Err(LineageError::ModificationNotAllowed(format!(
            "source node {} is sealed and accepts no further links",
            proposal.source.uuid
        )));
    }
    if proposal.dest.sealed {
        return Err(LineageError::ModificationNotAllowed(format!(
            "destination node {} is sealed and accepts no further links",
            proposal.dest.uuid
        )));
    }

    // Input links into a calculation are frozen once execution advances
    // past the initial state. An unrecorded state counts as initial.
    if proposal.link_type.class() == LinkClass::Input && proposal.dest.kind == NodeKind::Calculation
    {
        let accepts = proposal
            .dest
            .process_state
            .is_none_or(ProcessState::accepts_inputs);
        if !accepts {
            return Err(LineageError::ModificationNotAllowed(format!(
                "calculation {} is past its initial state; input links are frozen",
                proposal.dest.uuid
            )));
        }
    }
    Ok(())
}

/// Rule 1 (CREATE clause): at most one CREATE link may ever target a node.
fn check_create_cardinality(proposal: &LinkProposal<'_>) -> Result<(), LineageError> {
    if proposal.link_type != LinkType::Create {
        return Ok(());
    }
    let has_create = proposal
        .existing_incoming
        .iter()
        .any(|(class, _)| *class == LinkClass::Create);
    if has_create {
        return Err(LineageError::Structural(format!(
            "node {} already has an incoming CREATE link",
            proposal.dest.uuid
        )));
    }
    Ok(())
}

/// Rule 3: incoming (class, label) pairs are unique per destination.
/// Identical labels in different classes coexist.
fn check_label_uniqueness(proposal: &LinkProposal<'_>) -> Result<(), LineageError> {
    let class = proposal.link_type.class();
    let duplicate = proposal
        .existing_incoming
        .iter()
        .any(|(c, l)| *c == class && l == proposal.label);
    if duplicate {
        return Err(LineageError::Structural(format!(
            "node {} already has an incoming {class:?} link labeled `{}`",
            proposal.dest.uuid, proposal.label
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

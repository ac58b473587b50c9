//! # Node Lifecycle
//!
//! The one-way state machine governing node persistence:
//! `Transient` → `Stored` → `Sealed`.
//!
//! - Storing freezes attributes outside the kind's updatable whitelist
//! - Sealing freezes everything; it is terminal and idempotent
//! - No transition ever reverses

use crate::types::LineageError;
use serde::{Deserialize, Serialize};

/// Persistence state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Lifecycle {
    /// Never persisted; all attributes mutable.
    #[default]
    Transient,
    /// Persisted at least once; attributes frozen except the whitelist.
    Stored,
    /// Terminal, fully frozen. Process nodes only.
    Sealed,
}

impl Lifecycle {
    /// Whether the node has been persisted at least once.
    #[must_use]
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Stored | Self::Sealed)
    }

    /// Whether the node is permanently frozen.
    #[must_use]
    pub const fn is_sealed(self) -> bool {
        matches!(self, Self::Sealed)
    }

    /// Transition to `Stored`. Legal only from `Transient`.
    pub fn store(self) -> Result<Self, LineageError> {
        match self {
            Self::Transient => Ok(Self::Stored),
            Self::Stored | Self::Sealed => Err(LineageError::ModificationNotAllowed(
                "node is already stored".to_string(),
            )),
        }
    }

    /// Transition to `Sealed`. Legal from `Stored`; idempotent on `Sealed`.
    pub fn seal(self) -> Result<Self, LineageError> {
        match self {
            Self::Stored | Self::Sealed => Ok(Self::Sealed),
            Self::Transient => Err(LineageError::ModificationNotAllowed(
                "cannot seal a node that has not been stored".to_string(),
            )),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_stores_once() {
        let state = Lifecycle::Transient.store().expect("store");
        assert_eq!(state, Lifecycle::Stored);
        assert!(state.store().is_err());
    }

    #[test]
    fn seal_requires_storage() {
        assert!(Lifecycle::Transient.seal().is_err());
        assert_eq!(Lifecycle::Stored.seal().expect("seal"), Lifecycle::Sealed);
    }

    #[test]
    fn seal_is_idempotent() {
        let sealed = Lifecycle::Sealed;
        assert_eq!(sealed.seal().expect("seal"), Lifecycle::Sealed);
    }

    #[test]
    fn no_reverse_transitions() {
        // A sealed node can never be re-stored.
        assert!(Lifecycle::Sealed.store().is_err());
        assert!(Lifecycle::Sealed.is_stored());
        assert!(Lifecycle::Sealed.is_sealed());
    }
}

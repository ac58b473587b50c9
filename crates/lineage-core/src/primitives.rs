//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Lineage engine.
//!
//! These are compiled into the binary and immutable at runtime:
//! reserved attribute keys, input validation limits, and the on-disk
//! format version for the redb schema.

// =============================================================================
// RESERVED ATTRIBUTE KEYS
// =============================================================================

/// Attribute key recording that a process node has been sealed.
///
/// Sealing is written through the same attribute machinery it later locks;
/// this key is a member of every process kind's updatable whitelist.
pub const SEALED_KEY: &str = "sealed";

/// Attribute key holding the canonical process state string.
pub const PROCESS_STATE_KEY: &str = "process_state";

/// Attribute key holding a free-text status message for a process.
pub const PROCESS_STATUS_KEY: &str = "process_status";

/// Attribute key holding the integer exit status of a finished process.
pub const EXIT_STATUS_KEY: &str = "exit_status";

/// Attribute key holding the serialized exception of a failed process.
pub const EXCEPTION_KEY: &str = "exception";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for attribute and extras keys.
///
/// Keys longer than this are rejected before touching the store.
pub const MAX_ATTRIBUTE_KEY_LENGTH: usize = 1024;

/// Maximum length for link labels.
pub const MAX_LINK_LABEL_LENGTH: usize = 255;

/// Maximum length for node labels.
pub const MAX_NODE_LABEL_LENGTH: usize = 255;

// =============================================================================
// FORMAT
// =============================================================================

/// Current on-disk schema version for the redb backend.
///
/// Increment this when making breaking changes to the table layout.
pub const SCHEMA_VERSION: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_key_is_reserved() {
        assert_eq!(SEALED_KEY, "sealed");
    }

    #[test]
    fn limits_are_positive() {
        assert!(MAX_ATTRIBUTE_KEY_LENGTH > 0);
        assert!(MAX_LINK_LABEL_LENGTH > 0);
    }
}

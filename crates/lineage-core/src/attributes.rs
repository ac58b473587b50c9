//! # Attribute Store
//!
//! Per-node key/value storage for attributes and extras, with mutation
//! gating tied to the node's lifecycle state.
//!
//! - Attributes are scientific content: frozen at storage except for the
//!   kind's updatable whitelist, fully frozen at sealing
//! - Extras are user metadata: mutable for the node's whole lifetime
//! - Values are JSON documents, deep-copied at every boundary so a caller
//!   can never alias stored state through a returned value
//! - Absence (`MissingAttribute`) and forbiddance (`ModificationNotAllowed`)
//!   are distinct, separately testable failure kinds

use crate::lifecycle::Lifecycle;
use crate::primitives::MAX_ATTRIBUTE_KEY_LENGTH;
use crate::types::LineageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value storage for a single node's attributes and extras.
///
/// The store itself is state-agnostic: every gated operation receives the
/// owning node's `Lifecycle` and updatable-attribute whitelist explicitly.
/// The version counter is bumped on every successful post-store mutation,
/// attributes and extras alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStore {
    attributes: BTreeMap<String, Value>,
    extras: BTreeMap<String, Value>,
    version: u64,
}

/// Validate an attribute or extras key before any mutation.
fn validate_key(key: &str) -> Result<(), LineageError> {
    if key.is_empty() {
        return Err(LineageError::Structural(
            "attribute key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_ATTRIBUTE_KEY_LENGTH {
        return Err(LineageError::Structural(format!(
            "attribute key exceeds {MAX_ATTRIBUTE_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}

impl AttributeStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The node's version counter.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Bump the version counter if the node has been stored.
    ///
    /// Also used by the node handle for label/description edits, which
    /// follow the same uniform post-store versioning rule as attributes.
    pub fn bump_version(&mut self, lifecycle: Lifecycle) {
        if lifecycle.is_stored() {
            self.version = self.version.saturating_add(1);
        }
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    /// Set an attribute, subject to the standard mutation gate.
    pub fn set_attribute(
        &mut self,
        lifecycle: Lifecycle,
        whitelist: &[&str],
        key: &str,
        value: Value,
    ) -> Result<(), LineageError> {
        self.set_attribute_full(lifecycle, whitelist, key, value, false)
    }

    /// Set an attribute with an explicit escape hatch.
    ///
    /// `allow_if_stored` bypasses the post-storage whitelist check for
    /// internal bootstrapping (sealing writes its own marker through this
    /// path). It never bypasses the sealed check: a sealed node rejects
    /// every attribute mutation.
    pub fn set_attribute_full(
        &mut self,
        lifecycle: Lifecycle,
        whitelist: &[&str],
        key: &str,
        value: Value,
        allow_if_stored: bool,
    ) -> Result<(), LineageError> {
        validate_key(key)?;
        self.check_attribute_gate(lifecycle, whitelist, key, allow_if_stored)?;
        self.attributes.insert(key.to_string(), value);
        self.bump_version(lifecycle);
        Ok(())
    }

    /// Delete an attribute, subject to the standard mutation gate.
    ///
    /// The gate is checked before existence: deleting a forbidden key is
    /// `ModificationNotAllowed` even when the key is also absent. An
    /// allowed but absent key is `MissingAttribute`, never a generic error.
    pub fn delete_attribute(
        &mut self,
        lifecycle: Lifecycle,
        whitelist: &[&str],
        key: &str,
    ) -> Result<(), LineageError> {
        validate_key(key)?;
        self.check_attribute_gate(lifecycle, whitelist, key, false)?;
        if self.attributes.remove(key).is_none() {
            return Err(LineageError::MissingAttribute(key.to_string()));
        }
        self.bump_version(lifecycle);
        Ok(())
    }

    /// Get a deep copy of an attribute value.
    pub fn get_attribute(&self, key: &str) -> Result<Value, LineageError> {
        self.attributes
            .get(key)
            .cloned()
            .ok_or_else(|| LineageError::MissingAttribute(key.to_string()))
    }

    /// Get a deep copy of an attribute value, or a caller-supplied default.
    #[must_use]
    pub fn get_attribute_or(&self, key: &str, default: Value) -> Value {
        self.attributes.get(key).cloned().unwrap_or(default)
    }

    /// Whether an attribute key is present.
    #[must_use]
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Lazily iterate `(key, value)` pairs in deterministic key order.
    ///
    /// Re-iterating re-reads current state, not a snapshot. Values are
    /// deep copies.
    pub fn iterate_attributes(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.clone()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// The standard attribute mutation gate.
    fn check_attribute_gate(
        &self,
        lifecycle: Lifecycle,
        whitelist: &[&str],
        key: &str,
        allow_if_stored: bool,
    ) -> Result<(), LineageError> {
        match lifecycle {
            Lifecycle::Sealed => Err(LineageError::ModificationNotAllowed(format!(
                "cannot mutate attribute `{key}`: node is sealed"
            ))),
            Lifecycle::Stored if !allow_if_stored && !whitelist.contains(&key) => {
                Err(LineageError::ModificationNotAllowed(format!(
                    "cannot mutate attribute `{key}` after storage"
                )))
            }
            Lifecycle::Transient | Lifecycle::Stored => Ok(()),
        }
    }

    // =========================================================================
    // EXTRAS
    // =========================================================================

    /// Set an extra. Extras are mutable for the node's whole lifetime.
    pub fn set_extra(
        &mut self,
        lifecycle: Lifecycle,
        key: &str,
        value: Value,
    ) -> Result<(), LineageError> {
        validate_key(key)?;
        self.extras.insert(key.to_string(), value);
        self.bump_version(lifecycle);
        Ok(())
    }

    /// Delete an extra. An absent key is `MissingAttribute`.
    pub fn delete_extra(&mut self, lifecycle: Lifecycle, key: &str) -> Result<(), LineageError> {
        validate_key(key)?;
        if self.extras.remove(key).is_none() {
            return Err(LineageError::MissingAttribute(key.to_string()));
        }
        self.bump_version(lifecycle);
        Ok(())
    }

    /// Get a deep copy of an extra value.
    pub fn get_extra(&self, key: &str) -> Result<Value, LineageError> {
        self.extras
            .get(key)
            .cloned()
            .ok_or_else(|| LineageError::MissingAttribute(key.to_string()))
    }

    /// Lazily iterate `(key, value)` pairs of extras in key order.
    pub fn iterate_extras(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.extras.iter().map(|(k, v)| (k.as_str(), v.clone()))
    }

    // =========================================================================
    // RECORD CONVERSION
    // =========================================================================

    /// Snapshot the maps for persistence. Deep copies.
    #[must_use]
    pub fn to_maps(&self) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
        (self.attributes.clone(), self.extras.clone())
    }

    /// Rebuild a store from persisted maps.
    #[must_use]
    pub fn from_maps(
        attributes: BTreeMap<String, Value>,
        extras: BTreeMap<String, Value>,
        version: u64,
    ) -> Self {
        Self {
            attributes,
            extras,
            version,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WHITELIST: &[&str] = &["sealed", "process_state"];

    #[test]
    fn transient_allows_arbitrary_keys() {
        let mut store = AttributeStore::new();
        store
            .set_attribute(Lifecycle::Transient, &[], "energy", json!(-13.6))
            .expect("set");
        assert_eq!(store.get_attribute("energy").expect("get"), json!(-13.6));
        // No version bump before storage.
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn stored_rejects_non_whitelisted_keys() {
        let mut store = AttributeStore::new();
        store
            .set_attribute(Lifecycle::Transient, WHITELIST, "energy", json!(1))
            .expect("set");

        let err = store
            .set_attribute(Lifecycle::Stored, WHITELIST, "energy", json!(2))
            .expect_err("must reject");
        assert!(matches!(err, LineageError::ModificationNotAllowed(_)));

        // The pre-storage value is still readable.
        assert_eq!(store.get_attribute("energy").expect("get"), json!(1));
    }

    #[test]
    fn stored_allows_whitelisted_keys_and_bumps_version() {
        let mut store = AttributeStore::new();
        store
            .set_attribute(Lifecycle::Stored, WHITELIST, "process_state", json!("new"))
            .expect("set");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn sealed_rejects_even_whitelisted_keys() {
        let mut store = AttributeStore::new();
        let err = store
            .set_attribute(Lifecycle::Sealed, WHITELIST, "process_state", json!("x"))
            .expect_err("must reject");
        assert!(matches!(err, LineageError::ModificationNotAllowed(_)));
    }

    #[test]
    fn escape_hatch_bypasses_whitelist_but_not_seal() {
        let mut store = AttributeStore::new();
        store
            .set_attribute_full(Lifecycle::Stored, &[], "sealed", json!(true), true)
            .expect("escape hatch");

        let err = store
            .set_attribute_full(Lifecycle::Sealed, &[], "sealed", json!(false), true)
            .expect_err("sealed is terminal");
        assert!(matches!(err, LineageError::ModificationNotAllowed(_)));
    }

    #[test]
    fn delete_missing_is_missing_attribute_not_forbidden() {
        let mut store = AttributeStore::new();
        let err = store
            .delete_attribute(Lifecycle::Transient, &[], "absent")
            .expect_err("absent key");
        assert!(matches!(err, LineageError::MissingAttribute(_)));
    }

    #[test]
    fn delete_forbidden_wins_over_missing() {
        let mut store = AttributeStore::new();
        // Key is both absent and non-whitelisted on a stored node: the gate
        // fires first.
        let err = store
            .delete_attribute(Lifecycle::Stored, WHITELIST, "absent")
            .expect_err("gated");
        assert!(matches!(err, LineageError::ModificationNotAllowed(_)));
    }

    #[test]
    fn deep_copy_isolation_on_read_and_set() {
        let mut store = AttributeStore::new();
        let mut list = json!([1, 2, 3]);
        store
            .set_attribute(Lifecycle::Transient, &[], "list", list.clone())
            .expect("set");

        // Mutating the original after set does not change stored state.
        if let Some(arr) = list.as_array_mut() {
            arr.push(json!(4));
        }
        assert_eq!(store.get_attribute("list").expect("get"), json!([1, 2, 3]));

        // Mutating a returned value does not change stored state either.
        let mut returned = store.get_attribute("list").expect("get");
        if let Some(arr) = returned.as_array_mut() {
            arr.clear();
        }
        assert_eq!(store.get_attribute("list").expect("get"), json!([1, 2, 3]));
    }

    #[test]
    fn iteration_is_restartable_and_ordered() {
        let mut store = AttributeStore::new();
        store
            .set_attribute(Lifecycle::Transient, &[], "b", json!(2))
            .expect("set");
        store
            .set_attribute(Lifecycle::Transient, &[], "a", json!(1))
            .expect("set");

        let first: Vec<_> = store.iterate_attributes().map(|(k, _)| k.to_string()).collect();
        assert_eq!(first, vec!["a", "b"]);

        // Re-iteration reads current state.
        store
            .set_attribute(Lifecycle::Transient, &[], "c", json!(3))
            .expect("set");
        let second: Vec<_> = store.iterate_attributes().map(|(k, _)| k.to_string()).collect();
        assert_eq!(second, vec!["a", "b", "c"]);
    }

    #[test]
    fn extras_mutable_after_seal() {
        let mut store = AttributeStore::new();
        store
            .set_extra(Lifecycle::Sealed, "tag", json!("reference-run"))
            .expect("extras stay mutable");
        assert_eq!(
            store.get_extra("tag").expect("get"),
            json!("reference-run")
        );
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn get_attribute_or_returns_default() {
        let store = AttributeStore::new();
        assert_eq!(store.get_attribute_or("absent", json!(42)), json!(42));
    }

    #[test]
    fn empty_key_is_structural() {
        let mut store = AttributeStore::new();
        let err = store
            .set_attribute(Lifecycle::Transient, &[], "", json!(1))
            .expect_err("empty key");
        assert!(matches!(err, LineageError::Structural(_)));
    }
}

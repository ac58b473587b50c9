//! # File Repository
//!
//! Binary payloads attached to nodes (input files, raw outputs) live
//! outside the graph store, keyed by the owning node's UUID and a
//! relative name. The repository only accepts writes while the owning
//! node is unstored; the session enforces that gate, the repository just
//! holds bytes.

use crate::types::LineageError;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Content-addressed-by-owner file storage for node payloads.
pub trait FileRepository {
    /// Store a file under `(owner, name)`, replacing any previous content.
    fn put_file(&mut self, owner: Uuid, name: &str, content: &[u8]) -> Result<(), LineageError>;

    /// Read a file back. `NotExistent` if the owner has no file by that name.
    fn get_file(&self, owner: Uuid, name: &str) -> Result<Vec<u8>, LineageError>;

    /// Names of all files owned by a node, sorted.
    fn list_files(&self, owner: Uuid) -> Result<Vec<String>, LineageError>;

    /// Drop every file owned by a node. Removing an owner with no files
    /// is a no-op.
    fn delete_files(&mut self, owner: Uuid) -> Result<(), LineageError>;
}

/// In-memory repository backing tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    files: BTreeMap<(Uuid, String), Vec<u8>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileRepository for MemoryRepository {
    fn put_file(&mut self, owner: Uuid, name: &str, content: &[u8]) -> Result<(), LineageError> {
        if name.is_empty() {
            return Err(LineageError::Structural(
                "file name must not be empty".to_string(),
            ));
        }
        self.files.insert((owner, name.to_string()), content.to_vec());
        Ok(())
    }

    fn get_file(&self, owner: Uuid, name: &str) -> Result<Vec<u8>, LineageError> {
        self.files
            .get(&(owner, name.to_string()))
            .cloned()
            .ok_or_else(|| {
                LineageError::NotExistent(format!("node {owner} has no file `{name}`"))
            })
    }

    fn list_files(&self, owner: Uuid) -> Result<Vec<String>, LineageError> {
        Ok(self
            .files
            .range((owner, String::new())..)
            .take_while(|((o, _), _)| *o == owner)
            .map(|((_, name), _)| name.clone())
            .collect())
    }

    fn delete_files(&mut self, owner: Uuid) -> Result<(), LineageError> {
        self.files.retain(|(o, _), _| *o != owner);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let mut repo = MemoryRepository::new();
        let owner = Uuid::new_v4();
        repo.put_file(owner, "input.txt", b"cell parameters")
            .expect("put");
        assert_eq!(
            repo.get_file(owner, "input.txt").expect("get"),
            b"cell parameters"
        );
    }

    #[test]
    fn missing_file_is_not_existent() {
        let repo = MemoryRepository::new();
        let err = repo
            .get_file(Uuid::new_v4(), "absent")
            .expect_err("missing");
        assert!(matches!(err, LineageError::NotExistent(_)));
    }

    #[test]
    fn empty_name_rejected() {
        let mut repo = MemoryRepository::new();
        let err = repo
            .put_file(Uuid::new_v4(), "", b"x")
            .expect_err("empty name");
        assert!(matches!(err, LineageError::Structural(_)));
    }

    #[test]
    fn list_is_scoped_to_owner() {
        let mut repo = MemoryRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.put_file(a, "one", b"1").expect("put");
        repo.put_file(a, "two", b"2").expect("put");
        repo.put_file(b, "other", b"3").expect("put");

        assert_eq!(repo.list_files(a).expect("list"), vec!["one", "two"]);
        assert_eq!(repo.list_files(b).expect("list"), vec!["other"]);
    }

    #[test]
    fn delete_files_drops_only_the_owner() {
        let mut repo = MemoryRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.put_file(a, "one", b"1").expect("put");
        repo.put_file(b, "other", b"2").expect("put");

        repo.delete_files(a).expect("delete");
        assert!(repo.list_files(a).expect("list").is_empty());
        assert_eq!(repo.list_files(b).expect("list"), vec!["other"]);
    }

    #[test]
    fn put_replaces_previous_content() {
        let mut repo = MemoryRepository::new();
        let owner = Uuid::new_v4();
        repo.put_file(owner, "f", b"old").expect("put");
        repo.put_file(owner, "f", b"new").expect("put");
        assert_eq!(repo.get_file(owner, "f").expect("get"), b"new");
    }
}

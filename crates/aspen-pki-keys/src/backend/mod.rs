//! Storage collaborator for the key management core.
//!
//! The key store and the default pointer only ever talk to storage through
//! [`SecretsBackend`]. Single-path operations are assumed atomic; nothing
//! stronger (multi-path transactions) is required of an implementation.

#[cfg(feature = "redb")]
pub mod redb_backend;

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
#[cfg(feature = "redb")]
pub use self::redb_backend::RedbSecretsBackend;

/// Storage backend for the PKI engine.
///
/// Paths are relative to the engine's mount point.
#[async_trait]
pub trait SecretsBackend: Send + Sync {
    /// Store a value at the given path, replacing any existing value.
    async fn put(&self, path: &str, value: &[u8]) -> Result<()>;

    /// Get the value at the given path.
    ///
    /// Returns `None` if the path doesn't exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Delete the value at the given path.
    ///
    /// Returns `true` if a value existed. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// List the entries directly under a prefix.
    ///
    /// Returns sorted paths relative to the prefix. Entries with children
    /// further down are returned once, with a trailing `/`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// Put a value only if the stored version still matches.
    ///
    /// `expected_version = None` means the path must not exist yet.
    /// Returns `false` without writing when the check fails.
    async fn put_cas(&self, path: &str, value: &[u8], expected_version: Option<u64>) -> Result<bool>;

    /// Get a value together with its version.
    ///
    /// Every successful write assigns a new, strictly larger version.
    async fn get_with_version(&self, path: &str) -> Result<Option<(Vec<u8>, u64)>>;
}

/// Collapse full paths under `prefix` into the direct children of the prefix.
pub(crate) fn direct_children<'a>(prefix: &str, paths: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut children = BTreeSet::new();

    for path in paths {
        let Some(relative) = path.strip_prefix(prefix) else {
            continue;
        };
        match relative.find('/') {
            Some(slash_pos) => {
                children.insert(format!("{}/", &relative[..slash_pos]));
            }
            None if !relative.is_empty() => {
                children.insert(relative.to_string());
            }
            None => {}
        }
    }

    children.into_iter().collect()
}

/// In-memory backend for tests and ephemeral engines.
///
/// Thread-safe and deterministic.
#[derive(Default)]
pub struct InMemorySecretsBackend {
    data: RwLock<HashMap<String, (Vec<u8>, u64)>>,
    version_counter: AtomicU64,
}

impl InMemorySecretsBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl SecretsBackend for InMemorySecretsBackend {
    async fn put(&self, path: &str, value: &[u8]) -> Result<()> {
        let mut data = self.data.write().await;
        let version = self.next_version();
        data.insert(path.to_string(), (value.to_vec(), version));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().await;
        Ok(data.get(path).map(|(v, _)| v.clone()))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let mut data = self.data.write().await;
        Ok(data.remove(path).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(direct_children(prefix, data.keys().map(String::as_str)))
    }

    async fn put_cas(&self, path: &str, value: &[u8], expected_version: Option<u64>) -> Result<bool> {
        let mut data = self.data.write().await;

        let matches = match (data.get(path), expected_version) {
            (None, None) => true,
            (Some((_, current)), Some(expected)) => *current == expected,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }

        let version = self.next_version();
        data.insert(path.to_string(), (value.to_vec(), version));
        Ok(true)
    }

    async fn get_with_version(&self, path: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let data = self.data.read().await;
        Ok(data.get(path).cloned())
    }
}

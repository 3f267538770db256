//! Storage doubles for exercising concurrent interleavings.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::backend::InMemorySecretsBackend;
use crate::backend::SecretsBackend;
use crate::constants::KEYS_CONFIG_PATH;
use crate::error::Result;
use crate::keys::store::BackendKeyStore;
use crate::keys::store::KeyStore;
use crate::keys::types::KeyId;
use crate::keys::types::KeyRecord;
use crate::keys::types::KeysConfigEntry;
use crate::keys::types::NameClaim;

/// In-memory [`KeyStore`] with injectable races.
///
/// - Ids added with [`with_vanished_id`](Self::with_vanished_id) are enumerated
///   by `list_ids` but have no record, like a key deleted mid-scan.
/// - With [`with_claim_barrier`](Self::with_claim_barrier), the first `n`
///   claim reads wait for each other, so `n` claimants all observe the same
///   claim state before any of them writes.
pub(crate) struct RacyKeyStore {
    inner: BackendKeyStore,
    vanished: Vec<KeyId>,
    claim_barrier: Option<(Barrier, usize)>,
    claim_reads: AtomicUsize,
}

impl RacyKeyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: BackendKeyStore::new(Arc::new(InMemorySecretsBackend::new())),
            vanished: Vec::new(),
            claim_barrier: None,
            claim_reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_vanished_id(mut self, id: &str) -> Self {
        self.vanished.push(KeyId::from_string(id));
        self
    }

    pub(crate) fn with_claim_barrier(mut self, claimants: usize) -> Self {
        self.claim_barrier = Some((Barrier::new(claimants), claimants));
        self
    }
}

#[async_trait]
impl KeyStore for RacyKeyStore {
    async fn put(&self, record: &KeyRecord) -> Result<()> {
        self.inner.put(record).await
    }

    async fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>> {
        self.inner.get(id).await
    }

    async fn get_versioned(&self, id: &KeyId) -> Result<Option<(KeyRecord, u64)>> {
        self.inner.get_versioned(id).await
    }

    async fn put_if_version(&self, record: &KeyRecord, expected_version: Option<u64>) -> Result<bool> {
        self.inner.put_if_version(record, expected_version).await
    }

    async fn delete(&self, id: &KeyId) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn list_ids(&self) -> Result<Vec<KeyId>> {
        let mut ids = self.inner.list_ids().await?;
        ids.extend(self.vanished.iter().cloned());
        ids.sort();
        Ok(ids)
    }

    async fn get_name_claim(&self, name: &str) -> Result<Option<(NameClaim, u64)>> {
        let claim = self.inner.get_name_claim(name).await?;
        if let Some((barrier, claimants)) = &self.claim_barrier
            && self.claim_reads.fetch_add(1, Ordering::SeqCst) < *claimants
        {
            barrier.wait().await;
        }
        Ok(claim)
    }

    async fn put_name_claim(&self, name: &str, claim: &NameClaim, expected_version: Option<u64>) -> Result<bool> {
        self.inner.put_name_claim(name, claim, expected_version).await
    }

    async fn list_claimed_names(&self) -> Result<Vec<String>> {
        self.inner.list_claimed_names().await
    }
}

/// In-memory [`SecretsBackend`] that lets another writer move the default key
/// between a read of the keys config and the write that follows it.
#[derive(Default)]
pub(crate) struct InterleavingBackend {
    inner: InMemorySecretsBackend,
    pending_default: Mutex<Option<KeyId>>,
}

impl InterleavingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The next versioned read of the keys config returns what it saw, then
    /// the config is overwritten to point at `id`.
    pub(crate) fn set_default_after_next_read(&self, id: KeyId) {
        *self.pending_default.lock().unwrap() = Some(id);
    }
}

#[async_trait]
impl SecretsBackend for InterleavingBackend {
    async fn put(&self, path: &str, value: &[u8]) -> Result<()> {
        self.inner.put(path, value).await
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn put_cas(&self, path: &str, value: &[u8], expected_version: Option<u64>) -> Result<bool> {
        self.inner.put_cas(path, value, expected_version).await
    }

    async fn get_with_version(&self, path: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let seen = self.inner.get_with_version(path).await?;
        if path == KEYS_CONFIG_PATH {
            let pending = self.pending_default.lock().unwrap().take();
            if let Some(id) = pending {
                let config = KeysConfigEntry { default: Some(id) };
                self.inner.put(KEYS_CONFIG_PATH, &postcard::to_allocvec(&config).unwrap()).await?;
            }
        }
        Ok(seen)
    }
}

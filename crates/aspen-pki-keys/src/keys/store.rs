//! Key record store.
//!
//! Durable get/put/delete of key records by id on top of a [`SecretsBackend`],
//! plus the version-checked name claims the name index builds on. No name
//! checks happen here; uniqueness is enforced by [`NameIndex`](crate::keys::NameIndex).

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::SecretsBackend;
use crate::constants::KEY_RECORD_PREFIX;
use crate::constants::NAME_CLAIM_PREFIX;
use crate::error::KeysError;
use crate::error::Result;
use crate::keys::types::KeyId;
use crate::keys::types::KeyRecord;
use crate::keys::types::NameClaim;

/// Persistence of key records keyed by id.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Persist a record, overwriting any record with the same id.
    async fn put(&self, record: &KeyRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>>;

    /// Fetch a record together with its storage version.
    async fn get_versioned(&self, id: &KeyId) -> Result<Option<(KeyRecord, u64)>>;

    /// Write a record only if its stored version is still `expected_version`.
    ///
    /// `None` requires that no record with this id exists yet.
    /// Returns `false` without writing when the check fails.
    async fn put_if_version(&self, record: &KeyRecord, expected_version: Option<u64>) -> Result<bool>;

    /// Remove a record. Returns `true` if it existed.
    async fn delete(&self, id: &KeyId) -> Result<bool>;

    /// Enumerate all stored ids, sorted.
    async fn list_ids(&self) -> Result<Vec<KeyId>>;

    /// Fetch the claim on `name` together with its storage version.
    async fn get_name_claim(&self, name: &str) -> Result<Option<(NameClaim, u64)>>;

    /// Write the claim on `name` only if its stored version is still `expected_version`.
    ///
    /// `None` requires that the name has never been claimed.
    async fn put_name_claim(&self, name: &str, claim: &NameClaim, expected_version: Option<u64>) -> Result<bool>;

    /// Enumerate every name with a claim entry, held or released, sorted.
    async fn list_claimed_names(&self) -> Result<Vec<String>>;
}

/// [`KeyStore`] persisting postcard-encoded records at `config/key/<id>`.
pub struct BackendKeyStore {
    backend: Arc<dyn SecretsBackend>,
}

impl BackendKeyStore {
    /// Create a key store on the given backend.
    pub fn new(backend: Arc<dyn SecretsBackend>) -> Self {
        Self { backend }
    }

    fn record_path(id: &KeyId) -> String {
        format!("{}{}", KEY_RECORD_PREFIX, id)
    }

    fn claim_path(name: &str) -> String {
        format!("{}{}", NAME_CLAIM_PREFIX, name)
    }

    fn decode(id: &KeyId, bytes: &[u8]) -> Result<KeyRecord> {
        postcard::from_bytes(bytes).map_err(|e| KeysError::Internal {
            reason: format!("corrupted key record {id}: {e}"),
        })
    }

    fn encode(record: &KeyRecord) -> Result<Vec<u8>> {
        postcard::to_allocvec(record).map_err(|e| KeysError::Serialization { reason: e.to_string() })
    }
}

#[async_trait]
impl KeyStore for BackendKeyStore {
    async fn put(&self, record: &KeyRecord) -> Result<()> {
        let bytes = Self::encode(record)?;
        self.backend.put(&Self::record_path(&record.id), &bytes).await
    }

    async fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>> {
        match self.backend.get(&Self::record_path(id)).await? {
            Some(bytes) => Ok(Some(Self::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_versioned(&self, id: &KeyId) -> Result<Option<(KeyRecord, u64)>> {
        match self.backend.get_with_version(&Self::record_path(id)).await? {
            Some((bytes, version)) => Ok(Some((Self::decode(id, &bytes)?, version))),
            None => Ok(None),
        }
    }

    async fn put_if_version(&self, record: &KeyRecord, expected_version: Option<u64>) -> Result<bool> {
        let bytes = Self::encode(record)?;
        self.backend.put_cas(&Self::record_path(&record.id), &bytes, expected_version).await
    }

    async fn delete(&self, id: &KeyId) -> Result<bool> {
        self.backend.delete(&Self::record_path(id)).await
    }

    async fn list_ids(&self) -> Result<Vec<KeyId>> {
        let entries = self.backend.list(KEY_RECORD_PREFIX).await?;
        Ok(entries.into_iter().filter(|e| !e.ends_with('/')).map(KeyId::from_string).collect())
    }

    async fn get_name_claim(&self, name: &str) -> Result<Option<(NameClaim, u64)>> {
        match self.backend.get_with_version(&Self::claim_path(name)).await? {
            Some((bytes, version)) => {
                let claim = postcard::from_bytes(&bytes).map_err(|e| KeysError::Internal {
                    reason: format!("corrupted name claim {name}: {e}"),
                })?;
                Ok(Some((claim, version)))
            }
            None => Ok(None),
        }
    }

    async fn put_name_claim(&self, name: &str, claim: &NameClaim, expected_version: Option<u64>) -> Result<bool> {
        let bytes = postcard::to_allocvec(claim).map_err(|e| KeysError::Serialization { reason: e.to_string() })?;
        self.backend.put_cas(&Self::claim_path(name), &bytes, expected_version).await
    }

    async fn list_claimed_names(&self) -> Result<Vec<String>> {
        let entries = self.backend.list(NAME_CLAIM_PREFIX).await?;
        Ok(entries.into_iter().filter(|e| !e.ends_with('/')).collect())
    }
}

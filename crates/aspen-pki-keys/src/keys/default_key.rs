//! Default key pointer.
//!
//! Singleton state naming the key used when a caller omits an explicit
//! reference. Consumers only depend on the [`DefaultKeyPointer`] contract so
//! the in-memory fake can stand in for storage in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::SecretsBackend;
use crate::constants::KEYS_CONFIG_PATH;
use crate::constants::MAX_CAS_ATTEMPTS;
use crate::error::KeysError;
use crate::error::Result;
use crate::keys::types::KeyId;
use crate::keys::types::KeysConfigEntry;

/// Access to the default key pointer.
#[async_trait]
pub trait DefaultKeyPointer: Send + Sync {
    /// Current default key id, or `None` if unset.
    async fn get(&self) -> Result<Option<KeyId>>;

    /// Point the default at `id`.
    async fn set(&self, id: KeyId) -> Result<()>;

    /// Unset the default.
    async fn clear(&self) -> Result<()>;

    /// Unset the default only if it still points at `id`.
    ///
    /// Returns whether the pointer was cleared. A pointer moved elsewhere in
    /// the meantime is left as it is.
    async fn clear_if(&self, id: &KeyId) -> Result<bool>;
}

/// Default pointer persisted in the keys configuration entry.
pub struct StoredDefaultKey {
    backend: Arc<dyn SecretsBackend>,
}

impl StoredDefaultKey {
    /// Create a pointer backed by `config/keys` on the given backend.
    pub fn new(backend: Arc<dyn SecretsBackend>) -> Self {
        Self { backend }
    }

    async fn load_config(&self) -> Result<Option<(KeysConfigEntry, u64)>> {
        match self.backend.get_with_version(KEYS_CONFIG_PATH).await? {
            Some((bytes, version)) => {
                let config = postcard::from_bytes(&bytes).map_err(|e| KeysError::Internal {
                    reason: format!("corrupted keys config: {e}"),
                })?;
                Ok(Some((config, version)))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write of the config entry under a version check.
    ///
    /// `apply` returns false to skip the write. Returns whether a write happened.
    async fn update_config(&self, mut apply: impl FnMut(&mut KeysConfigEntry) -> bool + Send) -> Result<bool> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (mut config, expected) = match self.load_config().await? {
                Some((config, version)) => (config, Some(version)),
                None => (KeysConfigEntry::default(), None),
            };
            if !apply(&mut config) {
                return Ok(false);
            }

            let bytes =
                postcard::to_allocvec(&config).map_err(|e| KeysError::Serialization { reason: e.to_string() })?;
            if self.backend.put_cas(KEYS_CONFIG_PATH, &bytes, expected).await? {
                return Ok(true);
            }
            debug!("Keys config changed during update, retrying");
        }

        Err(KeysError::Storage {
            reason: format!("keys config kept changing after {MAX_CAS_ATTEMPTS} attempts"),
        })
    }
}

#[async_trait]
impl DefaultKeyPointer for StoredDefaultKey {
    async fn get(&self) -> Result<Option<KeyId>> {
        Ok(self.load_config().await?.and_then(|(config, _)| config.default))
    }

    async fn set(&self, id: KeyId) -> Result<()> {
        self.update_config(|config| {
            config.default = Some(id.clone());
            true
        })
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.update_config(|config| config.default.take().is_some()).await?;
        Ok(())
    }

    async fn clear_if(&self, id: &KeyId) -> Result<bool> {
        self.update_config(|config| {
            if config.default.as_ref() != Some(id) {
                return false;
            }
            config.default = None;
            true
        })
        .await
    }
}

/// In-memory default pointer for tests.
#[derive(Default)]
pub struct InMemoryDefaultKey {
    default: RwLock<Option<KeyId>>,
}

impl InMemoryDefaultKey {
    /// Create an unset pointer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefaultKeyPointer for InMemoryDefaultKey {
    async fn get(&self) -> Result<Option<KeyId>> {
        Ok(self.default.read().await.clone())
    }

    async fn set(&self, id: KeyId) -> Result<()> {
        *self.default.write().await = Some(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.default.write().await = None;
        Ok(())
    }

    async fn clear_if(&self, id: &KeyId) -> Result<bool> {
        let mut default = self.default.write().await;
        if default.as_ref() != Some(id) {
            return Ok(false);
        }
        *default = None;
        Ok(true)
    }
}

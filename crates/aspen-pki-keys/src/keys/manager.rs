//! Key lifecycle operations.
//!
//! List, read, rename, and delete, plus registration of externally generated
//! keys and default key assignment. Rename is guarded by a version check on
//! the record, so a rename that races with another writer fails instead of
//! overwriting it. Assigning a name first takes the name's claim, so two
//! writers racing for one name cannot both keep it.
//!
//! Deleting the default key clears the pointer after the record is gone, and
//! only if it still names that key. Without multi-path transactions in the
//! backend, a crash between those two writes leaves a dangling pointer;
//! resolving `default` then reports the missing key. A crash between claiming
//! a name and writing the record leaves a claim that blocks the name until
//! [`StoredKeyManager::rebuild_name_claims`] runs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::backend::SecretsBackend;
use crate::constants::MAX_KEY_MATERIAL_SIZE;
use crate::error::KeysError;
use crate::error::Result;
use crate::keys::default_key::DefaultKeyPointer;
use crate::keys::default_key::StoredDefaultKey;
use crate::keys::name::NameIndex;
use crate::keys::name::validate_key_name;
use crate::keys::resolver::KeyResolver;
use crate::keys::store::BackendKeyStore;
use crate::keys::store::KeyStore;
use crate::keys::types::DeleteKeyResponse;
use crate::keys::types::ImportKeyRequest;
use crate::keys::types::ImportKeyResponse;
use crate::keys::types::KeyEntry;
use crate::keys::types::KeyId;
use crate::keys::types::KeyInfo;
use crate::keys::types::KeyMaterial;
use crate::keys::types::KeyRecord;
use crate::keys::types::ListKeysResponse;
use crate::keys::types::UpdateKeyRequest;
use crate::keys::types::UpdateKeyResponse;

/// PKI key lifecycle.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// List all keys with their names.
    async fn list_keys(&self) -> Result<ListKeysResponse>;

    /// Read a key by reference.
    async fn read_key(&self, reference: &str) -> Result<KeyEntry>;

    /// Rename a key. An empty name removes the name.
    async fn update_key(&self, request: UpdateKeyRequest) -> Result<UpdateKeyResponse>;

    /// Delete a key, clearing the default pointer if it named this key.
    async fn delete_key(&self, reference: &str) -> Result<DeleteKeyResponse>;

    /// Register externally generated key material under a fresh id.
    async fn import_key(&self, request: ImportKeyRequest) -> Result<ImportKeyResponse>;

    /// Point the default at the key `reference` resolves to.
    async fn set_default_key(&self, reference: &str) -> Result<KeyId>;

    /// Current default key id, if any.
    async fn read_default_key(&self) -> Result<Option<KeyId>>;
}

/// [`KeyManager`] over a key store and a default pointer.
pub struct StoredKeyManager {
    store: Arc<dyn KeyStore>,
    default_key: Arc<dyn DefaultKeyPointer>,
    resolver: KeyResolver,
    names: NameIndex,
}

impl StoredKeyManager {
    /// Create a manager from its collaborators.
    pub fn new(store: Arc<dyn KeyStore>, default_key: Arc<dyn DefaultKeyPointer>) -> Self {
        Self {
            resolver: KeyResolver::new(store.clone(), default_key.clone()),
            names: NameIndex::new(store.clone()),
            store,
            default_key,
        }
    }

    /// Create a manager keeping records and the default pointer on one backend.
    pub fn with_backend(backend: Arc<dyn SecretsBackend>) -> Self {
        Self::new(Arc::new(BackendKeyStore::new(backend.clone())), Arc::new(StoredDefaultKey::new(backend)))
    }

    /// The resolver used by this manager.
    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Reconcile name claims with the stored records. Run with no concurrent writers.
    pub async fn rebuild_name_claims(&self) -> Result<usize> {
        self.names.rebuild().await
    }

    async fn fetch(&self, id: &KeyId) -> Result<KeyRecord> {
        self.store.get(id).await?.ok_or_else(|| KeysError::KeyNotFound { id: id.to_string() })
    }

    /// Find a record holding byte-identical stored material.
    async fn find_stored_material(&self, material: &[u8]) -> Result<Option<KeyRecord>> {
        for id in self.store.list_ids().await? {
            if let Some(record) = self.store.get(&id).await?
                && matches!(&record.material, KeyMaterial::Stored(bytes) if bytes.as_slice() == material)
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl KeyManager for StoredKeyManager {
    async fn list_keys(&self) -> Result<ListKeysResponse> {
        let mut response = ListKeysResponse::default();

        for id in self.store.list_ids().await? {
            // A key deleted between enumeration and fetch is simply skipped.
            let Some(record) = self.store.get(&id).await? else {
                warn!(id = %id, "Key disappeared while listing, skipping");
                continue;
            };

            response.key_info.insert(id.clone(), KeyInfo { name: record.name });
            response.keys.push(id);
        }

        debug!(count = response.keys.len(), "Listed keys");
        Ok(response)
    }

    async fn read_key(&self, reference: &str) -> Result<KeyEntry> {
        let id = self.resolver.resolve_id(reference).await?;
        let record = self.fetch(&id).await?;
        Ok(record.entry())
    }

    async fn update_key(&self, request: UpdateKeyRequest) -> Result<UpdateKeyResponse> {
        let id = self.resolver.resolve_id(&request.reference).await?;
        let (mut record, version) =
            self.store.get_versioned(&id).await?.ok_or_else(|| KeysError::KeyNotFound { id: id.to_string() })?;

        let new_name = request.name;
        if !new_name.is_empty() {
            validate_key_name(&new_name)?;
        }

        let mut warnings = Vec::new();

        if new_name != record.name {
            if !new_name.is_empty() {
                self.names.ensure_available(&new_name, Some(&record.id)).await?;
                self.names.claim(&new_name, &record.id).await?;
            }

            let old_name = std::mem::replace(&mut record.name, new_name);
            if !self.store.put_if_version(&record, Some(version)).await? {
                self.names.release(&record.name, &record.id).await?;
                return Err(KeysError::ConcurrentModification { id: id.to_string() });
            }
            self.names.release(&old_name, &record.id).await?;

            debug!(id = %record.id, old_name = %old_name, new_name = %record.name, "Renamed key");

            if record.name.is_empty() {
                warnings.push(format!(
                    "Name successfully deleted, you will now need to reference this key by its id: {}",
                    record.id
                ));
            }
        }

        Ok(UpdateKeyResponse {
            key: record.entry(),
            warnings,
        })
    }

    async fn delete_key(&self, reference: &str) -> Result<DeleteKeyResponse> {
        let id = self.resolver.resolve_id(reference).await?;

        let record = self.store.get(&id).await?;
        self.store.delete(&id).await?;
        if let Some(record) = &record {
            self.names.release(&record.name, &id).await?;
        }

        let was_default = self.default_key.clear_if(&id).await?;
        let mut warnings = Vec::new();
        if was_default {
            warn!(id = %id, reference = %reference, "Deleted the default key; default is now unset");
            warnings.push(format!(
                "Deleted key {} (via key_ref {}); this was configured as the default key. Operations without an \
                 explicit key will not work until a new default is configured.",
                id, reference
            ));
        }

        debug!(id = %id, was_default = was_default, "Deleted key");

        Ok(DeleteKeyResponse {
            id,
            was_default,
            warnings,
        })
    }

    async fn import_key(&self, request: ImportKeyRequest) -> Result<ImportKeyResponse> {
        if !request.name.is_empty() {
            validate_key_name(&request.name)?;
        }

        let size = request.material.size_bytes();
        if size > MAX_KEY_MATERIAL_SIZE {
            return Err(KeysError::KeyMaterialTooLarge {
                size,
                max: MAX_KEY_MATERIAL_SIZE,
            });
        }

        if let KeyMaterial::Stored(bytes) = &request.material
            && let Some(existing) = self.find_stored_material(bytes).await?
        {
            debug!(id = %existing.id, "Key material already registered");
            let mut warnings = Vec::new();
            if !request.name.is_empty() && request.name != existing.name {
                warnings.push(format!(
                    "Key material is already registered as key {}; the requested name {:?} was not applied",
                    existing.id, request.name
                ));
            }
            if request.key_type != existing.key_type {
                warnings.push(format!(
                    "Key material is already registered as key {} with type {}; the requested type {} was ignored",
                    existing.id, existing.key_type, request.key_type
                ));
            }
            return Ok(ImportKeyResponse {
                key: existing.entry(),
                existing: true,
                warnings,
            });
        }

        if !request.name.is_empty() {
            self.names.ensure_available(&request.name, None).await?;
        }

        // The record exists before its name is claimed, so the claim never
        // points at a missing holder.
        let mut record = KeyRecord::new("", request.key_type, request.material);
        if !self.store.put_if_version(&record, None).await? {
            return Err(KeysError::Internal {
                reason: format!("generated key id {} already exists", record.id),
            });
        }

        if !request.name.is_empty() {
            if let Err(e) = self.names.claim(&request.name, &record.id).await {
                self.store.delete(&record.id).await?;
                return Err(e);
            }

            let version = match self.store.get_versioned(&record.id).await? {
                Some((_, version)) => version,
                None => {
                    self.names.release(&request.name, &record.id).await?;
                    return Err(KeysError::ConcurrentModification {
                        id: record.id.to_string(),
                    });
                }
            };
            record.name = request.name;
            if !self.store.put_if_version(&record, Some(version)).await? {
                self.names.release(&record.name, &record.id).await?;
                return Err(KeysError::ConcurrentModification {
                    id: record.id.to_string(),
                });
            }
        }

        info!(id = %record.id, name = %record.name, key_type = %record.key_type, "Imported key");

        Ok(ImportKeyResponse {
            key: record.entry(),
            existing: false,
            warnings: Vec::new(),
        })
    }

    async fn set_default_key(&self, reference: &str) -> Result<KeyId> {
        let id = self.resolver.resolve_id(reference).await?;
        // The pointer may only name an existing record.
        self.fetch(&id).await?;
        self.default_key.set(id.clone()).await?;

        info!(id = %id, reference = %reference, "Set default key");
        Ok(id)
    }

    async fn read_default_key(&self) -> Result<Option<KeyId>> {
        self.default_key.get().await
    }
}

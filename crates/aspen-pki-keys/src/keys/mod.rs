//! PKI key management.
//!
//! Storage, naming, and reference resolution for the asymmetric keys the
//! certificate authority signs with:
//! - Key records addressed by a permanent id
//! - Optional unique names, guarded by version-checked name claims
//! - A default key pointer that is cleared when its key is deleted
//! - Reference resolution (`default`, id, or name)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aspen_pki_keys::keys::{KeyManager, StoredKeyManager, ImportKeyRequest, PrivateKeyType, UpdateKeyRequest};
//! use aspen_pki_keys::backend::InMemorySecretsBackend;
//! use std::sync::Arc;
//!
//! let manager = StoredKeyManager::with_backend(Arc::new(InMemorySecretsBackend::new()));
//!
//! // Register a key and make it the default
//! let imported = manager.import_key(
//!     ImportKeyRequest::stored(PrivateKeyType::Ec, pem_bytes).with_name("ca-root")
//! ).await?;
//! manager.set_default_key("ca-root").await?;
//!
//! // Rename it; it stays addressable by id and by "default"
//! manager.update_key(UpdateKeyRequest::new("default", "ca-root-2024")).await?;
//! ```

mod default_key;
mod manager;
mod name;
mod resolver;
mod store;
#[cfg(test)]
mod test_support;
mod types;

pub use default_key::DefaultKeyPointer;
pub use default_key::InMemoryDefaultKey;
pub use default_key::StoredDefaultKey;
pub use manager::KeyManager;
pub use manager::StoredKeyManager;
pub use name::NameIndex;
pub use name::validate_key_name;
pub use resolver::KeyReference;
pub use resolver::KeyResolver;
pub use resolver::ReferenceKind;
pub use resolver::Resolution;
pub use store::BackendKeyStore;
pub use store::KeyStore;
pub use types::DeleteKeyResponse;
pub use types::ImportKeyRequest;
pub use types::ImportKeyResponse;
pub use types::KeyEntry;
pub use types::KeyId;
pub use types::KeyInfo;
pub use types::KeyMaterial;
pub use types::KeyRecord;
pub use types::KeysConfigEntry;
pub use types::ListKeysResponse;
pub use types::NameClaim;
pub use types::PrivateKeyType;
pub use types::UpdateKeyRequest;
pub use types::UpdateKeyResponse;

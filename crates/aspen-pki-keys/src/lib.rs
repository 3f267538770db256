//! Key management for the Aspen PKI secrets engine.
//!
//! A PKI mount holds any number of asymmetric signing keys. This crate keeps
//! track of them:
//!
//! - **Key records**: permanent generated id, optional unique name, key type, and material
//! - **Default key**: a singleton pointer used when a caller gives no explicit reference
//! - **References**: `default`, a key id, or a key name, resolved in that order
//! - **Lifecycle**: list, read, rename, delete, import, set default
//!
//! Records live behind the [`SecretsBackend`] contract, either in memory or in
//! a redb database file.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aspen_pki_keys::{KeysConfig, KeysHandler, KeysRequest, StoredKeyManager};
//! use std::sync::Arc;
//!
//! let config = KeysConfig::load("/etc/aspen/pki-keys.toml")?;
//! let manager = StoredKeyManager::with_backend(config.open_backend()?);
//! let handler = KeysHandler::new(Arc::new(manager));
//!
//! let response = handler.handle(KeysRequest::Read { reference: None }).await?;
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod keys;

// Re-export backend types
pub use backend::InMemorySecretsBackend;
#[cfg(feature = "redb")]
pub use backend::RedbSecretsBackend;
pub use backend::SecretsBackend;
pub use config::KeysConfig;
pub use config::StorageBackendKind;
pub use config::StorageConfig;
pub use constants::*;
pub use error::KeysError;
pub use error::Result;
// Re-export handler types
pub use handler::KeysHandler;
pub use handler::KeysRequest;
pub use handler::KeysResponse;
// Re-export key types
pub use keys::DefaultKeyPointer;
pub use keys::ImportKeyRequest;
pub use keys::KeyEntry;
pub use keys::KeyId;
pub use keys::KeyManager;
pub use keys::KeyMaterial;
pub use keys::KeyResolver;
pub use keys::PrivateKeyType;
pub use keys::StoredKeyManager;
pub use keys::UpdateKeyRequest;

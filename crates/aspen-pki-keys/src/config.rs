//! Configuration for PKI key management.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::backend::InMemorySecretsBackend;
use crate::backend::SecretsBackend;
use crate::constants::DEFAULT_PKI_MOUNT;
use crate::constants::DEFAULT_STORAGE_PATH;
use crate::error::KeysError;
use crate::error::Result;

/// Which storage backend holds key records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Process-local, lost on exit.
    Memory,
    /// Single-file redb database.
    #[default]
    Redb,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Database file for the redb backend.
    ///
    /// Default: `./data/pki-keys.redb`
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            path: default_storage_path(),
        }
    }
}

/// Configuration for the PKI key management engine.
///
/// Loaded from TOML:
///
/// ```toml
/// mount = "pki"
///
/// [storage]
/// backend = "redb"
/// path = "/var/lib/aspen/pki-keys.redb"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Mount point of the PKI engine. Each mount has isolated storage.
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_mount() -> String {
    DEFAULT_PKI_MOUNT.into()
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            mount: default_mount(),
            storage: StorageConfig::default(),
        }
    }
}

impl KeysConfig {
    /// Configuration using the in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackendKind::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set the mount point.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| KeysError::Config {
            reason: format!("failed to parse TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| KeysError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.mount.is_empty() {
            return Err(KeysError::Config {
                reason: "mount must not be empty".into(),
            });
        }
        if self.mount.contains('/') {
            return Err(KeysError::Config {
                reason: format!("mount '{}' must not contain '/'", self.mount),
            });
        }
        if self.storage.backend == StorageBackendKind::Redb && self.storage.path.as_os_str().is_empty() {
            return Err(KeysError::Config {
                reason: "storage.path must be set for the redb backend".into(),
            });
        }
        Ok(())
    }

    /// Open the configured storage backend.
    pub fn open_backend(&self) -> Result<Arc<dyn SecretsBackend>> {
        self.validate()?;
        match self.storage.backend {
            StorageBackendKind::Memory => Ok(Arc::new(InMemorySecretsBackend::new())),
            #[cfg(feature = "redb")]
            StorageBackendKind::Redb => {
                Ok(Arc::new(crate::backend::RedbSecretsBackend::open(&self.storage.path, &self.mount)?))
            }
            #[cfg(not(feature = "redb"))]
            StorageBackendKind::Redb => Err(KeysError::Config {
                reason: "redb backend support is not compiled in".into(),
            }),
        }
    }
}

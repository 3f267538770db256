//! Durable single-file backend on redb.
//!
//! Values and their versions live in separate tables and are always written
//! in the same transaction. The version counter is kept in a metadata table
//! so versions stay monotonic across restarts.

use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use redb::Database;
use redb::ReadableTable;
use redb::TableDefinition;
use redb::WriteTransaction;
use tracing::debug;

use super::SecretsBackend;
use super::direct_children;
use crate::error::KeysError;
use crate::error::Result;

/// Stored values: key = `<mount>/<path>`, value = raw bytes.
const VALUES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pki_values");

/// Value versions: key = `<mount>/<path>`, value = version of the stored value.
const VERSIONS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("pki_versions");

/// Backend metadata. Keys: "version_counter".
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("pki_meta");

const VERSION_COUNTER_KEY: &str = "version_counter";

fn storage_error<E: Display>(action: &'static str) -> impl FnOnce(E) -> KeysError {
    move |e| KeysError::Storage {
        reason: format!("failed to {action}: {e}"),
    }
}

/// Persistent secrets backend scoped to one mount.
pub struct RedbSecretsBackend {
    db: Arc<Database>,
    path: PathBuf,
    prefix: String,
}

impl RedbSecretsBackend {
    /// Open (or create) the database at `path` and scope it to `mount`.
    pub fn open(path: impl AsRef<Path>, mount: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| KeysError::Storage {
                reason: format!("failed to create directory {}: {e}", parent.display()),
            })?;
        }

        let db = Database::create(&path).map_err(storage_error("open redb database"))?;

        let write_txn = db.begin_write().map_err(storage_error("begin write transaction"))?;
        {
            write_txn.open_table(VALUES_TABLE).map_err(storage_error("open values table"))?;
            write_txn.open_table(VERSIONS_TABLE).map_err(storage_error("open versions table"))?;
            write_txn.open_table(META_TABLE).map_err(storage_error("open meta table"))?;
        }
        write_txn.commit().map_err(storage_error("commit"))?;

        debug!(path = %path.display(), mount = %mount, "Opened redb secrets backend");

        Ok(Self {
            db: Arc::new(db),
            path,
            prefix: format!("{}/", mount),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn full_path(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Bump the persistent version counter inside `txn`.
    fn next_version(txn: &WriteTransaction) -> Result<u64> {
        let mut meta = txn.open_table(META_TABLE).map_err(storage_error("open meta table"))?;
        let current = meta.get(VERSION_COUNTER_KEY).map_err(storage_error("read version counter"))?.map(|v| v.value());
        let next = current.unwrap_or(0) + 1;
        meta.insert(VERSION_COUNTER_KEY, next).map_err(storage_error("write version counter"))?;
        Ok(next)
    }

    fn write_value(txn: &WriteTransaction, full_path: &str, value: &[u8]) -> Result<()> {
        let version = Self::next_version(txn)?;

        let mut values = txn.open_table(VALUES_TABLE).map_err(storage_error("open values table"))?;
        values.insert(full_path, value).map_err(storage_error("insert value"))?;

        let mut versions = txn.open_table(VERSIONS_TABLE).map_err(storage_error("open versions table"))?;
        versions.insert(full_path, version).map_err(storage_error("insert version"))?;
        Ok(())
    }
}

#[async_trait]
impl SecretsBackend for RedbSecretsBackend {
    async fn put(&self, path: &str, value: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        let write_txn = self.db.begin_write().map_err(storage_error("begin write transaction"))?;
        Self::write_value(&write_txn, &full_path, value)?;
        write_txn.commit().map_err(storage_error("commit"))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_version(path).await?.map(|(value, _)| value))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);

        let write_txn = self.db.begin_write().map_err(storage_error("begin write transaction"))?;
        let existed = {
            let mut values = write_txn.open_table(VALUES_TABLE).map_err(storage_error("open values table"))?;
            let existed = values.remove(full_path.as_str()).map_err(storage_error("remove value"))?.is_some();

            let mut versions = write_txn.open_table(VERSIONS_TABLE).map_err(storage_error("open versions table"))?;
            versions.remove(full_path.as_str()).map_err(storage_error("remove version"))?;
            existed
        };
        write_txn.commit().map_err(storage_error("commit"))?;
        Ok(existed)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.full_path(prefix);

        let read_txn = self.db.begin_read().map_err(storage_error("begin read transaction"))?;
        let values = read_txn.open_table(VALUES_TABLE).map_err(storage_error("open values table"))?;

        let mut paths = Vec::new();
        for entry in values.range(full_prefix.as_str()..).map_err(storage_error("scan values"))? {
            let (key, _) = entry.map_err(storage_error("read scanned entry"))?;
            let key = key.value();
            if !key.starts_with(&full_prefix) {
                break;
            }
            paths.push(key.to_string());
        }

        Ok(direct_children(&full_prefix, paths.iter().map(String::as_str)))
    }

    async fn put_cas(&self, path: &str, value: &[u8], expected_version: Option<u64>) -> Result<bool> {
        let full_path = self.full_path(path);

        let write_txn = self.db.begin_write().map_err(storage_error("begin write transaction"))?;
        let current = {
            let versions = write_txn.open_table(VERSIONS_TABLE).map_err(storage_error("open versions table"))?;
            versions.get(full_path.as_str()).map_err(storage_error("read version"))?.map(|v| v.value())
        };

        if current != expected_version {
            write_txn.abort().map_err(storage_error("abort"))?;
            return Ok(false);
        }

        Self::write_value(&write_txn, &full_path, value)?;
        write_txn.commit().map_err(storage_error("commit"))?;
        Ok(true)
    }

    async fn get_with_version(&self, path: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let full_path = self.full_path(path);

        let read_txn = self.db.begin_read().map_err(storage_error("begin read transaction"))?;
        let values = read_txn.open_table(VALUES_TABLE).map_err(storage_error("open values table"))?;
        let versions = read_txn.open_table(VERSIONS_TABLE).map_err(storage_error("open versions table"))?;

        let value = values.get(full_path.as_str()).map_err(storage_error("read value"))?.map(|v| v.value().to_vec());
        let version = versions.get(full_path.as_str()).map_err(storage_error("read version"))?.map(|v| v.value());

        match (value, version) {
            (Some(value), Some(version)) => Ok(Some((value, version))),
            (None, _) => Ok(None),
            (Some(_), None) => Err(KeysError::Internal {
                reason: format!("value at {path} has no version"),
            }),
        }
    }
}

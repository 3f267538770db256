//! Key name validation and the name index.
//!
//! At most one key record holds any given non-empty name. Lookups scan the
//! record store; uniqueness under concurrent writers rests on version-checked
//! name claims.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use tracing::warn;

use crate::constants::DEFAULT_KEY_REF;
use crate::constants::MAX_CAS_ATTEMPTS;
use crate::constants::MAX_KEY_NAME_LENGTH;
use crate::error::KeysError;
use crate::error::Result;
use crate::keys::store::KeyStore;
use crate::keys::types::KeyId;
use crate::keys::types::NameClaim;

/// Word characters, with `.` and `-` allowed only between them.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_](?:[A-Za-z0-9_.\-]*[A-Za-z0-9_])?$").expect("key name pattern is valid")
});

/// Check that a non-empty name may be assigned to a key.
///
/// Empty names are not checked here: they always mean "un-named".
pub fn validate_key_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| KeysError::InvalidKeyName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() > MAX_KEY_NAME_LENGTH {
        return Err(invalid(&format!("longer than {MAX_KEY_NAME_LENGTH} bytes")));
    }
    if name == DEFAULT_KEY_REF {
        return Err(invalid("'default' is a reserved reference"));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(invalid("outside of valid character limits"));
    }
    Ok(())
}

/// Name lookups and name claims.
///
/// Lookups scan the record store, which is the source of truth for what a
/// name resolves to. Assigning a name additionally takes a claim entry at
/// `config/name/<name>` with a version check, so two writers racing for the
/// same name cannot both win. A claim whose holder record no longer exists is
/// stale and may be taken over. A claim whose holder exists under a different
/// name (a writer that crashed between claiming and writing its record) blocks
/// the name until [`rebuild`](Self::rebuild) runs.
pub struct NameIndex {
    store: Arc<dyn KeyStore>,
}

impl NameIndex {
    /// Create an index over the given store.
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Find the id of the record holding `name`.
    ///
    /// The empty name never matches. Records that vanish mid-scan are skipped.
    pub async fn find(&self, name: &str) -> Result<Option<KeyId>> {
        if name.is_empty() {
            return Ok(None);
        }

        for id in self.store.list_ids().await? {
            match self.store.get(&id).await? {
                Some(record) if record.name == name => return Ok(Some(record.id)),
                Some(_) => {}
                None => debug!(id = %id, "Key vanished during name scan"),
            }
        }
        Ok(None)
    }

    /// Fail if `name` is held by a record other than `owner`.
    pub async fn ensure_available(&self, name: &str, owner: Option<&KeyId>) -> Result<()> {
        match self.find(name).await? {
            Some(holder) if Some(&holder) != owner => Err(KeysError::KeyNameInUse {
                name: name.to_string(),
                id: holder.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Claim `name` for `id`.
    ///
    /// Succeeds if the claim is free, stale, or already held by `id`. Fails
    /// with [`KeysError::KeyNameInUse`] if another live record holds it.
    pub async fn claim(&self, name: &str, id: &KeyId) -> Result<()> {
        self.claim_with(name, id, false).await
    }

    /// Give up `id`'s claim on `name`. A claim held by someone else is left alone.
    pub async fn release(&self, name: &str, id: &KeyId) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        if let Some((claim, version)) = self.store.get_name_claim(name).await?
            && claim.holder.as_ref() == Some(id)
            && !self.store.put_name_claim(name, &NameClaim::default(), Some(version)).await?
        {
            debug!(name = %name, id = %id, "Name claim changed hands during release");
        }
        Ok(())
    }

    /// Reconcile claims with the records.
    ///
    /// Every named record gets its claim, and claims whose holder does not
    /// carry the name are released. Meant for maintenance with no concurrent
    /// writers, since an in-flight rename looks exactly like a crashed one.
    /// Returns the number of names held after the rebuild.
    pub async fn rebuild(&self) -> Result<usize> {
        let mut held = 0;

        for id in self.store.list_ids().await? {
            let Some(record) = self.store.get(&id).await? else {
                continue;
            };
            if record.name.is_empty() {
                continue;
            }
            match self.claim_with(&record.name, &record.id, true).await {
                Ok(()) => held += 1,
                Err(KeysError::KeyNameInUse { name, id: holder }) => {
                    warn!(name = %name, holder = %holder, duplicate = %record.id, "Name carried by more than one key");
                }
                Err(e) => return Err(e),
            }
        }

        for name in self.store.list_claimed_names().await? {
            if let Some((claim, version)) = self.store.get_name_claim(&name).await?
                && let Some(holder) = &claim.holder
                && self.is_stale(&name, holder, true).await?
                && self.store.put_name_claim(&name, &NameClaim::default(), Some(version)).await?
            {
                debug!(name = %name, holder = %holder, "Released orphaned name claim");
            }
        }

        debug!(held = held, "Rebuilt name claims");
        Ok(held)
    }

    async fn claim_with(&self, name: &str, id: &KeyId, repair: bool) -> Result<()> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let expected = match self.store.get_name_claim(name).await? {
                None => None,
                Some((claim, version)) => {
                    if let Some(holder) = &claim.holder {
                        if holder == id {
                            return Ok(());
                        }
                        if !self.is_stale(name, holder, repair).await? {
                            return Err(KeysError::KeyNameInUse {
                                name: name.to_string(),
                                id: holder.to_string(),
                            });
                        }
                        debug!(name = %name, stale_holder = %holder, "Taking over stale name claim");
                    }
                    Some(version)
                }
            };

            if self.store.put_name_claim(name, &NameClaim::held_by(id.clone()), expected).await? {
                debug!(name = %name, id = %id, "Claimed key name");
                return Ok(());
            }
        }

        Err(KeysError::ConcurrentModification { id: id.to_string() })
    }

    /// A claim is stale once its holder record is gone. In repair mode a holder
    /// that no longer carries the name is stale too.
    async fn is_stale(&self, name: &str, holder: &KeyId, repair: bool) -> Result<bool> {
        Ok(match self.store.get(holder).await? {
            None => true,
            Some(record) => repair && record.name != name,
        })
    }
}

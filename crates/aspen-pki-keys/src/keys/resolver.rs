//! Key reference resolution.
//!
//! Turns a caller-supplied reference into a key id. Priority order:
//!
//! 1. empty reference: rejected before any state is read
//! 2. `default`: the default key pointer
//! 3. exact id match
//! 4. exact name match
//!
//! An id match always wins over a name that happens to equal another key's id.
//! Resolution never mutates state.

use std::sync::Arc;

use tracing::debug;

use crate::constants::DEFAULT_KEY_REF;
use crate::constants::MAX_KEY_REFERENCE_LENGTH;
use crate::error::KeysError;
use crate::error::Result;
use crate::keys::default_key::DefaultKeyPointer;
use crate::keys::name::NameIndex;
use crate::keys::store::KeyStore;
use crate::keys::types::KeyId;

/// A reference classified before any lookup happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReference<'a> {
    /// The `default` sentinel.
    Default,
    /// Anything else: tried as an id, then as a name.
    Literal(&'a str),
}

impl<'a> KeyReference<'a> {
    /// Classify a raw reference string.
    pub fn parse(reference: &'a str) -> Result<Self> {
        if reference.is_empty() {
            return Err(KeysError::MissingKeyReference);
        }
        if reference == DEFAULT_KEY_REF {
            return Ok(KeyReference::Default);
        }
        Ok(KeyReference::Literal(reference))
    }
}

/// Which rule produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Resolved through the default pointer.
    Default,
    /// The reference was the key's id.
    Id,
    /// The reference was the key's name.
    Name,
}

/// A successfully resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved key id.
    pub id: KeyId,
    /// How it was resolved.
    pub kind: ReferenceKind,
}

/// Resolves references against the record store and the default pointer.
pub struct KeyResolver {
    store: Arc<dyn KeyStore>,
    default_key: Arc<dyn DefaultKeyPointer>,
    names: NameIndex,
}

impl KeyResolver {
    /// Create a resolver over the given store and default pointer.
    pub fn new(store: Arc<dyn KeyStore>, default_key: Arc<dyn DefaultKeyPointer>) -> Self {
        Self {
            names: NameIndex::new(store.clone()),
            store,
            default_key,
        }
    }

    /// Resolve a reference to a key id.
    ///
    /// A set default pointer is returned as-is, even if its target has since
    /// disappeared; the subsequent fetch reports the missing key.
    pub async fn resolve(&self, reference: &str) -> Result<Resolution> {
        let not_found = || KeysError::KeyReferenceNotFound {
            reference: reference.to_string(),
        };

        let resolution = match KeyReference::parse(reference)? {
            KeyReference::Default => {
                let id = self.default_key.get().await?.ok_or_else(not_found)?;
                Resolution {
                    id,
                    kind: ReferenceKind::Default,
                }
            }
            KeyReference::Literal(literal) => {
                if literal.len() > MAX_KEY_REFERENCE_LENGTH {
                    return Err(not_found());
                }

                let candidate = KeyId::from_string(literal);
                if self.store.get(&candidate).await?.is_some() {
                    Resolution {
                        id: candidate,
                        kind: ReferenceKind::Id,
                    }
                } else {
                    let id = self.names.find(literal).await?.ok_or_else(not_found)?;
                    Resolution {
                        id,
                        kind: ReferenceKind::Name,
                    }
                }
            }
        };

        debug!(reference = %reference, id = %resolution.id, kind = ?resolution.kind, "Resolved key reference");
        Ok(resolution)
    }

    /// Resolve a reference and return just the id.
    pub async fn resolve_id(&self, reference: &str) -> Result<KeyId> {
        Ok(self.resolve(reference).await?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemorySecretsBackend;
    use crate::keys::default_key::InMemoryDefaultKey;
    use crate::keys::store::BackendKeyStore;
    use crate::keys::types::KeyMaterial;
    use crate::keys::types::KeyRecord;
    use crate::keys::types::PrivateKeyType;

    struct Fixture {
        store: Arc<BackendKeyStore>,
        default_key: Arc<InMemoryDefaultKey>,
        resolver: KeyResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(BackendKeyStore::new(Arc::new(InMemorySecretsBackend::new())));
        let default_key = Arc::new(InMemoryDefaultKey::new());
        let resolver = KeyResolver::new(store.clone(), default_key.clone());
        Fixture {
            store,
            default_key,
            resolver,
        }
    }

    fn record(id: &str, name: &str) -> KeyRecord {
        KeyRecord {
            id: KeyId::from_string(id),
            name: name.to_string(),
            key_type: PrivateKeyType::Ec,
            material: KeyMaterial::Stored(id.as_bytes().to_vec()),
        }
    }

    #[test]
    fn test_parse_classifies_references() {
        assert!(matches!(KeyReference::parse(""), Err(KeysError::MissingKeyReference)));
        assert_eq!(KeyReference::parse("default").unwrap(), KeyReference::Default);
        assert_eq!(KeyReference::parse("ca-root").unwrap(), KeyReference::Literal("ca-root"));
    }

    #[tokio::test]
    async fn test_empty_reference_is_rejected() {
        let f = fixture();
        f.store.put(&record("k1", "")).await.unwrap();
        assert!(matches!(f.resolver.resolve("").await, Err(KeysError::MissingKeyReference)));
    }

    #[tokio::test]
    async fn test_default_reference() {
        let f = fixture();
        f.store.put(&record("k1", "ca-root")).await.unwrap();

        let err = f.resolver.resolve("default").await.unwrap_err();
        assert!(err.is_not_found());

        f.default_key.set(KeyId::from_string("k1")).await.unwrap();
        let resolution = f.resolver.resolve("default").await.unwrap();
        assert_eq!(resolution.id.as_str(), "k1");
        assert_eq!(resolution.kind, ReferenceKind::Default);
    }

    #[tokio::test]
    async fn test_id_and_name_references() {
        let f = fixture();
        f.store.put(&record("k1", "ca-root")).await.unwrap();
        f.store.put(&record("k2", "")).await.unwrap();

        let by_name = f.resolver.resolve("ca-root").await.unwrap();
        assert_eq!((by_name.id.as_str(), by_name.kind), ("k1", ReferenceKind::Name));

        let by_id = f.resolver.resolve("k2").await.unwrap();
        assert_eq!((by_id.id.as_str(), by_id.kind), ("k2", ReferenceKind::Id));

        assert!(f.resolver.resolve("nothing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_id_match_beats_name_match() {
        let f = fixture();
        // k2's name collides with k1's id.
        f.store.put(&record("k1", "")).await.unwrap();
        f.store.put(&record("k2", "k1")).await.unwrap();

        let resolution = f.resolver.resolve("k1").await.unwrap();
        assert_eq!(resolution.id.as_str(), "k1");
        assert_eq!(resolution.kind, ReferenceKind::Id);
    }

    #[tokio::test]
    async fn test_oversized_reference_is_not_found() {
        let f = fixture();
        let reference = "x".repeat(MAX_KEY_REFERENCE_LENGTH + 1);
        assert!(f.resolver.resolve(&reference).await.unwrap_err().is_not_found());
    }
}

//! Integration tests for the PKI key lifecycle.

use std::sync::Arc;

use aspen_pki_keys::ImportKeyRequest;
use aspen_pki_keys::KeyId;
use aspen_pki_keys::KeyManager;
use aspen_pki_keys::KeyMaterial;
use aspen_pki_keys::KeysConfig;
use aspen_pki_keys::KeysError;
use aspen_pki_keys::KeysHandler;
use aspen_pki_keys::KeysRequest;
use aspen_pki_keys::KeysResponse;
use aspen_pki_keys::PrivateKeyType;
use aspen_pki_keys::SecretsBackend;
use aspen_pki_keys::StoredKeyManager;
use aspen_pki_keys::UpdateKeyRequest;
use aspen_pki_keys::backend::InMemorySecretsBackend;
use aspen_pki_keys::keys::BackendKeyStore;
use aspen_pki_keys::keys::KeyRecord;
use aspen_pki_keys::keys::KeyStore;
use aspen_pki_keys::keys::StoredDefaultKey;

/// Manager over a shared backend with two fixed keys:
/// `k1` named "ca-root" and `k2` unnamed.
async fn two_key_manager() -> (StoredKeyManager, Arc<dyn SecretsBackend>) {
    let backend: Arc<dyn SecretsBackend> = Arc::new(InMemorySecretsBackend::new());
    let store = Arc::new(BackendKeyStore::new(backend.clone()));

    for (id, name) in [("k1", "ca-root"), ("k2", "")] {
        store
            .put(&KeyRecord {
                id: KeyId::from_string(id),
                name: name.to_string(),
                key_type: PrivateKeyType::Rsa,
                material: KeyMaterial::Stored(format!("material-{id}").into_bytes()),
            })
            .await
            .unwrap();
    }

    let default_key = Arc::new(StoredDefaultKey::new(backend.clone()));
    (StoredKeyManager::new(store, default_key), backend)
}

#[tokio::test]
async fn test_default_key_deletion_scenario() {
    let (manager, _backend) = two_key_manager().await;
    manager.set_default_key("k1").await.unwrap();

    let resolver = manager.resolver();
    assert_eq!(resolver.resolve_id("default").await.unwrap().as_str(), "k1");
    assert_eq!(resolver.resolve_id("ca-root").await.unwrap().as_str(), "k1");
    assert_eq!(resolver.resolve_id("k2").await.unwrap().as_str(), "k2");

    let deleted = manager.delete_key("k1").await.unwrap();
    assert!(deleted.was_default);
    assert_eq!(deleted.warnings.len(), 1);
    assert!(deleted.warnings[0].contains("Deleted key k1 (via key_ref k1)"));
    assert!(deleted.warnings[0].contains("this was configured as the default key"));

    assert!(resolver.resolve("default").await.unwrap_err().is_not_found());
    assert!(resolver.resolve("ca-root").await.unwrap_err().is_not_found());
    assert_eq!(manager.read_default_key().await.unwrap(), None);

    let listed = manager.list_keys().await.unwrap();
    assert_eq!(listed.keys, vec![KeyId::from_string("k2")]);
    assert_eq!(listed.key_info[&KeyId::from_string("k2")].name, "");
}

#[tokio::test]
async fn test_rename_onto_held_name_changes_nothing() {
    let (manager, _backend) = two_key_manager().await;

    let err = manager.update_key(UpdateKeyRequest::new("k2", "ca-root")).await.unwrap_err();
    assert!(matches!(err, KeysError::KeyNameInUse { .. }));
    assert!(err.is_user_error());

    assert_eq!(manager.read_key("k1").await.unwrap().name, "ca-root");
    assert_eq!(manager.read_key("k2").await.unwrap().name, "");
    assert_eq!(manager.resolver().resolve_id("ca-root").await.unwrap().as_str(), "k1");
}

#[tokio::test]
async fn test_freed_name_can_be_reused() {
    let (manager, _backend) = two_key_manager().await;

    manager.delete_key("ca-root").await.unwrap();
    let renamed = manager.update_key(UpdateKeyRequest::new("k2", "ca-root")).await.unwrap();
    assert!(renamed.warnings.is_empty());
    assert_eq!(manager.resolver().resolve_id("ca-root").await.unwrap().as_str(), "k2");
}

#[tokio::test]
async fn test_rebuild_claims_names_of_existing_records() {
    let (manager, backend) = two_key_manager().await;
    let store = BackendKeyStore::new(backend);
    assert_eq!(store.get_name_claim("ca-root").await.unwrap(), None);

    assert_eq!(manager.rebuild_name_claims().await.unwrap(), 1);

    let (claim, _) = store.get_name_claim("ca-root").await.unwrap().unwrap();
    assert_eq!(claim.holder, Some(KeyId::from_string("k1")));
    assert_eq!(store.list_claimed_names().await.unwrap(), vec!["ca-root".to_string()]);

    let err = manager.update_key(UpdateKeyRequest::new("k2", "ca-root")).await.unwrap_err();
    assert!(matches!(err, KeysError::KeyNameInUse { ref id, .. } if id == "k1"));
}

#[tokio::test]
async fn test_default_survives_rename() {
    let (manager, _backend) = two_key_manager().await;
    manager.set_default_key("ca-root").await.unwrap();

    manager.update_key(UpdateKeyRequest::for_default("ca-root-2024")).await.unwrap();

    let key = manager.read_key("default").await.unwrap();
    assert_eq!(key.id.as_str(), "k1");
    assert_eq!(key.name, "ca-root-2024");
    assert!(manager.read_key("ca-root").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_then_read_reports_not_found() {
    let (manager, _backend) = two_key_manager().await;
    manager.delete_key("k2").await.unwrap();

    let err = manager.read_key("k2").await.unwrap_err();
    assert_eq!(err.to_string(), "unable to resolve key id for reference k2");
}

#[tokio::test]
async fn test_handler_over_shared_backend() {
    let (manager, backend) = two_key_manager().await;
    let handler = KeysHandler::new(Arc::new(manager));

    let response = handler
        .handle(KeysRequest::Import(
            ImportKeyRequest::managed(PrivateKeyType::Ed25519, "hsm-slot-3").with_name("hsm"),
        ))
        .await
        .unwrap();
    let KeysResponse::KeyResult(imported) = response else {
        panic!("expected KeyResult");
    };
    let key = imported.key.unwrap();
    assert_eq!(key.backing, "hsm-slot-3");

    // A second manager on the same storage sees the imported key.
    let other = StoredKeyManager::with_backend(backend);
    assert_eq!(other.read_key("hsm").await.unwrap().id, key.id);
    assert_eq!(other.list_keys().await.unwrap().keys.len(), 3);
}

#[cfg(feature = "redb")]
#[tokio::test]
async fn test_keys_persist_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = KeysConfig::default();
    config.storage.path = dir.path().join("pki-keys.redb");

    let id = {
        let manager = StoredKeyManager::with_backend(config.open_backend().unwrap());
        let imported = manager
            .import_key(ImportKeyRequest::stored(PrivateKeyType::Ec, b"ec-material".to_vec()).with_name("issuing"))
            .await
            .unwrap();
        manager.set_default_key("issuing").await.unwrap();
        imported.key.id
    };

    let manager = StoredKeyManager::with_backend(config.open_backend().unwrap());
    assert_eq!(manager.read_default_key().await.unwrap(), Some(id.clone()));
    let key = manager.read_key("default").await.unwrap();
    assert_eq!(key.id, id);
    assert_eq!(key.name, "issuing");
    assert_eq!(key.key_type, PrivateKeyType::Ec);
}

#[cfg(feature = "redb")]
#[tokio::test]
async fn test_mounts_are_isolated() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = KeysConfig::default();
    config.storage.path = dir.path().join("pki-keys.redb");

    let root = StoredKeyManager::with_backend(config.open_backend().unwrap());
    root.import_key(ImportKeyRequest::stored(PrivateKeyType::Rsa, b"root".to_vec()).with_name("ca"))
        .await
        .unwrap();
    drop(root);

    let intermediate = StoredKeyManager::with_backend(config.clone().with_mount("pki_int").open_backend().unwrap());
    assert!(intermediate.list_keys().await.unwrap().keys.is_empty());
    assert!(intermediate.read_key("ca").await.unwrap_err().is_not_found());
}

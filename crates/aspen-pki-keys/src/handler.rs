//! Request handler for PKI key operations.
//!
//! Maps [`KeysRequest`]s onto a [`KeyManager`] and shapes the results for the
//! routing layer. Caller mistakes (bad reference, bad name, unknown key) come
//! back as unsuccessful responses with a readable message. Storage and
//! internal faults are returned as `Err` so the surrounding layer can log and
//! report them as operational failures.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::constants::DEFAULT_KEY_REF;
use crate::error::KeysError;
use crate::keys::ImportKeyRequest;
use crate::keys::KeyEntry;
use crate::keys::KeyId;
use crate::keys::KeyInfo;
use crate::keys::KeyManager;
use crate::keys::UpdateKeyRequest;

/// A key management request.
#[derive(Debug, Clone)]
pub enum KeysRequest {
    /// List all keys.
    List,
    /// Read one key. `None` reads the default key.
    Read {
        /// Key reference.
        reference: Option<String>,
    },
    /// Rename a key.
    Update {
        /// Key reference. `None` targets the default key.
        reference: Option<String>,
        /// New name; empty removes the name.
        name: String,
    },
    /// Delete a key. `None` deletes the default key.
    Delete {
        /// Key reference.
        reference: Option<String>,
    },
    /// Register externally generated key material.
    Import(ImportKeyRequest),
    /// Point the default at a key.
    ///
    /// The reference has no `default` fallback: resolving it to the current
    /// default would only point the pointer at itself.
    SetDefault {
        /// Key reference.
        reference: String,
    },
    /// Read the default key pointer.
    ReadDefault,
}

impl KeysRequest {
    /// Operation name, for logging.
    pub fn operation(&self) -> &'static str {
        match self {
            KeysRequest::List => "list",
            KeysRequest::Read { .. } => "read",
            KeysRequest::Update { .. } => "update",
            KeysRequest::Delete { .. } => "delete",
            KeysRequest::Import(_) => "import",
            KeysRequest::SetDefault { .. } => "set-default",
            KeysRequest::ReadDefault => "read-default",
        }
    }
}

/// Result of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysListResultResponse {
    /// Whether the request succeeded.
    pub is_success: bool,
    /// Key ids.
    pub keys: Vec<KeyId>,
    /// Name of each listed key.
    pub key_info: BTreeMap<KeyId, KeyInfo>,
    /// Error message if unsuccessful.
    pub error: Option<String>,
}

/// Result of a request returning a single key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysKeyResultResponse {
    /// Whether the request succeeded.
    pub is_success: bool,
    /// The key, on success.
    pub key: Option<KeyEntry>,
    /// Whether an import matched already registered material.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub existing: bool,
    /// Warnings for the caller.
    pub warnings: Vec<String>,
    /// Error message if unsuccessful.
    pub error: Option<String>,
}

/// Result of a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysDeleteResultResponse {
    /// Whether the request succeeded.
    pub is_success: bool,
    /// Id of the deleted key.
    pub id: Option<KeyId>,
    /// Warnings for the caller.
    pub warnings: Vec<String>,
    /// Error message if unsuccessful.
    pub error: Option<String>,
}

/// Result of a default pointer request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysDefaultResultResponse {
    /// Whether the request succeeded.
    pub is_success: bool,
    /// Current default key id.
    pub default: Option<KeyId>,
    /// Error message if unsuccessful.
    pub error: Option<String>,
}

/// A key management response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeysResponse {
    /// Answer to [`KeysRequest::List`].
    ListResult(KeysListResultResponse),
    /// Answer to read, update, and import.
    KeyResult(KeysKeyResultResponse),
    /// Answer to [`KeysRequest::Delete`].
    DeleteResult(KeysDeleteResultResponse),
    /// Answer to set-default and read-default.
    DefaultResult(KeysDefaultResultResponse),
}

impl KeysResponse {
    /// Whether the request succeeded.
    pub fn is_success(&self) -> bool {
        match self {
            KeysResponse::ListResult(r) => r.is_success,
            KeysResponse::KeyResult(r) => r.is_success,
            KeysResponse::DeleteResult(r) => r.is_success,
            KeysResponse::DefaultResult(r) => r.is_success,
        }
    }

    /// Caller-facing error message, if the request failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            KeysResponse::ListResult(r) => r.error.as_deref(),
            KeysResponse::KeyResult(r) => r.error.as_deref(),
            KeysResponse::DeleteResult(r) => r.error.as_deref(),
            KeysResponse::DefaultResult(r) => r.error.as_deref(),
        }
    }

    /// Warnings attached to a successful response.
    pub fn warnings(&self) -> &[String] {
        match self {
            KeysResponse::KeyResult(r) => &r.warnings,
            KeysResponse::DeleteResult(r) => &r.warnings,
            KeysResponse::ListResult(_) | KeysResponse::DefaultResult(_) => &[],
        }
    }
}

/// Sanitize key errors for client display.
///
/// Only user errors reach this function; anything else gets a generic message.
pub(crate) fn sanitize_keys_error(error: &KeysError) -> String {
    match error {
        KeysError::MissingKeyReference => "missing key reference".to_string(),
        KeysError::KeyReferenceNotFound { reference } => {
            format!("unable to resolve key id for reference {reference}")
        }
        KeysError::KeyNotFound { id } => format!("key not found: {id}"),
        KeysError::InvalidKeyName { name, reason } => format!("invalid key name '{name}': {reason}"),
        KeysError::KeyNameInUse { name, id } => format!("key name '{name}' is already in use by key {id}"),
        KeysError::KeyMaterialTooLarge { size, max } => {
            format!("key material too large: {size} bytes (max: {max})")
        }
        KeysError::ConcurrentModification { id } => {
            format!("key {id} was modified concurrently, retry the operation")
        }
        _ => "Internal key management error".to_string(),
    }
}

/// Split a manager result into a payload, a user error message, or a fault.
fn triage<T>(operation: &str, result: Result<T, KeysError>) -> anyhow::Result<Result<T, String>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_user_error() => {
            debug!(operation = operation, error = %e, "PKI key request rejected");
            Ok(Err(sanitize_keys_error(&e)))
        }
        Err(e) => {
            warn!(operation = operation, error = %e, "PKI key request failed");
            Err(anyhow::Error::new(e).context(format!("PKI key {operation} failed")))
        }
    }
}

/// Handler for PKI key requests.
pub struct KeysHandler {
    manager: Arc<dyn KeyManager>,
}

impl KeysHandler {
    /// Create a handler over the given key manager.
    pub fn new(manager: Arc<dyn KeyManager>) -> Self {
        Self { manager }
    }

    /// Handle a single request.
    pub async fn handle(&self, request: KeysRequest) -> anyhow::Result<KeysResponse> {
        let operation = request.operation();
        debug!(operation = operation, "PKI key request");

        match request {
            KeysRequest::List => self.handle_list().await,
            KeysRequest::Read { reference } => {
                let reference = reference.unwrap_or_else(|| DEFAULT_KEY_REF.to_string());
                let result = triage(operation, self.manager.read_key(&reference).await)?;
                Ok(key_result(result.map(|key| (key, Vec::new(), false))))
            }
            KeysRequest::Update { reference, name } => {
                let reference = reference.unwrap_or_else(|| DEFAULT_KEY_REF.to_string());
                let result = triage(operation, self.manager.update_key(UpdateKeyRequest::new(reference, name)).await)?;
                Ok(key_result(result.map(|r| (r.key, r.warnings, false))))
            }
            KeysRequest::Delete { reference } => {
                let reference = reference.unwrap_or_else(|| DEFAULT_KEY_REF.to_string());
                let result = triage(operation, self.manager.delete_key(&reference).await)?;
                Ok(KeysResponse::DeleteResult(match result {
                    Ok(r) => KeysDeleteResultResponse {
                        is_success: true,
                        id: Some(r.id),
                        warnings: r.warnings,
                        error: None,
                    },
                    Err(error) => KeysDeleteResultResponse {
                        error: Some(error),
                        ..Default::default()
                    },
                }))
            }
            KeysRequest::Import(import) => {
                let result = triage(operation, self.manager.import_key(import).await)?;
                Ok(key_result(result.map(|r| (r.key, r.warnings, r.existing))))
            }
            KeysRequest::SetDefault { reference } => {
                let result = triage(operation, self.manager.set_default_key(&reference).await)?;
                Ok(default_result(result.map(Some)))
            }
            KeysRequest::ReadDefault => {
                let result = triage(operation, self.manager.read_default_key().await)?;
                Ok(default_result(result))
            }
        }
    }

    async fn handle_list(&self) -> anyhow::Result<KeysResponse> {
        let result = triage("list", self.manager.list_keys().await)?;
        Ok(KeysResponse::ListResult(match result {
            Ok(listed) => KeysListResultResponse {
                is_success: true,
                keys: listed.keys,
                key_info: listed.key_info,
                error: None,
            },
            Err(error) => KeysListResultResponse {
                error: Some(error),
                ..Default::default()
            },
        }))
    }
}

fn key_result(result: Result<(KeyEntry, Vec<String>, bool), String>) -> KeysResponse {
    KeysResponse::KeyResult(match result {
        Ok((key, warnings, existing)) => KeysKeyResultResponse {
            is_success: true,
            key: Some(key),
            existing,
            warnings,
            error: None,
        },
        Err(error) => KeysKeyResultResponse {
            error: Some(error),
            ..Default::default()
        },
    })
}

fn default_result(result: Result<Option<KeyId>, String>) -> KeysResponse {
    KeysResponse::DefaultResult(match result {
        Ok(default) => KeysDefaultResultResponse {
            is_success: true,
            default,
            error: None,
        },
        Err(error) => KeysDefaultResultResponse {
            error: Some(error),
            ..Default::default()
        },
    })
}

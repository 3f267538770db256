//! Error types for PKI key management.

use snafu::Snafu;

/// Result alias for key management operations.
pub type Result<T, E = KeysError> = std::result::Result<T, E>;

/// Errors from key storage, resolution, and lifecycle operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum KeysError {
    /// The caller supplied an empty key reference.
    #[snafu(display("missing key reference"))]
    MissingKeyReference,

    /// The reference matched neither the default pointer, an id, nor a name.
    #[snafu(display("unable to resolve key id for reference {reference}"))]
    KeyReferenceNotFound {
        /// The unresolved reference.
        reference: String,
    },

    /// A resolved key id has no record in storage.
    #[snafu(display("key not found: {id}"))]
    KeyNotFound {
        /// The missing key id.
        id: String,
    },

    /// A proposed key name failed validation.
    #[snafu(display("invalid key name '{name}': {reason}"))]
    InvalidKeyName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// A proposed key name is already held by another key.
    #[snafu(display("key name '{name}' is already in use by key {id}"))]
    KeyNameInUse {
        /// The contested name.
        name: String,
        /// Id of the key currently holding the name.
        id: String,
    },

    /// Key material exceeds the size limit.
    #[snafu(display("key material too large: {size} bytes (max: {max})"))]
    KeyMaterialTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// The record changed between resolution and write.
    #[snafu(display("key {id} was modified concurrently, retry the operation"))]
    ConcurrentModification {
        /// Id of the contested key.
        id: String,
    },

    /// Underlying storage failure.
    #[snafu(display("storage error: {reason}"))]
    Storage {
        /// Description of the failure.
        reason: String,
    },

    /// Failed to encode a value for storage.
    #[snafu(display("serialization error: {reason}"))]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// Invalid configuration.
    #[snafu(display("invalid configuration: {reason}"))]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// Internal error, usually corrupted storage.
    #[snafu(display("internal error: {reason}"))]
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

impl KeysError {
    /// Whether this error is caused by the caller's input or by a missing key.
    ///
    /// User errors abort the operation without mutating state and are reported
    /// back to the caller. Everything else is an operational fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            KeysError::MissingKeyReference
                | KeysError::KeyReferenceNotFound { .. }
                | KeysError::KeyNotFound { .. }
                | KeysError::InvalidKeyName { .. }
                | KeysError::KeyNameInUse { .. }
                | KeysError::KeyMaterialTooLarge { .. }
                | KeysError::ConcurrentModification { .. }
        )
    }

    /// Whether this error means the referenced key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeysError::KeyReferenceNotFound { .. } | KeysError::KeyNotFound { .. })
    }
}

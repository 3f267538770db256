//! Constants for PKI key management.
//!
//! Tiger Style: fixed limits and storage layout are declared in one place so
//! every component agrees on them.

/// Reserved reference that resolves through the default key pointer.
pub const DEFAULT_KEY_REF: &str = "default";

/// Storage prefix for key records. Records live at `config/key/<id>`.
pub const KEY_RECORD_PREFIX: &str = "config/key/";

/// Storage prefix for name claims. A claim lives at `config/name/<name>`.
pub const NAME_CLAIM_PREFIX: &str = "config/name/";

/// Storage path of the keys configuration entry holding the default pointer.
pub const KEYS_CONFIG_PATH: &str = "config/keys";

/// Maximum length of a key name in bytes.
pub const MAX_KEY_NAME_LENGTH: usize = 128;

/// Maximum length of a key reference in bytes.
///
/// References longer than any valid id or name can never resolve.
pub const MAX_KEY_REFERENCE_LENGTH: usize = 256;

/// Maximum size of stored key material in bytes (64 KB).
pub const MAX_KEY_MATERIAL_SIZE: usize = 64 * 1024;

/// Maximum attempts of a check-and-set loop before giving up.
pub const MAX_CAS_ATTEMPTS: usize = 8;

/// Default mount point for the PKI engine.
pub const DEFAULT_PKI_MOUNT: &str = "pki";

/// Default location of the redb database file.
pub const DEFAULT_STORAGE_PATH: &str = "./data/pki-keys.redb";

//! Error types for the key manager.

use crate::types::KeyId;

/// Errors raised by key storage and the cryptographic primitives.
#[derive(Debug, thiserror::Error)]
pub enum KeyManagerError {
    /// No key with this id exists in the backing store.
    #[error("key not found: {0}")]
    KeyNotFound(KeyId),

    /// A key with this id already exists and would be overwritten.
    #[error("duplicate key: {0}")]
    DuplicateKey(KeyId),

    /// The stored record is not of the kind the operation needs.
    #[error("key {id} is not a {expected}")]
    WrongKeyKind { id: KeyId, expected: &'static str },

    /// Key bytes could not be decoded or have the wrong length.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Encryption primitive failed.
    #[error("encrypt failed")]
    Encrypt,

    /// Decryption primitive failed (wrong key, tampered or malformed input).
    #[error("decrypt failed")]
    Decrypt,

    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The OS random source failed.
    #[error("random source unavailable")]
    Rng,
}

pub type Result<T> = std::result::Result<T, KeyManagerError>;

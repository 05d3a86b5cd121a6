//! Core types: KeyId, KeyKind, KeyState, KeyRecord.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{KeyManagerError, Result};

// ---------------------------------------------------------------------------
// Key identifiers
// ---------------------------------------------------------------------------

/// Unique key identifier (hex-encoded random bytes unless supplied).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Create a new random KeyId.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Create from a specific string (ids arriving from the service or tests).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Key classification
// ---------------------------------------------------------------------------

/// What a stored record holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// 256-bit AES key used for sealing attributes and drafts.
    Symmetric,
    /// X25519 key pair; the public half is published for E2EE.
    KeyPair,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Symmetric => write!(f, "SYMMETRIC"),
            KeyKind::KeyPair => write!(f, "KEY_PAIR"),
        }
    }
}

/// Lifecycle of a stored key.
///
/// ```text
/// ACTIVE ──(made current)──→ CURRENT ──(rotate)──→ SUPERSEDED
/// ```
///
/// Superseded keys never encrypt new data but always decrypt old data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    /// Usable, but not the key new seal operations pick.
    Active,
    /// The key new seal / new E2EE identity operations use.
    Current,
    /// Replaced by a newer current key. Decrypt only.
    Superseded,
}

impl KeyState {
    pub fn can_encrypt(&self) -> bool {
        !matches!(self, KeyState::Superseded)
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Active => write!(f, "ACTIVE"),
            KeyState::Current => write!(f, "CURRENT"),
            KeyState::Superseded => write!(f, "SUPERSEDED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Key record
// ---------------------------------------------------------------------------

/// A persisted key. Secret material is base64 in `material`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: KeyId,
    pub kind: KeyKind,
    pub state: KeyState,
    /// Symmetric key bytes, or the X25519 private scalar for key pairs.
    pub material: String,
    /// X25519 public key for key pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyRecord {
    pub fn new_symmetric(id: KeyId, key: &[u8]) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: KeyKind::Symmetric,
            state: KeyState::Active,
            material: B64.encode(key),
            public_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_key_pair(id: KeyId, private_key: &[u8], public_key: &[u8]) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: KeyKind::KeyPair,
            state: KeyState::Active,
            material: B64.encode(private_key),
            public_key: Some(B64.encode(public_key)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Decode the secret material into a fixed 32-byte buffer.
    pub fn secret_bytes(&self) -> Result<Zeroizing<[u8; 32]>> {
        let raw = Zeroizing::new(
            B64.decode(&self.material)
                .map_err(|e| KeyManagerError::InvalidKeyMaterial(format!("{}: {}", self.id, e)))?,
        );
        let mut out = Zeroizing::new([0u8; 32]);
        if raw.len() != out.len() {
            return Err(KeyManagerError::InvalidKeyMaterial(format!(
                "{}: expected 32 bytes, got {}",
                self.id,
                raw.len()
            )));
        }
        out.copy_from_slice(&raw);
        Ok(out)
    }

    pub fn public_key_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.public_key
            .as_deref()
            .map(|pk| {
                B64.decode(pk)
                    .map_err(|e| KeyManagerError::InvalidKeyMaterial(format!("{}: {}", self.id, e)))
            })
            .transpose()
    }

    pub(crate) fn expect_kind(&self, kind: KeyKind) -> Result<()> {
        if self.kind != kind {
            return Err(KeyManagerError::WrongKeyKind {
                id: self.id.clone(),
                expected: match kind {
                    KeyKind::Symmetric => "symmetric key",
                    KeyKind::KeyPair => "key pair",
                },
            });
        }
        Ok(())
    }
}

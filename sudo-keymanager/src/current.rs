//! Current-key tracking.
//!
//! New seal operations always use the current symmetric key. Rotation makes a
//! fresh key current; superseded keys stay in storage so previously sealed
//! values keep unsealing.

use crate::error::Result;
use crate::manager::KeyManager;
use crate::types::{KeyId, KeyKind};

use parking_lot::RwLock;
use std::sync::Arc;

/// Accessor/rotator for the account's current symmetric key.
pub trait SymmetricKeyProvider: Send + Sync {
    /// The current key id, if one has been established.
    fn current_key_id(&self) -> Result<Option<KeyId>>;

    /// Generate a new key and make it current. Returns the new id.
    fn rotate(&self) -> Result<KeyId>;

    /// The current key id, generating one on first use.
    fn current_or_generate(&self) -> Result<KeyId> {
        match self.current_key_id()? {
            Some(id) => Ok(id),
            None => self.rotate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Symmetric keys
// ---------------------------------------------------------------------------

/// [`SymmetricKeyProvider`] backed by a [`KeyManager`].
///
/// The id is cached behind a lock; readers observe either the pre- or the
/// post-rotation id, never a partial write.
pub struct KeyManagerSymmetricKeys {
    keys: Arc<dyn KeyManager>,
    current: RwLock<Option<KeyId>>,
}

impl KeyManagerSymmetricKeys {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self {
            keys,
            current: RwLock::new(None),
        }
    }
}

impl SymmetricKeyProvider for KeyManagerSymmetricKeys {
    fn current_key_id(&self) -> Result<Option<KeyId>> {
        if let Some(id) = self.current.read().clone() {
            return Ok(Some(id));
        }
        let stored = self.keys.current_key_id(KeyKind::Symmetric)?;
        if let Some(id) = &stored {
            *self.current.write() = Some(id.clone());
        }
        Ok(stored)
    }

    fn rotate(&self) -> Result<KeyId> {
        let mut current = self.current.write();
        let id = KeyId::generate();
        self.keys.generate_symmetric_key(&id)?;
        self.keys.make_current(KeyKind::Symmetric, &id)?;
        tracing::info!(key_id = %id, previous = ?current.as_ref().map(|k| k.as_str()), "rotated current symmetric key");
        *current = Some(id.clone());
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Key pairs
// ---------------------------------------------------------------------------

/// The local end-to-end identity: which key pair new addresses publish, and
/// every key pair eligible for decrypting inbound secure packages.
pub struct KeyManagerKeyPairs {
    keys: Arc<dyn KeyManager>,
}

impl KeyManagerKeyPairs {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self { keys }
    }

    pub fn current_key_pair_id(&self) -> Result<Option<KeyId>> {
        self.keys.current_key_id(KeyKind::KeyPair)
    }

    pub fn current_or_generate(&self) -> Result<KeyId> {
        if let Some(id) = self.current_key_pair_id()? {
            return Ok(id);
        }
        let id = KeyId::generate();
        self.keys.generate_key_pair(&id)?;
        self.keys.make_current(KeyKind::KeyPair, &id)?;
        tracing::info!(key_id = %id, "generated key pair");
        Ok(id)
    }

    pub fn all_key_pair_ids(&self) -> Result<Vec<KeyId>> {
        self.keys.key_ids(KeyKind::KeyPair)
    }
}

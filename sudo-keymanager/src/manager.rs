//! Key manager: the key operations the email client consumes.
//!
//! Keys are addressed by opaque string ids. Symmetric keys seal attributes and
//! drafts; key pairs form the local end-to-end identity whose public halves
//! are published to the directory.

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::cipher::{self, IV_BYTES, SYMMETRIC_KEY_BYTES};
use crate::error::{KeyManagerError, Result};
use crate::storage::KeyStorage;
use crate::types::{KeyId, KeyKind, KeyRecord, KeyState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Version tag written into every [`KeyArchive`].
pub const ARCHIVE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Key generation, storage and the primitives built on stored keys.
///
/// Synchronous: all operations are CPU-bound or touch local storage only.
pub trait KeyManager: Send + Sync {
    // === Symmetric keys ===
    fn generate_symmetric_key(&self, id: &KeyId) -> Result<()>;
    fn symmetric_key_exists(&self, id: &KeyId) -> Result<bool>;
    fn delete_symmetric_key(&self, id: &KeyId) -> Result<()>;
    fn encrypt_with_symmetric_key(&self, id: &KeyId, iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt_with_symmetric_key(&self, id: &KeyId, iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>>;

    // === One-time keys (never stored) ===
    fn generate_raw_symmetric_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_BYTES]>>;
    fn encrypt_with_raw_symmetric_key(&self, key: &[u8], iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt_with_raw_symmetric_key(&self, key: &[u8], iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>>;

    // === Key pairs ===
    fn generate_key_pair(&self, id: &KeyId) -> Result<()>;
    fn key_pair_exists(&self, id: &KeyId) -> Result<bool>;
    fn delete_key_pair(&self, id: &KeyId) -> Result<()>;
    fn public_key(&self, id: &KeyId) -> Result<Option<Vec<u8>>>;
    fn encrypt_with_public_key(&self, public_key: &[u8], data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt_with_private_key(&self, id: &KeyId, data: &[u8]) -> Result<Vec<u8>>;

    // === Current-key bookkeeping ===
    /// The key of `kind` in [`KeyState::Current`], if any.
    fn current_key_id(&self, kind: KeyKind) -> Result<Option<KeyId>>;
    /// Make `id` current; the previous current key of the same kind becomes superseded.
    fn make_current(&self, kind: KeyKind, id: &KeyId) -> Result<()>;
    /// All key ids of `kind`, oldest first.
    fn key_ids(&self, kind: KeyKind) -> Result<Vec<KeyId>>;

    // === Misc ===
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>>;
    fn export_keys(&self) -> Result<KeyArchive>;
    fn import_keys(&self, archive: &KeyArchive) -> Result<usize>;
    fn remove_all_keys(&self) -> Result<()>;
}

/// Portable backup of every stored key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyArchive {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub keys: Vec<KeyRecord>,
}

// ---------------------------------------------------------------------------
// Default implementation
// ---------------------------------------------------------------------------

pub struct DefaultKeyManager {
    storage: Arc<dyn KeyStorage>,
    audit: Arc<dyn AuditSink>,
}

impl DefaultKeyManager {
    pub fn new(storage: Arc<dyn KeyStorage>, audit: Arc<dyn AuditSink>) -> Self {
        Self { storage, audit }
    }

    fn load(&self, id: &KeyId, kind: KeyKind) -> Result<KeyRecord> {
        let record = self
            .storage
            .get(id)?
            .ok_or_else(|| KeyManagerError::KeyNotFound(id.clone()))?;
        record.expect_kind(kind)?;
        Ok(record)
    }

    fn exists(&self, id: &KeyId, kind: KeyKind) -> Result<bool> {
        Ok(self.storage.get(id)?.map(|r| r.kind == kind).unwrap_or(false))
    }

    fn insert(&self, record: KeyRecord) -> Result<()> {
        if self.storage.get(&record.id)?.is_some() {
            return Err(KeyManagerError::DuplicateKey(record.id));
        }
        self.storage.put(&record)?;
        self.audit
            .record(AuditEvent::key_event(&record.id, record.kind, AuditAction::KeyGenerated));
        Ok(())
    }

    fn remove(&self, id: &KeyId, kind: KeyKind) -> Result<()> {
        // Deleting an absent key is not an error.
        if let Some(record) = self.storage.get(id)? {
            record.expect_kind(kind)?;
            self.storage.delete(id)?;
            self.audit.record(AuditEvent::key_event(id, kind, AuditAction::KeyDeleted));
        }
        Ok(())
    }

    fn audited<T>(&self, id: &KeyId, kind: KeyKind, action: AuditAction, result: Result<T>) -> Result<T> {
        // Successful symmetric operations are too frequent to audit.
        if let Err(e) = &result {
            self.audit.record(
                AuditEvent::key_event(id, kind, action)
                    .with_failure()
                    .with_detail(e.to_string()),
            );
        }
        result
    }
}

impl KeyManager for DefaultKeyManager {
    fn generate_symmetric_key(&self, id: &KeyId) -> Result<()> {
        let key = cipher::symmetric_key()?;
        self.insert(KeyRecord::new_symmetric(id.clone(), &key[..]))
    }

    fn symmetric_key_exists(&self, id: &KeyId) -> Result<bool> {
        self.exists(id, KeyKind::Symmetric)
    }

    fn delete_symmetric_key(&self, id: &KeyId) -> Result<()> {
        self.remove(id, KeyKind::Symmetric)
    }

    fn encrypt_with_symmetric_key(&self, id: &KeyId, iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .load(id, KeyKind::Symmetric)
            .and_then(|r| r.secret_bytes())
            .and_then(|key| cipher::aead_seal(&key[..], iv, data, &[]));
        self.audited(id, KeyKind::Symmetric, AuditAction::Encrypt, result)
    }

    fn decrypt_with_symmetric_key(&self, id: &KeyId, iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .load(id, KeyKind::Symmetric)
            .and_then(|r| r.secret_bytes())
            .and_then(|key| cipher::aead_open(&key[..], iv, data, &[]));
        self.audited(id, KeyKind::Symmetric, AuditAction::Decrypt, result)
    }

    fn generate_raw_symmetric_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_BYTES]>> {
        cipher::symmetric_key()
    }

    fn encrypt_with_raw_symmetric_key(&self, key: &[u8], iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>> {
        cipher::aead_seal(key, iv, data, &[])
    }

    fn decrypt_with_raw_symmetric_key(&self, key: &[u8], iv: &[u8; IV_BYTES], data: &[u8]) -> Result<Vec<u8>> {
        cipher::aead_open(key, iv, data, &[])
    }

    fn generate_key_pair(&self, id: &KeyId) -> Result<()> {
        let (sk, pk) = cipher::key_pair();
        self.insert(KeyRecord::new_key_pair(id.clone(), &sk[..], &pk))
    }

    fn key_pair_exists(&self, id: &KeyId) -> Result<bool> {
        self.exists(id, KeyKind::KeyPair)
    }

    fn delete_key_pair(&self, id: &KeyId) -> Result<()> {
        self.remove(id, KeyKind::KeyPair)
    }

    fn public_key(&self, id: &KeyId) -> Result<Option<Vec<u8>>> {
        match self.storage.get(id)? {
            Some(record) => {
                record.expect_kind(KeyKind::KeyPair)?;
                record.public_key_bytes()
            }
            None => Ok(None),
        }
    }

    fn encrypt_with_public_key(&self, public_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        cipher::wrap(public_key, data)
    }

    fn decrypt_with_private_key(&self, id: &KeyId, data: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .load(id, KeyKind::KeyPair)
            .and_then(|r| r.secret_bytes())
            .and_then(|sk| cipher::unwrap(&sk, data));
        self.audited(id, KeyKind::KeyPair, AuditAction::Unwrap, result)
    }

    fn current_key_id(&self, kind: KeyKind) -> Result<Option<KeyId>> {
        Ok(self
            .storage
            .list_by_kind(kind)?
            .into_iter()
            .rev()
            .find(|r| r.state == KeyState::Current)
            .map(|r| r.id))
    }

    fn make_current(&self, kind: KeyKind, id: &KeyId) -> Result<()> {
        let mut target = self.load(id, kind)?;
        let now = Utc::now();
        for mut record in self.storage.list_by_kind(kind)? {
            if record.state == KeyState::Current && record.id != *id {
                record.state = KeyState::Superseded;
                record.updated_at = now;
                self.storage.put(&record)?;
            }
        }
        target.state = KeyState::Current;
        target.updated_at = now;
        self.storage.put(&target)?;
        self.audit.record(AuditEvent::key_event(id, kind, AuditAction::KeyMadeCurrent));
        Ok(())
    }

    fn key_ids(&self, kind: KeyKind) -> Result<Vec<KeyId>> {
        Ok(self.storage.list_by_kind(kind)?.into_iter().map(|r| r.id).collect())
    }

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        cipher::random_bytes(len)
    }

    fn export_keys(&self) -> Result<KeyArchive> {
        let keys = self.storage.list()?;
        self.audit
            .record(AuditEvent::store_event(AuditAction::KeysExported { count: keys.len() }));
        Ok(KeyArchive {
            version: ARCHIVE_VERSION,
            exported_at: Utc::now(),
            keys,
        })
    }

    /// Import every key from `archive`. Keys whose id is already present are
    /// skipped; returns the number imported.
    fn import_keys(&self, archive: &KeyArchive) -> Result<usize> {
        if archive.version != ARCHIVE_VERSION {
            return Err(KeyManagerError::InvalidKeyMaterial(format!(
                "unsupported archive version {}",
                archive.version
            )));
        }
        // Validate everything before writing anything.
        for record in &archive.keys {
            record.secret_bytes()?;
        }
        let mut imported = 0;
        for record in &archive.keys {
            if self.storage.get(&record.id)?.is_some() {
                continue;
            }
            self.storage.put(record)?;
            self.audit
                .record(AuditEvent::key_event(&record.id, record.kind, AuditAction::KeyImported));
            imported += 1;
        }
        Ok(imported)
    }

    fn remove_all_keys(&self) -> Result<()> {
        self.storage.clear()?;
        self.audit.record(AuditEvent::store_event(AuditAction::KeysCleared));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::storage::InMemoryKeyStorage;

    fn manager() -> (DefaultKeyManager, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::new());
        let km = DefaultKeyManager::new(Arc::new(InMemoryKeyStorage::new()), audit.clone());
        (km, audit)
    }

    #[test]
    fn symmetric_roundtrip_by_id() {
        let (km, _) = manager();
        let id = KeyId::new("sym-1");
        km.generate_symmetric_key(&id).unwrap();
        assert!(km.symmetric_key_exists(&id).unwrap());
        assert!(!km.key_pair_exists(&id).unwrap());

        let iv = cipher::iv().unwrap();
        let ct = km.encrypt_with_symmetric_key(&id, &iv, b"folder name").unwrap();
        assert_eq!(km.decrypt_with_symmetric_key(&id, &iv, &ct).unwrap(), b"folder name");
    }

    #[test]
    fn duplicate_generate_rejected() {
        let (km, _) = manager();
        let id = KeyId::new("dup");
        km.generate_symmetric_key(&id).unwrap();
        assert!(matches!(
            km.generate_symmetric_key(&id),
            Err(KeyManagerError::DuplicateKey(_))
        ));
    }

    #[test]
    fn missing_key_is_audited_failure() {
        let (km, audit) = manager();
        let iv = [0u8; IV_BYTES];
        let err = km
            .decrypt_with_symmetric_key(&KeyId::new("missing"), &iv, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(err, KeyManagerError::KeyNotFound(_)));
        assert_eq!(audit.failures().len(), 1);
    }

    #[test]
    fn wrong_kind_rejected() {
        let (km, _) = manager();
        let id = KeyId::new("pair");
        km.generate_key_pair(&id).unwrap();
        let iv = [0u8; IV_BYTES];
        assert!(matches!(
            km.encrypt_with_symmetric_key(&id, &iv, b"x"),
            Err(KeyManagerError::WrongKeyKind { .. })
        ));
    }

    #[test]
    fn public_key_wrap_roundtrip() {
        let (km, _) = manager();
        let id = KeyId::new("identity");
        km.generate_key_pair(&id).unwrap();
        let pk = km.public_key(&id).unwrap().unwrap();
        assert_eq!(pk.len(), 32);

        let message_key = km.generate_raw_symmetric_key().unwrap();
        let wrapped = km.encrypt_with_public_key(&pk, &message_key[..]).unwrap();
        let unwrapped = km.decrypt_with_private_key(&id, &wrapped).unwrap();
        assert_eq!(unwrapped, &message_key[..]);
        assert!(km.public_key(&KeyId::new("nobody")).unwrap().is_none());
    }

    #[test]
    fn make_current_supersedes_previous() {
        let (km, _) = manager();
        let a = KeyId::new("a");
        let b = KeyId::new("b");
        km.generate_symmetric_key(&a).unwrap();
        km.generate_symmetric_key(&b).unwrap();
        assert!(km.current_key_id(KeyKind::Symmetric).unwrap().is_none());

        km.make_current(KeyKind::Symmetric, &a).unwrap();
        assert_eq!(km.current_key_id(KeyKind::Symmetric).unwrap(), Some(a.clone()));
        km.make_current(KeyKind::Symmetric, &b).unwrap();
        assert_eq!(km.current_key_id(KeyKind::Symmetric).unwrap(), Some(b));

        // superseded key still decrypts
        let iv = cipher::iv().unwrap();
        let ct = km.encrypt_with_symmetric_key(&a, &iv, b"old").unwrap();
        assert_eq!(km.decrypt_with_symmetric_key(&a, &iv, &ct).unwrap(), b"old");
    }

    #[test]
    fn export_import_roundtrip() {
        let (km, _) = manager();
        let sym = KeyId::new("sym");
        let pair = KeyId::new("pair");
        km.generate_symmetric_key(&sym).unwrap();
        km.generate_key_pair(&pair).unwrap();
        let iv = cipher::iv().unwrap();
        let ct = km.encrypt_with_symmetric_key(&sym, &iv, b"draft").unwrap();

        let archive = km.export_keys().unwrap();
        let json = serde_json::to_string(&archive).unwrap();
        let archive: KeyArchive = serde_json::from_str(&json).unwrap();

        let (other, audit) = manager();
        assert_eq!(other.import_keys(&archive).unwrap(), 2);
        assert_eq!(other.import_keys(&archive).unwrap(), 0);
        assert_eq!(other.decrypt_with_symmetric_key(&sym, &iv, &ct).unwrap(), b"draft");
        assert_eq!(audit.events_for(&AuditAction::KeyImported).len(), 2);
    }

    #[test]
    fn import_rejects_unknown_version() {
        let (km, _) = manager();
        let archive = KeyArchive {
            version: 99,
            exported_at: Utc::now(),
            keys: vec![],
        };
        assert!(km.import_keys(&archive).is_err());
    }

    #[test]
    fn remove_all_and_delete_absent() {
        let (km, _) = manager();
        let id = KeyId::new("k");
        km.generate_symmetric_key(&id).unwrap();
        km.delete_symmetric_key(&KeyId::new("absent")).unwrap();
        km.remove_all_keys().unwrap();
        assert!(!km.symmetric_key_exists(&id).unwrap());
        assert!(km.key_ids(KeyKind::Symmetric).unwrap().is_empty());
    }
}

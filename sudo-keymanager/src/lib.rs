//! # Sudo Key Manager
//!
//! Local key storage and the cryptographic primitives used by the Sudo Email
//! client.
//!
//! - symmetric AES-256-GCM keys addressed by id (attribute and draft sealing)
//! - X25519 key pairs forming the local end-to-end identity
//! - one-time message keys wrapped to recipient public keys
//! - current-key tracking with rotation; superseded keys keep decrypting
//! - pluggable storage (in-memory, one JSON file per key) and an audit trail
//!
//! ## Quick Start
//!
//! ```ignore
//! use sudo_keymanager::*;
//! use std::sync::Arc;
//!
//! let km: Arc<dyn KeyManager> = Arc::new(DefaultKeyManager::new(
//!     Arc::new(InMemoryKeyStorage::new()),
//!     Arc::new(TracingAuditSink),
//! ));
//! let symmetric = KeyManagerSymmetricKeys::new(km.clone());
//! let key_id = symmetric.current_or_generate().unwrap();
//!
//! let iv = cipher::iv().unwrap();
//! let sealed = km.encrypt_with_symmetric_key(&key_id, &iv, b"subject").unwrap();
//! assert_eq!(km.decrypt_with_symmetric_key(&key_id, &iv, &sealed).unwrap(), b"subject");
//! ```

pub mod audit;
pub mod cipher;
pub mod current;
pub mod error;
pub mod manager;
pub mod storage;
pub mod types;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use current::{KeyManagerKeyPairs, KeyManagerSymmetricKeys, SymmetricKeyProvider};
pub use error::{KeyManagerError, Result};
pub use manager::{DefaultKeyManager, KeyArchive, KeyManager, ARCHIVE_VERSION};
pub use storage::{FileKeyStorage, InMemoryKeyStorage, KeyStorage};
pub use types::{KeyId, KeyKind, KeyRecord, KeyState};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

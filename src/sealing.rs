//! Sealing: symmetric encryption of discrete values under a stored key.
//!
//! Sealed frame (v1):
//!   version[1] || algorithm[1] || iv[12] || ciphertext || tag[16]
//!
//! The frame is self-describing so a value sealed today can be unsealed after
//! the current key has rotated, as long as the referenced key is still held.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sudo_keymanager::cipher::{IV_BYTES, TAG_BYTES};
use sudo_keymanager::{KeyId, KeyManager};

use crate::error::SealingError;
use crate::message::address::normalize_address;

pub const SEALED_FRAME_VERSION: u8 = 0x01;

/// Frame tag for AES-256-GCM.
pub const ALGORITHM_TAG_AES_GCM: u8 = 0x01;

/// Algorithm name carried in [`SealedAttribute::algorithm`] and object metadata.
pub const AES_GCM_ALGORITHM: &str = "AES/GCM/NoPadding";

/// Smallest well-formed frame: header, IV and tag around an empty plaintext.
pub const MIN_SEALED_BYTES: usize = 2 + IV_BYTES + TAG_BYTES;

pub type SealingResult<T> = std::result::Result<T, SealingError>;

/// Seal/unseal opaque payloads under a key id.
pub trait SealingService: Send + Sync {
    fn seal(&self, key_id: &KeyId, data: &[u8]) -> SealingResult<Vec<u8>>;
    fn unseal(&self, key_id: &KeyId, data: &[u8]) -> SealingResult<Vec<u8>>;
}

/// [`SealingService`] over the key manager's symmetric keys.
pub struct DefaultSealingService {
    keys: Arc<dyn KeyManager>,
}

impl DefaultSealingService {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self { keys }
    }
}

impl SealingService for DefaultSealingService {
    fn seal(&self, key_id: &KeyId, data: &[u8]) -> SealingResult<Vec<u8>> {
        let iv: [u8; IV_BYTES] = self
            .keys
            .random_bytes(IV_BYTES)?
            .try_into()
            .map_err(|_| SealingError::KeyManager("random source returned wrong length".into()))?;
        let ct = self.keys.encrypt_with_symmetric_key(key_id, &iv, data)?;

        let mut out = Vec::with_capacity(2 + IV_BYTES + ct.len());
        out.push(SEALED_FRAME_VERSION);
        out.push(ALGORITHM_TAG_AES_GCM);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    fn unseal(&self, key_id: &KeyId, data: &[u8]) -> SealingResult<Vec<u8>> {
        if data.len() < MIN_SEALED_BYTES {
            return Err(SealingError::PayloadTooShort {
                len: data.len(),
                min: MIN_SEALED_BYTES,
            });
        }
        if data[0] != SEALED_FRAME_VERSION {
            return Err(SealingError::UnsupportedVersion(data[0]));
        }
        if data[1] != ALGORITHM_TAG_AES_GCM {
            return Err(SealingError::UnsupportedAlgorithm(format!("tag {:#04x}", data[1])));
        }
        let iv: [u8; IV_BYTES] = data[2..2 + IV_BYTES]
            .try_into()
            .map_err(|_| SealingError::InvalidEncoding("iv".into()))?;
        Ok(self.keys.decrypt_with_symmetric_key(key_id, &iv, &data[2 + IV_BYTES..])?)
    }
}

// ---------------------------------------------------------------------------
// Sealed attributes
// ---------------------------------------------------------------------------

/// What a sealed attribute decodes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlainTextType {
    String,
    Json,
}

impl PlainTextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlainTextType::String => "string",
            PlainTextType::Json => "json",
        }
    }
}

/// A value sealed for transport through the service, as it appears in
/// GraphQL inputs and outputs. Immutable: edits produce a new attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedAttribute {
    pub algorithm: String,
    pub key_id: String,
    pub plain_text_type: String,
    pub base64_encoded_sealed_data: String,
}

impl SealedAttribute {
    pub fn seal(
        service: &dyn SealingService,
        key_id: &KeyId,
        plain_text_type: PlainTextType,
        data: &[u8],
    ) -> SealingResult<Self> {
        let sealed = service.seal(key_id, data)?;
        Ok(Self {
            algorithm: AES_GCM_ALGORITHM.to_string(),
            key_id: key_id.as_str().to_string(),
            plain_text_type: plain_text_type.as_str().to_string(),
            base64_encoded_sealed_data: B64.encode(sealed),
        })
    }

    pub fn seal_string(service: &dyn SealingService, key_id: &KeyId, value: &str) -> SealingResult<Self> {
        Self::seal(service, key_id, PlainTextType::String, value.as_bytes())
    }

    pub fn seal_json<T: Serialize>(service: &dyn SealingService, key_id: &KeyId, value: &T) -> SealingResult<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| SealingError::InvalidEncoding(e.to_string()))?;
        Self::seal(service, key_id, PlainTextType::Json, &bytes)
    }

    pub fn unseal(&self, service: &dyn SealingService) -> SealingResult<Vec<u8>> {
        if self.algorithm != AES_GCM_ALGORITHM {
            return Err(SealingError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        let sealed = B64
            .decode(&self.base64_encoded_sealed_data)
            .map_err(|e| SealingError::InvalidEncoding(e.to_string()))?;
        service.unseal(&KeyId::new(self.key_id.as_str()), &sealed)
    }

    pub fn unseal_string(&self, service: &dyn SealingService) -> SealingResult<String> {
        self.expect_type(PlainTextType::String)?;
        String::from_utf8(self.unseal(service)?).map_err(|e| SealingError::InvalidEncoding(e.to_string()))
    }

    pub fn unseal_json<T: DeserializeOwned>(&self, service: &dyn SealingService) -> SealingResult<T> {
        self.expect_type(PlainTextType::Json)?;
        serde_json::from_slice(&self.unseal(service)?).map_err(|e| SealingError::InvalidEncoding(e.to_string()))
    }

    fn expect_type(&self, expected: PlainTextType) -> SealingResult<()> {
        if self.plain_text_type != expected.as_str() {
            return Err(SealingError::PlainTextTypeMismatch {
                expected: expected.as_str().to_string(),
                found: self.plain_text_type.clone(),
            });
        }
        Ok(())
    }
}

/// Deterministic blocklist hash: base64(SHA-256(owner || "|" || address)).
///
/// The address is normalized first so case variants hash identically.
pub fn hash_blocked_value(owner_id: &str, address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_address(address).as_bytes());
    B64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sudo_keymanager::{DefaultKeyManager, InMemoryKeyStorage, NoopAuditSink};

    fn service_with_key() -> (DefaultSealingService, KeyId) {
        let km = Arc::new(DefaultKeyManager::new(
            Arc::new(InMemoryKeyStorage::new()),
            Arc::new(NoopAuditSink),
        ));
        let id = KeyId::new("sealing-key");
        km.generate_symmetric_key(&id).unwrap();
        (DefaultSealingService::new(km), id)
    }

    #[test]
    fn seal_frame_layout() {
        let (svc, id) = service_with_key();
        let sealed = svc.seal(&id, b"hello").unwrap();
        assert_eq!(sealed[0], SEALED_FRAME_VERSION);
        assert_eq!(sealed[1], ALGORITHM_TAG_AES_GCM);
        assert_eq!(sealed.len(), MIN_SEALED_BYTES + 5);
        assert_eq!(svc.unseal(&id, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn empty_payload_seals() {
        let (svc, id) = service_with_key();
        let sealed = svc.seal(&id, b"").unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_BYTES);
        assert!(svc.unseal(&id, &sealed).unwrap().is_empty());
    }

    #[test]
    fn unseal_rejects_malformed_frames() {
        let (svc, id) = service_with_key();
        assert!(matches!(
            svc.unseal(&id, &[0u8; MIN_SEALED_BYTES - 1]),
            Err(SealingError::PayloadTooShort { .. })
        ));

        let mut sealed = svc.seal(&id, b"x").unwrap();
        sealed[1] = 0x09;
        assert!(matches!(svc.unseal(&id, &sealed), Err(SealingError::UnsupportedAlgorithm(_))));
        sealed[0] = 0x02;
        assert!(matches!(svc.unseal(&id, &sealed), Err(SealingError::UnsupportedVersion(0x02))));
    }

    #[test]
    fn unseal_tampered_or_wrong_key() {
        let (svc, id) = service_with_key();
        let mut sealed = svc.seal(&id, b"subject").unwrap();
        assert!(matches!(
            svc.unseal(&KeyId::new("other"), &sealed),
            Err(SealingError::KeyNotFound(_))
        ));
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(svc.unseal(&id, &sealed), Err(SealingError::Decrypt)));
    }

    #[test]
    fn sealed_attribute_types() {
        let (svc, id) = service_with_key();
        let attr = SealedAttribute::seal_string(&svc, &id, "Inbox stuff").unwrap();
        assert_eq!(attr.key_id, "sealing-key");
        assert_eq!(attr.unseal_string(&svc).unwrap(), "Inbox stuff");
        assert!(matches!(
            attr.unseal_json::<serde_json::Value>(&svc),
            Err(SealingError::PlainTextTypeMismatch { .. })
        ));

        let json = SealedAttribute::seal_json(&svc, &id, &vec!["a", "b"]).unwrap();
        assert_eq!(json.unseal_json::<Vec<String>>(&svc).unwrap(), vec!["a", "b"]);

        let mut bad = attr.clone();
        bad.algorithm = "ROT13".into();
        assert!(matches!(bad.unseal(&svc), Err(SealingError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn sealed_attribute_wire_names() {
        let (svc, id) = service_with_key();
        let attr = SealedAttribute::seal_string(&svc, &id, "v").unwrap();
        let json = serde_json::to_value(&attr).unwrap();
        assert!(json.get("keyId").is_some());
        assert!(json.get("plainTextType").is_some());
        assert!(json.get("base64EncodedSealedData").is_some());
    }

    #[test]
    fn blocked_value_hash_is_case_insensitive() {
        let a = hash_blocked_value("owner", "Spam@Example.com");
        let b = hash_blocked_value("owner", "spam@example.com");
        let c = hash_blocked_value("other-owner", "spam@example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

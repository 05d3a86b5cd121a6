//! End-to-end message encryption.
//!
//! Each message gets a fresh one-time AES-256 key. The RFC 822 bytes are
//! encrypted with it and the key is wrapped once per distinct recipient key
//! pair. Decryption matches key exchange records against locally held key
//! pair ids exactly; there is no best-effort fallback.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};
use sudo_keymanager::cipher::IV_BYTES;
use sudo_keymanager::{KeyId, KeyManager, KeyManagerKeyPairs};

use crate::error::{EmailError, Result};
use crate::message::EmailAttachment;
use crate::secure_package::{KeyExchangeRecord, SecurePackage};

/// A participant's published public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddressPublicInfo {
    pub email_address: String,
    pub key_id: String,
    /// Base64 X25519 public key.
    pub public_key: String,
}

impl EmailAddressPublicInfo {
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        B64.decode(&self.public_key)
            .map_err(|e| EmailError::failed(format!("public key for {}: {}", self.key_id, e)))
    }
}

pub trait EmailCryptoService: Send + Sync {
    fn encrypt(&self, data: &[u8], recipients: &[EmailAddressPublicInfo]) -> Result<SecurePackage>;
    fn decrypt(&self, package: &SecurePackage) -> Result<Vec<u8>>;
}

pub struct DefaultEmailCryptoService {
    keys: Arc<dyn KeyManager>,
    key_pairs: KeyManagerKeyPairs,
}

impl DefaultEmailCryptoService {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self {
            key_pairs: KeyManagerKeyPairs::new(keys.clone()),
            keys,
        }
    }
}

fn crypto_failure(e: impl std::fmt::Display) -> EmailError {
    EmailError::failed(format!("email crypto: {}", e))
}

impl EmailCryptoService for DefaultEmailCryptoService {
    fn encrypt(&self, data: &[u8], recipients: &[EmailAddressPublicInfo]) -> Result<SecurePackage> {
        if recipients.is_empty() {
            return Err(EmailError::invalid_input("no recipient keys for secure package"));
        }

        let message_key = self.keys.generate_raw_symmetric_key().map_err(crypto_failure)?;
        let iv: [u8; IV_BYTES] = self
            .keys
            .random_bytes(IV_BYTES)
            .map_err(crypto_failure)?
            .try_into()
            .map_err(|_| crypto_failure("iv length"))?;
        let ciphertext = self
            .keys
            .encrypt_with_raw_symmetric_key(&message_key[..], &iv, data)
            .map_err(crypto_failure)?;

        let mut body = Vec::with_capacity(IV_BYTES + ciphertext.len());
        body.extend_from_slice(&iv);
        body.extend_from_slice(&ciphertext);

        // One record per distinct key; a sender writing to themself shares a key.
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for recipient in recipients {
            if !seen.insert(recipient.key_id.as_str()) {
                continue;
            }
            let wrapped = self
                .keys
                .encrypt_with_public_key(&recipient.public_key_bytes()?, &message_key[..])
                .map_err(crypto_failure)?;
            keys.push(KeyExchangeRecord::new(recipient.key_id.as_str(), &wrapped).to_attachment()?);
        }

        tracing::debug!(key_exchange_count = keys.len(), body_bytes = body.len(), "built secure package");
        Ok(SecurePackage {
            body: EmailAttachment::secure_body(body),
            keys,
        })
    }

    fn decrypt(&self, package: &SecurePackage) -> Result<Vec<u8>> {
        let local: HashSet<String> = self
            .key_pairs
            .all_key_pair_ids()
            .map_err(crypto_failure)?
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect();

        // Records addressed to other recipients are not ours to validate.
        let record = package
            .keys
            .iter()
            .filter_map(|a| match KeyExchangeRecord::from_attachment(a) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable key exchange attachment");
                    None
                }
            })
            .find(|r| local.contains(&r.key_id))
            .ok_or_else(|| EmailError::failed("no key exchange attachment for a local key pair"))?;

        let message_key = zeroize::Zeroizing::new(
            self.keys
                .decrypt_with_private_key(&KeyId::new(record.key_id.as_str()), &record.wrapped_key()?)
                .map_err(crypto_failure)?,
        );

        let body = &package.body.data;
        if body.len() < IV_BYTES {
            return Err(crypto_failure("secure body too short"));
        }
        let iv: [u8; IV_BYTES] = body[..IV_BYTES].try_into().map_err(|_| crypto_failure("iv length"))?;
        self.keys
            .decrypt_with_raw_symmetric_key(&message_key[..], &iv, &body[IV_BYTES..])
            .map_err(crypto_failure)
    }
}

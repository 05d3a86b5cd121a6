//! Secure package: an encrypted message body plus one wrapped message key
//! per recipient, carried as reserved attachments.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{EmailError, Result, MALFORMED_SECURE_PACKAGE_MSG};
use crate::message::EmailAttachment;

/// Algorithm label written into each key exchange record.
pub const KEY_WRAP_ALGORITHM: &str = "X25519/HKDF-SHA256/AES-256-GCM";

/// Contents of a key exchange attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeRecord {
    /// Id of the recipient key pair the message key was wrapped to.
    pub key_id: String,
    pub algorithm: String,
    /// Base64 of the wrapped message key.
    pub encrypted_key: String,
}

impl KeyExchangeRecord {
    pub fn new(key_id: impl Into<String>, wrapped_key: &[u8]) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: KEY_WRAP_ALGORITHM.to_string(),
            encrypted_key: B64.encode(wrapped_key),
        }
    }

    pub fn wrapped_key(&self) -> Result<Vec<u8>> {
        B64.decode(&self.encrypted_key)
            .map_err(|e| EmailError::failed(format!("key exchange record: {}", e)))
    }

    pub fn to_attachment(&self) -> Result<EmailAttachment> {
        let data = serde_json::to_vec(self).map_err(|e| EmailError::failed(e.to_string()))?;
        Ok(EmailAttachment::key_exchange(data))
    }

    pub fn from_attachment(attachment: &EmailAttachment) -> Result<Self> {
        serde_json::from_slice(&attachment.data)
            .map_err(|e| EmailError::failed(format!("key exchange record: {}", e)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurePackage {
    /// `iv || ciphertext || tag` of the RFC 822 message.
    pub body: EmailAttachment,
    pub keys: Vec<EmailAttachment>,
}

impl SecurePackage {
    /// Pick the reserved attachments out of a decoded message.
    ///
    /// Key exchange attachments without a body attachment are rejected as
    /// malformed; a body without any key exchange is also unusable.
    pub fn from_attachments(attachments: &[EmailAttachment]) -> Result<Self> {
        let keys: Vec<EmailAttachment> = attachments.iter().filter(|a| a.is_key_exchange()).cloned().collect();
        let body = attachments.iter().find(|a| a.is_secure_body()).cloned();
        match body {
            Some(body) if !keys.is_empty() => Ok(Self { body, keys }),
            Some(_) => Err(EmailError::failed("secure package has no key exchange attachments")),
            None => Err(EmailError::failed(MALFORMED_SECURE_PACKAGE_MSG)),
        }
    }

    /// Key exchange attachments first, then the body.
    pub fn to_attachments(&self) -> Vec<EmailAttachment> {
        let mut out = self.keys.clone();
        out.push(self.body.clone());
        out
    }

    pub fn key_records(&self) -> Result<Vec<KeyExchangeRecord>> {
        self.keys.iter().map(KeyExchangeRecord::from_attachment).collect()
    }
}

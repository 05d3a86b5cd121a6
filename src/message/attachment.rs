//! Attachments and the reserved secure-email attachment roles.

use serde::{Deserialize, Serialize};

use crate::error::{EmailError, Result};

/// Key exchange attachment: one per recipient, holding the wrapped message key.
pub const KEY_EXCHANGE_FILE_NAME: &str = "Secure Data Key";
pub const KEY_EXCHANGE_CONTENT_ID: &str = "securekeyexchangedata@sudomail.com";
pub const KEY_EXCHANGE_MIME_TYPE: &str = "application/x-sudomail-key";

/// Body attachment: the encrypted RFC 822 message.
pub const BODY_FILE_NAME: &str = "Secure Email";
pub const BODY_CONTENT_ID: &str = "securebody@sudomail.com";
pub const BODY_MIME_TYPE: &str = "application/x-sudomail-body";

/// Role of an attachment in a secure package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecureRole {
    KeyExchange,
    Body,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_id: String,
    pub mime_type: String,
    pub inline: bool,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl EmailAttachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            content_id: String::new(),
            file_name,
            mime_type: mime_type.into(),
            inline: false,
            data,
        }
    }

    pub fn inline_with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = content_id.into();
        self.inline = true;
        self
    }

    pub fn key_exchange(data: Vec<u8>) -> Self {
        Self {
            file_name: KEY_EXCHANGE_FILE_NAME.to_string(),
            content_id: KEY_EXCHANGE_CONTENT_ID.to_string(),
            mime_type: KEY_EXCHANGE_MIME_TYPE.to_string(),
            inline: false,
            data,
        }
    }

    pub fn secure_body(data: Vec<u8>) -> Self {
        Self {
            file_name: BODY_FILE_NAME.to_string(),
            content_id: BODY_CONTENT_ID.to_string(),
            mime_type: BODY_MIME_TYPE.to_string(),
            inline: false,
            data,
        }
    }

    /// The reserved role this attachment plays, matched on the full
    /// file name / content id / mime type triple.
    pub fn secure_role(&self) -> Option<SecureRole> {
        let triple = (self.file_name.as_str(), self.content_id.as_str(), self.mime_type.as_str());
        match triple {
            (KEY_EXCHANGE_FILE_NAME, KEY_EXCHANGE_CONTENT_ID, KEY_EXCHANGE_MIME_TYPE) => Some(SecureRole::KeyExchange),
            (BODY_FILE_NAME, BODY_CONTENT_ID, BODY_MIME_TYPE) => Some(SecureRole::Body),
            _ => None,
        }
    }

    pub fn is_key_exchange(&self) -> bool {
        self.secure_role() == Some(SecureRole::KeyExchange)
    }

    pub fn is_secure_body(&self) -> bool {
        self.secure_role() == Some(SecureRole::Body)
    }

    /// Lower-cased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Reject attachments whose extension is on the denylist. Reserved secure
/// attachments are never checked. Denylist entries may carry a leading dot.
pub fn check_prohibited_extensions(attachments: &[EmailAttachment], prohibited: &[String]) -> Result<()> {
    for attachment in attachments.iter().filter(|a| a.secure_role().is_none()) {
        let Some(ext) = attachment.extension() else {
            continue;
        };
        let denied = prohibited
            .iter()
            .any(|p| p.trim_start_matches('.').eq_ignore_ascii_case(&ext));
        if denied {
            return Err(EmailError::InvalidContent(format!(
                "attachment type .{} is not permitted",
                ext
            )));
        }
    }
    Ok(())
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        B64.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denylist() -> Vec<String> {
        vec![".exe".to_string(), "js".to_string()]
    }

    #[test]
    fn reserved_roles_match_exactly() {
        assert!(EmailAttachment::key_exchange(vec![1]).is_key_exchange());
        assert!(EmailAttachment::secure_body(vec![1]).is_secure_body());

        let mut spoof = EmailAttachment::secure_body(vec![1]);
        spoof.mime_type = "application/octet-stream".into();
        assert_eq!(spoof.secure_role(), None);
    }

    #[test]
    fn prohibited_extension_rejected() {
        let attachments = vec![
            EmailAttachment::new("report.pdf", "application/pdf", vec![]),
            EmailAttachment::new("Setup.EXE", "application/octet-stream", vec![]),
        ];
        assert!(matches!(
            check_prohibited_extensions(&attachments, &denylist()),
            Err(EmailError::InvalidContent(_))
        ));
    }

    #[test]
    fn reserved_and_extensionless_pass() {
        let attachments = vec![
            EmailAttachment::key_exchange(vec![]),
            EmailAttachment::secure_body(vec![]),
            EmailAttachment::new("README", "text/plain", vec![]),
            EmailAttachment::new(".js", "text/plain", vec![]),
        ];
        check_prohibited_extensions(&attachments, &denylist()).unwrap();
    }

    #[test]
    fn data_serializes_as_base64() {
        let a = EmailAttachment::new("a.txt", "text/plain", b"hi".to_vec());
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["data"], "aGk=");
        assert_eq!(json["fileName"], "a.txt");
        let back: EmailAttachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }
}

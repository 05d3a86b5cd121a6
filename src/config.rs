//! Configuration.
//!
//! [`EmailConfig`] is fetched from the service (`getEmailConfig`) and drives
//! every limit the client enforces. [`ClientConfig`] holds local settings.
//!
//! Local settings (environment variables):
//!   SUDO_EMAIL_KEY_DIR        - directory for file-backed key storage
//!   SUDO_EMAIL_LOG_FORMAT     - "json" for structured logging, "pretty" for dev
//!   SUDO_EMAIL_OBJECT_PREFIX  - prefix prepended to every object storage key

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EmailError, Result};
use crate::logging::LogFormat;

/// Service-side limits and feature switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub delete_email_messages_limit: usize,
    pub update_email_messages_limit: usize,
    pub email_message_max_inbound_message_size: usize,
    pub email_message_max_outbound_message_size: usize,
    /// Recipient ceiling for every message.
    pub email_message_recipients_limit: usize,
    /// Recipient ceiling applied additionally when a message is encrypted.
    pub encrypted_email_message_recipients_limit: usize,
    #[serde(default)]
    pub prohibited_file_extensions: Vec<String>,
    #[serde(default)]
    pub send_encrypted_email_enabled: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            delete_email_messages_limit: 100,
            update_email_messages_limit: 100,
            email_message_max_inbound_message_size: 10 * 1024 * 1024,
            email_message_max_outbound_message_size: 10 * 1024 * 1024,
            email_message_recipients_limit: 50,
            encrypted_email_message_recipients_limit: 10,
            prohibited_file_extensions: Vec::new(),
            send_encrypted_email_enabled: true,
        }
    }
}

/// Local client settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// File-backed key storage directory; in-memory keys when unset.
    pub key_storage_dir: Option<PathBuf>,
    pub log_format: LogFormat,
    /// Prepended to object storage keys, e.g. an identity pool id.
    pub object_key_prefix: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let log_format = match std::env::var("SUDO_EMAIL_LOG_FORMAT") {
            Ok(v) => v.parse().map_err(EmailError::InvalidInput)?,
            Err(_) => LogFormat::default(),
        };
        Ok(Self {
            key_storage_dir: std::env::var_os("SUDO_EMAIL_KEY_DIR").map(PathBuf::from),
            log_format,
            object_key_prefix: std::env::var("SUDO_EMAIL_OBJECT_PREFIX").ok().filter(|p| !p.is_empty()),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| EmailError::InvalidInput(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&data).map_err(|e| EmailError::InvalidInput(format!("parse {}: {}", path.display(), e)))
    }

    /// Apply the configured prefix to an object key.
    pub fn object_key(&self, key: &str) -> String {
        match &self.object_key_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_config_wire_names() {
        let json = serde_json::json!({
            "deleteEmailMessagesLimit": 10,
            "updateEmailMessagesLimit": 5,
            "emailMessageMaxInboundMessageSize": 1000,
            "emailMessageMaxOutboundMessageSize": 2000,
            "emailMessageRecipientsLimit": 3,
            "encryptedEmailMessageRecipientsLimit": 2,
            "prohibitedFileExtensions": [".exe"],
            "sendEncryptedEmailEnabled": true
        });
        let config: EmailConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.delete_email_messages_limit, 10);
        assert_eq!(config.encrypted_email_message_recipients_limit, 2);
        assert_eq!(config.prohibited_file_extensions, vec![".exe"]);
    }

    #[test]
    fn client_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, r#"{ "logFormat": "json", "objectKeyPrefix": "pool-1/" }"#).unwrap();
        let config = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.key_storage_dir.is_none());
        assert_eq!(config.object_key("addr/draft/1"), "pool-1/addr/draft/1");
    }

    #[test]
    fn client_config_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ClientConfig::from_json_file(&path), Err(EmailError::InvalidInput(_))));
        assert!(ClientConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}

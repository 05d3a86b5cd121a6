//! The email client: every public operation, wired to its collaborators.
//!
//! Operations are grouped by area in the submodules; this module holds the
//! client itself, its builder, and the outbound preparation pipeline shared
//! by draft writes and sends.

mod addresses;
mod blocklist;
mod drafts;
mod folders;
mod messages;
mod send;

pub use addresses::{PartialProvisionedEmailAddress, ProvisionEmailAddressInput, ProvisionedEmailAddress};
pub use blocklist::{BlockedAddressAction, PartialBlockedAddress, UnsealedBlockedAddress};
pub use drafts::{DraftEmailMessage, DraftEmailMessageMetadata, ScheduledDraftMessage, ScheduledDraftMessageState};
pub use folders::{EmailFolder, PartialEmailFolder};
pub use messages::{
    EmailMessage, EmailMessageDirection, EmailMessageRfc822Data, EncryptionStatus, ListEmailMessagesInput,
    PartialEmailMessage, UpdateEmailMessagesValues, UpdatedEmailMessageSuccess,
};

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use sudo_keymanager::{
    DefaultKeyManager, FileKeyStorage, InMemoryKeyStorage, KeyManager, KeyManagerKeyPairs,
    KeyManagerSymmetricKeys, KeyStorage, SymmetricKeyProvider, TracingAuditSink,
};

use crate::config::{ClientConfig, EmailConfig};
use crate::email_crypto::{DefaultEmailCryptoService, EmailAddressPublicInfo, EmailCryptoService};
use crate::error::{EmailError, Result, MALFORMED_SECURE_PACKAGE_MSG};
use crate::graphql::{op, ConfiguredDomainsResponse, Page};
use crate::message::attachment::check_prohibited_extensions;
use crate::message::{MimeCodec, Rfc822Codec, SimplifiedEmailMessage};
use crate::network::{ConfiguredDomains, NetworkClass};
use crate::object_store::ObjectStore;
use crate::sealing::{DefaultSealingService, SealingService};
use crate::transport::{self, GraphqlTransport};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EmailClient {
    transport: Arc<dyn GraphqlTransport>,
    storage: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeyManager>,
    symmetric_keys: Arc<dyn SymmetricKeyProvider>,
    key_pairs: KeyManagerKeyPairs,
    sealing: Arc<dyn SealingService>,
    crypto: Arc<dyn EmailCryptoService>,
    codec: Arc<dyn Rfc822Codec>,
    config: ClientConfig,
    owner_id: String,
}

pub struct EmailClientBuilder {
    transport: Arc<dyn GraphqlTransport>,
    storage: Arc<dyn ObjectStore>,
    owner_id: String,
    keys: Option<Arc<dyn KeyManager>>,
    codec: Option<Arc<dyn Rfc822Codec>>,
    config: ClientConfig,
}

impl EmailClientBuilder {
    /// `owner_id` identifies the account owning blocklist entries.
    pub fn new(
        transport: Arc<dyn GraphqlTransport>,
        storage: Arc<dyn ObjectStore>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            storage,
            owner_id: owner_id.into(),
            keys: None,
            codec: None,
            config: ClientConfig::default(),
        }
    }

    pub fn key_manager(mut self, keys: Arc<dyn KeyManager>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Rfc822Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Without an explicit key manager, keys live in `key_storage_dir` when
    /// configured and in memory otherwise.
    pub fn build(self) -> Result<EmailClient> {
        let keys = match self.keys {
            Some(keys) => keys,
            None => {
                let storage: Arc<dyn KeyStorage> = match &self.config.key_storage_dir {
                    Some(dir) => Arc::new(
                        FileKeyStorage::new(dir).map_err(|e| EmailError::failed(format!("key storage: {}", e)))?,
                    ),
                    None => Arc::new(InMemoryKeyStorage::new()),
                };
                Arc::new(DefaultKeyManager::new(storage, Arc::new(TracingAuditSink)))
            }
        };
        if self.owner_id.trim().is_empty() {
            return Err(EmailError::invalid_input("owner id must not be empty"));
        }
        Ok(EmailClient {
            transport: self.transport,
            storage: self.storage,
            symmetric_keys: Arc::new(KeyManagerSymmetricKeys::new(keys.clone())),
            key_pairs: KeyManagerKeyPairs::new(keys.clone()),
            sealing: Arc::new(DefaultSealingService::new(keys.clone())),
            crypto: Arc::new(DefaultEmailCryptoService::new(keys.clone())),
            codec: self
                .codec
                .unwrap_or_else(|| Arc::new(MimeCodec) as Arc<dyn Rfc822Codec>),
            keys,
            config: self.config,
            owner_id: self.owner_id,
        })
    }
}

/// Outcome of the outbound preparation pipeline.
pub(crate) struct PreparedMessage {
    /// Bytes to persist or submit: the input unchanged, or the secure package message.
    pub bytes: Vec<u8>,
    /// The decoded input message.
    pub message: SimplifiedEmailMessage,
    pub encrypted: bool,
}

impl EmailClient {
    pub fn builder(
        transport: Arc<dyn GraphqlTransport>,
        storage: Arc<dyn ObjectStore>,
        owner_id: impl Into<String>,
    ) -> EmailClientBuilder {
        EmailClientBuilder::new(transport, storage, owner_id)
    }

    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.keys
    }

    pub fn symmetric_keys(&self) -> &Arc<dyn SymmetricKeyProvider> {
        &self.symmetric_keys
    }

    // -----------------------------------------------------------------------
    // Remote configuration
    // -----------------------------------------------------------------------

    pub async fn get_email_config(&self) -> Result<EmailConfig> {
        transport::query(self.transport.as_ref(), op::GET_EMAIL_CONFIG, json!({})).await
    }

    pub async fn get_configured_email_domains(&self) -> Result<Vec<String>> {
        let r: ConfiguredDomainsResponse =
            transport::query(self.transport.as_ref(), op::GET_CONFIGURED_EMAIL_DOMAINS, json!({})).await?;
        Ok(r.domains)
    }

    /// Published public keys for `addresses`. Addresses without a key are
    /// simply absent from the result.
    pub async fn lookup_email_addresses_public_info(
        &self,
        addresses: &[String],
    ) -> Result<Vec<EmailAddressPublicInfo>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let page: Page<EmailAddressPublicInfo> = transport::query(
            self.transport.as_ref(),
            op::LOOKUP_EMAIL_ADDRESSES_PUBLIC_INFO,
            json!({ "input": { "emailAddresses": addresses } }),
        )
        .await?;
        Ok(page.items)
    }

    fn object_key(&self, email_address_id: &str, kind: &str, id: &str) -> String {
        self.config.object_key(&format!("{}/{}/{}", email_address_id, kind, id))
    }

    // -----------------------------------------------------------------------
    // Outbound preparation
    // -----------------------------------------------------------------------

    /// Checks on an outgoing message that need no I/O: it decodes, every
    /// address header parses, and a key exchange never arrives without its
    /// body attachment.
    pub(crate) fn decode_outbound(&self, rfc822: &[u8]) -> Result<SimplifiedEmailMessage> {
        let message = self.codec.decode(rfc822)?;
        if message.has_key_exchange() && message.body_attachment().is_none() {
            return Err(EmailError::failed(MALFORMED_SECURE_PACKAGE_MSG));
        }
        Ok(message)
    }

    /// Decide plaintext vs. end-to-end encryption for an outgoing message
    /// and produce the bytes to persist or send. `message` is the result of
    /// [`decode_outbound`](Self::decode_outbound) on `rfc822`.
    ///
    /// Order: attachment denylist, general recipient limit, domain
    /// classification, public key lookup, encrypted recipient limit,
    /// encryption. A message that is already a secure package takes the same
    /// checks and must classify as encrypted in-network mail; it is then
    /// passed through without a second encryption.
    pub(crate) async fn prepare_outbound(
        &self,
        rfc822: &[u8],
        message: SimplifiedEmailMessage,
        config: &EmailConfig,
    ) -> Result<PreparedMessage> {
        check_prohibited_extensions(&message.attachments, &config.prohibited_file_extensions)?;

        let recipients = message.recipient_count();
        if recipients > config.email_message_recipients_limit {
            return Err(EmailError::LimitExceeded(format!(
                "{} recipients exceeds limit of {}",
                recipients, config.email_message_recipients_limit
            )));
        }

        let domains = ConfiguredDomains::new(self.get_configured_email_domains().await?);
        let class = domains.classify(&message);

        if message.is_secure_package() {
            match class {
                NetworkClass::OutOfNetwork(external) => {
                    return Err(EmailError::invalid_input(format!(
                        "secure package addressed to {} out-of-network participant(s)",
                        external.len()
                    )));
                }
                NetworkClass::InNetwork if !config.send_encrypted_email_enabled => {
                    return Err(EmailError::invalid_input(
                        "secure package supplied while encrypted email is disabled",
                    ));
                }
                NetworkClass::InNetwork => {}
            }
            check_encrypted_limit(recipients, config)?;
            tracing::debug!("message is already a secure package");
            return Ok(PreparedMessage {
                bytes: rfc822.to_vec(),
                message,
                encrypted: true,
            });
        }

        match class {
            NetworkClass::OutOfNetwork(external) => {
                tracing::debug!(external = external.len(), "out-of-network message");
                return Ok(PreparedMessage {
                    bytes: rfc822.to_vec(),
                    message,
                    encrypted: false,
                });
            }
            NetworkClass::InNetwork if !config.send_encrypted_email_enabled => {
                tracing::debug!("in-network message, encryption disabled by configuration");
                return Ok(PreparedMessage {
                    bytes: rfc822.to_vec(),
                    message,
                    encrypted: false,
                });
            }
            NetworkClass::InNetwork => {}
        }

        let mut seen = HashSet::new();
        let participants: Vec<String> = message
            .participants()
            .map(|a| a.normalized())
            .filter(|a| seen.insert(a.clone()))
            .collect();
        let infos = self.lookup_email_addresses_public_info(&participants).await?;
        for address in &participants {
            if !infos.iter().any(|i| i.email_address.eq_ignore_ascii_case(address)) {
                return Err(EmailError::InNetworkAddressNotFound(address.clone()));
            }
        }

        check_encrypted_limit(recipients, config)?;

        let package = self.crypto.encrypt(rfc822, &infos)?;
        let outer = SimplifiedEmailMessage {
            from: message.from.clone(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            bcc: message.bcc.clone(),
            reply_to: message.reply_to.clone(),
            message_id: message.message_id.clone(),
            date: message.date,
            attachments: package.to_attachments(),
            encrypted: true,
            ..Default::default()
        };
        tracing::debug!(key_exchange_count = package.keys.len(), "encrypted in-network message");
        Ok(PreparedMessage {
            bytes: self.codec.encode(&outer)?,
            message,
            encrypted: true,
        })
    }

    /// Reverse of [`prepare_outbound`](Self::prepare_outbound) for stored
    /// bytes: decrypt when they hold a secure package, pass through otherwise.
    pub(crate) fn open_stored(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let message = match self.codec.decode(&bytes) {
            Ok(m) => m,
            // Not a parseable message; nothing to decrypt.
            Err(_) => return Ok(bytes),
        };
        if !message.has_key_exchange() {
            return Ok(bytes);
        }
        let package = crate::secure_package::SecurePackage::from_attachments(&message.attachments)?;
        self.crypto.decrypt(&package)
    }
}

fn check_encrypted_limit(recipients: usize, config: &EmailConfig) -> Result<()> {
    if recipients > config.encrypted_email_message_recipients_limit {
        return Err(EmailError::LimitExceeded(format!(
            "{} recipients exceeds encrypted message limit of {}",
            recipients, config.encrypted_email_message_recipients_limit
        )));
    }
    Ok(())
}

/// Deduplicate ids preserving first occurrence; reject empty and over-limit input.
pub(crate) fn validate_ids(ids: &[String], limit: usize, what: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect();
    if unique.is_empty() {
        return Err(EmailError::invalid_input(format!("no {} ids supplied", what)));
    }
    if unique.len() > limit {
        return Err(EmailError::LimitExceeded(format!(
            "{} {} ids exceeds limit of {}",
            unique.len(),
            what,
            limit
        )));
    }
    Ok(unique)
}

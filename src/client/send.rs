//! Sending messages.

use serde_json::json;
use uuid::Uuid;

use super::EmailClient;
use crate::error::{EmailError, Result};
use crate::graphql::{op, Rfc822Header, SendEmailMessageResult};
use crate::message::SimplifiedEmailMessage;
use crate::object_store::StorageError;
use crate::transport;

const TRANSIENT: &str = "transient";

impl Rfc822Header {
    /// Plaintext header summary of `message`.
    pub fn from_message(message: &SimplifiedEmailMessage) -> Self {
        let list = |v: &[crate::message::EmailAddress]| v.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        Self {
            from: message.from.first().map(|a| a.to_string()).unwrap_or_default(),
            to: list(&message.to),
            cc: list(&message.cc),
            bcc: list(&message.bcc),
            reply_to: list(&message.reply_to),
            subject: message.subject.clone(),
            has_attachments: message
                .attachments
                .iter()
                .any(|a| a.secure_role().is_none()),
            date: message.date.map(|d| d.to_rfc3339()),
        }
    }
}

impl EmailClient {
    /// Send an RFC 822 message from `email_address_id`.
    ///
    /// In-network messages go out end-to-end encrypted; everything else is
    /// submitted as-is. The message is staged under a transient object key
    /// that is removed once the service has accepted or rejected it.
    pub async fn send_email_message(&self, rfc822: &[u8], email_address_id: &str) -> Result<SendEmailMessageResult> {
        let message = self.decode_outbound(rfc822)?;
        let config = self.get_email_config().await?;
        if rfc822.len() > config.email_message_max_outbound_message_size {
            return Err(EmailError::LimitExceeded(format!(
                "message of {} bytes exceeds outbound limit of {}",
                rfc822.len(),
                config.email_message_max_outbound_message_size
            )));
        }

        let prepared = self.prepare_outbound(rfc822, message, &config).await?;
        let key = self.object_key(email_address_id, TRANSIENT, &Uuid::new_v4().to_string());
        self.storage.upload(prepared.bytes, &key, None).await?;

        let sent: Result<SendEmailMessageResult> = if prepared.encrypted {
            let header = Rfc822Header::from_message(&prepared.message);
            transport::mutate(
                self.transport.as_ref(),
                op::SEND_ENCRYPTED_EMAIL_MESSAGE,
                json!({
                    "input": {
                        "emailAddressId": email_address_id,
                        "messageKey": key,
                        "rfc822Header": header,
                        "hasAttachments": header.has_attachments,
                    }
                }),
            )
            .await
        } else {
            transport::mutate(
                self.transport.as_ref(),
                op::SEND_EMAIL_MESSAGE,
                json!({
                    "input": {
                        "emailAddressId": email_address_id,
                        "messageKey": key,
                    }
                }),
            )
            .await
        };

        match self.storage.delete(&key).await {
            Ok(()) => {}
            Err(StorageError::Cancelled) => return Err(EmailError::Cancelled),
            Err(e) => tracing::warn!(error = %e, "could not remove transient message object"),
        }

        let result = sent?;
        tracing::info!(
            email_address_id,
            message_id = %result.id,
            encrypted = prepared.encrypted,
            "sent email message"
        );
        Ok(result)
    }
}

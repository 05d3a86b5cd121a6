//! Received and sent messages: listing, lookup, bulk update and delete,
//! and raw RFC 822 retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sudo_keymanager::KeyId;

use super::{validate_ids, EmailClient};
use crate::batch::{reconcile, BatchItem, BatchOperationResult, EmailMessageOperationFailureResult, RemoteBatch};
use crate::error::{EmailError, Result, SealingError};
use crate::graphql::{op, MessageBatchResponse, Page, Rfc822Header};
use crate::list::{unseal_page, ListApiResult, Unsealable};
use crate::message::EmailAddress;
use crate::object_store::METADATA_KEY_ID;
use crate::sealing::{SealedAttribute, SealingService};
use crate::transport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailMessageDirection {
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionStatus {
    Encrypted,
    #[default]
    Unencrypted,
}

/// A message record as returned by the service; the header summary is sealed.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SealedEmailMessage {
    id: String,
    email_address_id: String,
    folder_id: String,
    #[serde(default)]
    seen: bool,
    direction: EmailMessageDirection,
    #[serde(default)]
    encryption_status: EncryptionStatus,
    #[serde(default)]
    size: u64,
    #[serde(rename = "createdAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
    rfc822_header: SealedAttribute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub id: String,
    pub email_address_id: String,
    pub folder_id: String,
    pub seen: bool,
    pub direction: EmailMessageDirection,
    pub encryption_status: EncryptionStatus,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub subject: Option<String>,
    pub has_attachments: bool,
    pub date: Option<DateTime<Utc>>,
}

/// An [`EmailMessage`] whose header summary could not be unsealed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialEmailMessage {
    pub id: String,
    pub email_address_id: String,
    pub folder_id: String,
    pub seen: bool,
    pub direction: EmailMessageDirection,
    pub encryption_status: EncryptionStatus,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn header_addresses(values: &[String]) -> Result<Vec<EmailAddress>> {
    values
        .iter()
        .map(|v| {
            EmailAddress::parse(v)
                .map_err(|_| EmailError::Unsealing(SealingError::InvalidEncoding(format!("header address {:?}", v))))
        })
        .collect()
}

impl Unsealable for SealedEmailMessage {
    type Output = EmailMessage;
    type Partial = PartialEmailMessage;

    fn unseal(&self, sealing: &dyn SealingService) -> Result<EmailMessage> {
        let header: Rfc822Header = self.rfc822_header.unseal_json(sealing)?;
        let from = if header.from.is_empty() {
            Vec::new()
        } else {
            header_addresses(std::slice::from_ref(&header.from))?
        };
        let date = header
            .date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc));
        Ok(EmailMessage {
            id: self.id.clone(),
            email_address_id: self.email_address_id.clone(),
            folder_id: self.folder_id.clone(),
            seen: self.seen,
            direction: self.direction,
            encryption_status: self.encryption_status,
            size: self.size,
            created_at: self.created_at,
            updated_at: self.updated_at,
            from,
            to: header_addresses(&header.to)?,
            cc: header_addresses(&header.cc)?,
            bcc: header_addresses(&header.bcc)?,
            reply_to: header_addresses(&header.reply_to)?,
            subject: header.subject,
            has_attachments: header.has_attachments,
            date,
        })
    }

    fn to_partial(&self) -> PartialEmailMessage {
        PartialEmailMessage {
            id: self.id.clone(),
            email_address_id: self.email_address_id.clone(),
            folder_id: self.folder_id.clone(),
            seen: self.seen,
            direction: self.direction,
            encryption_status: self.encryption_status,
            size: self.size,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListEmailMessagesInput {
    pub email_address_id: String,
    pub folder_id: Option<String>,
    pub limit: Option<u32>,
    pub next_token: Option<String>,
}

/// Changes applied by [`EmailClient::update_email_messages`]. At least one
/// field must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailMessagesValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seen: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedEmailMessageSuccess {
    pub id: String,
    #[serde(default, rename = "createdAtEpochMs", with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "updatedAtEpochMs", with = "chrono::serde::ts_milliseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BatchItem for UpdatedEmailMessageSuccess {
    fn item_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessageRfc822Data {
    pub id: String,
    pub rfc822_data: Vec<u8>,
}

fn operation_failure(id: &str, error: &str) -> EmailMessageOperationFailureResult {
    EmailMessageOperationFailureResult {
        id: id.to_string(),
        error_type: error.to_string(),
    }
}

impl EmailClient {
    /// `None` when no message has this id.
    pub async fn get_email_message(&self, id: &str) -> Result<Option<EmailMessage>> {
        let sealed: Option<SealedEmailMessage> =
            transport::query_optional(self.transport.as_ref(), op::GET_EMAIL_MESSAGE, json!({ "id": id })).await?;
        sealed.map(|m| m.unseal(self.sealing.as_ref())).transpose()
    }

    pub async fn list_email_messages_for_email_address_id(
        &self,
        input: &ListEmailMessagesInput,
    ) -> Result<ListApiResult<EmailMessage, PartialEmailMessage>> {
        let page: Page<SealedEmailMessage> = transport::query(
            self.transport.as_ref(),
            op::LIST_EMAIL_MESSAGES_FOR_EMAIL_ADDRESS_ID,
            json!({
                "input": {
                    "emailAddressId": input.email_address_id,
                    "folderId": input.folder_id,
                    "limit": input.limit,
                    "nextToken": input.next_token,
                }
            }),
        )
        .await?;
        unseal_page(&page.items, self.sealing.as_ref(), page.next_token)
    }

    pub async fn update_email_messages(
        &self,
        ids: &[String],
        values: &UpdateEmailMessagesValues,
    ) -> Result<BatchOperationResult<UpdatedEmailMessageSuccess, EmailMessageOperationFailureResult>> {
        if values.folder_id.is_none() && values.seen.is_none() {
            return Err(EmailError::invalid_input("no update values supplied"));
        }
        let config = self.get_email_config().await?;
        let ids = validate_ids(ids, config.update_email_messages_limit, "message")?;

        let response: MessageBatchResponse<UpdatedEmailMessageSuccess> = transport::mutate(
            self.transport.as_ref(),
            op::UPDATE_EMAIL_MESSAGES,
            json!({ "input": { "messageIds": ids, "values": values } }),
        )
        .await?;
        Ok(reconcile(
            &ids,
            RemoteBatch {
                status: response.status,
                success: response.success_messages,
                failure: response.failed_messages,
                error: None,
            },
            |id| UpdatedEmailMessageSuccess {
                id: id.to_string(),
                created_at: None,
                updated_at: None,
            },
            operation_failure,
        ))
    }

    pub async fn delete_email_messages(
        &self,
        ids: &[String],
    ) -> Result<BatchOperationResult<String, EmailMessageOperationFailureResult>> {
        let config = self.get_email_config().await?;
        let ids = validate_ids(ids, config.delete_email_messages_limit, "message")?;

        let response: MessageBatchResponse<String> = transport::mutate(
            self.transport.as_ref(),
            op::DELETE_EMAIL_MESSAGES,
            json!({ "input": { "messageIds": ids } }),
        )
        .await?;
        let result = reconcile(
            &ids,
            RemoteBatch {
                status: response.status,
                success: response.success_messages,
                failure: response.failed_messages,
                error: None,
            },
            |id| id.to_string(),
            operation_failure,
        );
        tracing::info!(
            deleted = result.success_values().len(),
            failed = result.failure_values().len(),
            "deleted email messages"
        );
        Ok(result)
    }

    /// Raw RFC 822 content of a stored message, decrypted when it was
    /// delivered end-to-end encrypted.
    pub async fn get_email_message_rfc822_data(
        &self,
        id: &str,
        email_address_id: &str,
    ) -> Result<EmailMessageRfc822Data> {
        let key = self.object_key(email_address_id, "email", id);
        let metadata = self.storage.get_object_metadata(&key).await?;
        let stored = self.storage.download(&key).await?;
        let bytes = match metadata.get(METADATA_KEY_ID) {
            Some(key_id) => self.sealing.unseal(&KeyId::new(key_id.as_str()), &stored)?,
            None => stored,
        };
        Ok(EmailMessageRfc822Data {
            id: id.to_string(),
            rfc822_data: self.open_stored(bytes)?,
        })
    }
}

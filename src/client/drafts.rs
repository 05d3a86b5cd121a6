//! Draft lifecycle: create, update, read, list, delete, scheduled send.
//!
//! Drafts are stored as sealed objects under `{emailAddressId}/draft/{draftId}`.
//! The object metadata records the sealing key id so older drafts keep
//! opening after the current key rotates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sudo_keymanager::KeyId;
use uuid::Uuid;

use super::{validate_ids, EmailClient};
use crate::batch::{reconcile, BatchOperationResult, BatchOperationStatus, EmailMessageOperationFailureResult, RemoteBatch};
use crate::error::{EmailError, Result};
use crate::graphql::op;
use crate::message::SimplifiedEmailMessage;
use crate::object_store::{ObjectMetadata, StorageError, METADATA_ALGORITHM, METADATA_KEY_ID};
use crate::sealing::AES_GCM_ALGORITHM;
use crate::transport;

const DRAFT: &str = "draft";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftEmailMessageMetadata {
    pub id: String,
    pub email_address_id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftEmailMessage {
    pub id: String,
    pub email_address_id: String,
    /// Plaintext RFC 822 bytes, decrypted when the draft was stored end-to-end encrypted.
    pub rfc822_data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduledDraftMessageState {
    Scheduled,
    Sent,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDraftMessage {
    pub id: String,
    pub email_address_id: String,
    #[serde(rename = "sendAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    pub send_at: DateTime<Utc>,
    pub state: ScheduledDraftMessageState,
}

impl EmailClient {
    /// Store a new draft. Returns the draft id.
    pub async fn create_draft_email_message(&self, rfc822: &[u8], email_address_id: &str) -> Result<String> {
        let message = self.decode_outbound(rfc822)?;
        let address: Option<serde_json::Value> = transport::query_optional(
            self.transport.as_ref(),
            op::GET_EMAIL_ADDRESS,
            json!({ "id": email_address_id }),
        )
        .await?;
        if address.is_none() {
            return Err(EmailError::AddressNotFound);
        }

        let draft_id = Uuid::new_v4().to_string();
        self.write_draft(&draft_id, rfc822, message, email_address_id).await?;
        tracing::info!(draft_id = %draft_id, email_address_id, "created draft");
        Ok(draft_id)
    }

    /// Replace the content of an existing draft. Returns the draft id.
    pub async fn update_draft_email_message(
        &self,
        draft_id: &str,
        rfc822: &[u8],
        email_address_id: &str,
    ) -> Result<String> {
        let message = self.decode_outbound(rfc822)?;
        self.draft_metadata(draft_id, email_address_id).await?;
        self.write_draft(draft_id, rfc822, message, email_address_id).await?;
        tracing::info!(draft_id, email_address_id, "updated draft");
        Ok(draft_id.to_string())
    }

    async fn write_draft(
        &self,
        draft_id: &str,
        rfc822: &[u8],
        message: SimplifiedEmailMessage,
        email_address_id: &str,
    ) -> Result<()> {
        let config = self.get_email_config().await?;
        let prepared = self.prepare_outbound(rfc822, message, &config).await?;

        let key_id = self.symmetric_keys.current_or_generate()?;
        let sealed = self.sealing.seal(&key_id, &prepared.bytes)?;
        let mut metadata = ObjectMetadata::new();
        metadata.insert(METADATA_KEY_ID.to_string(), key_id.as_str().to_string());
        metadata.insert(METADATA_ALGORITHM.to_string(), AES_GCM_ALGORITHM.to_string());

        let key = self.object_key(email_address_id, DRAFT, draft_id);
        self.storage.upload(sealed, &key, Some(metadata)).await?;
        tracing::debug!(draft_id, encrypted = prepared.encrypted, key_id = %key_id, "draft persisted");
        Ok(())
    }

    async fn draft_metadata(&self, draft_id: &str, email_address_id: &str) -> Result<ObjectMetadata> {
        let key = self.object_key(email_address_id, DRAFT, draft_id);
        match self.storage.get_object_metadata(&key).await {
            Ok(metadata) => Ok(metadata),
            Err(StorageError::NotFound(_)) => Err(EmailError::DraftNotFound(draft_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_draft_email_message(&self, draft_id: &str, email_address_id: &str) -> Result<DraftEmailMessage> {
        let metadata = self.draft_metadata(draft_id, email_address_id).await?;
        let key_id = metadata
            .get(METADATA_KEY_ID)
            .map(|k| KeyId::new(k.as_str()))
            .ok_or_else(|| EmailError::failed(format!("draft {} has no key id", draft_id)))?;

        let key = self.object_key(email_address_id, DRAFT, draft_id);
        let sealed = match self.storage.download(&key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Err(EmailError::DraftNotFound(draft_id.to_string())),
            Err(e) => return Err(e.into()),
        };
        let unsealed = self.sealing.unseal(&key_id, &sealed)?;
        Ok(DraftEmailMessage {
            id: draft_id.to_string(),
            email_address_id: email_address_id.to_string(),
            rfc822_data: self.open_stored(unsealed)?,
        })
    }

    pub async fn list_draft_email_message_metadata(
        &self,
        email_address_id: &str,
    ) -> Result<Vec<DraftEmailMessageMetadata>> {
        let prefix = self.object_key(email_address_id, DRAFT, "");
        let objects = self.storage.list(&prefix).await?;
        Ok(objects
            .into_iter()
            .filter_map(|o| {
                let id = o.key.strip_prefix(&prefix)?;
                (!id.is_empty()).then(|| DraftEmailMessageMetadata {
                    id: id.to_string(),
                    email_address_id: email_address_id.to_string(),
                    updated_at: o.last_modified,
                })
            })
            .collect())
    }

    /// Delete drafts one by one, then cancel any scheduled send for each
    /// draft that was removed.
    pub async fn delete_draft_email_messages(
        &self,
        draft_ids: &[String],
        email_address_id: &str,
    ) -> Result<BatchOperationResult<String, EmailMessageOperationFailureResult>> {
        let config = self.get_email_config().await?;
        let ids = validate_ids(draft_ids, config.delete_email_messages_limit, "draft")?;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for id in &ids {
            let key = self.object_key(email_address_id, DRAFT, id);
            match self.storage.delete(&key).await {
                Ok(()) => deleted.push(id.clone()),
                Err(StorageError::Cancelled) => return Err(EmailError::Cancelled),
                Err(e) => {
                    let error_type = match e {
                        StorageError::Other(msg) => msg,
                        other => other.to_string(),
                    };
                    tracing::debug!(draft_id = %id, error = %error_type, "draft delete failed");
                    failed.push(EmailMessageOperationFailureResult {
                        id: id.clone(),
                        error_type,
                    });
                }
            }
        }

        let status = match (deleted.is_empty(), failed.is_empty()) {
            (_, true) => BatchOperationStatus::Success,
            (true, false) => BatchOperationStatus::Failure,
            (false, false) => BatchOperationStatus::Partial,
        };
        let result = reconcile(
            &ids,
            RemoteBatch {
                status,
                success: deleted,
                failure: failed,
                error: None,
            },
            |id| id.to_string(),
            |id, error| EmailMessageOperationFailureResult {
                id: id.to_string(),
                error_type: error.to_string(),
            },
        );

        for id in result.success_values() {
            if let Err(e) = self.cancel_scheduled_draft_message(id, email_address_id).await {
                if e.is_cancellation() {
                    return Err(e);
                }
                tracing::warn!(draft_id = %id, error = %e, "could not cancel scheduled send for deleted draft");
            }
        }
        tracing::info!(
            email_address_id,
            deleted = result.success_values().len(),
            failed = result.failure_values().len(),
            "deleted drafts"
        );
        Ok(result)
    }

    /// Ask the service to send a stored draft at `send_at`.
    ///
    /// The service is given the draft's object key and the id of the key it
    /// is sealed with; key material never leaves the key manager.
    pub async fn schedule_send_draft(
        &self,
        draft_id: &str,
        email_address_id: &str,
        send_at: DateTime<Utc>,
    ) -> Result<ScheduledDraftMessage> {
        if send_at <= Utc::now() {
            return Err(EmailError::invalid_input("send time must be in the future"));
        }
        let metadata = self.draft_metadata(draft_id, email_address_id).await?;
        let key_id = metadata
            .get(METADATA_KEY_ID)
            .cloned()
            .ok_or_else(|| EmailError::failed(format!("draft {} has no key id", draft_id)))?;

        let scheduled: ScheduledDraftMessage = transport::mutate(
            self.transport.as_ref(),
            op::SCHEDULE_SEND_DRAFT_MESSAGE,
            json!({
                "input": {
                    "draftMessageKey": self.object_key(email_address_id, DRAFT, draft_id),
                    "emailAddressId": email_address_id,
                    "sendAtEpochMs": send_at.timestamp_millis(),
                    "symmetricKeyId": key_id,
                }
            }),
        )
        .await?;
        tracing::info!(draft_id, email_address_id, send_at = %send_at, "scheduled draft send");
        Ok(scheduled)
    }

    /// Cancel a scheduled send. Returns the draft id.
    pub async fn cancel_scheduled_draft_message(&self, draft_id: &str, email_address_id: &str) -> Result<String> {
        let id: String = transport::mutate(
            self.transport.as_ref(),
            op::CANCEL_SCHEDULED_DRAFT_MESSAGE,
            json!({
                "input": {
                    "draftMessageKey": self.object_key(email_address_id, DRAFT, draft_id),
                    "emailAddressId": email_address_id,
                }
            }),
        )
        .await?;
        Ok(id)
    }
}

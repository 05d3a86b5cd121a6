//! Operation names and response shapes shared across the client.
//!
//! Sealed item types live next to the operations that unseal them.

use serde::{Deserialize, Serialize};

use crate::batch::BatchOperationStatus;

pub mod op {
    // queries
    pub const GET_EMAIL_CONFIG: &str = "getEmailConfig";
    pub const GET_CONFIGURED_EMAIL_DOMAINS: &str = "getConfiguredEmailDomains";
    pub const LOOKUP_EMAIL_ADDRESSES_PUBLIC_INFO: &str = "lookupEmailAddressesPublicInfo";
    pub const GET_EMAIL_ADDRESS: &str = "getEmailAddress";
    pub const LIST_EMAIL_ADDRESSES: &str = "listEmailAddresses";
    pub const GET_EMAIL_MESSAGE: &str = "getEmailMessage";
    pub const LIST_EMAIL_MESSAGES_FOR_EMAIL_ADDRESS_ID: &str = "listEmailMessagesForEmailAddressId";
    pub const LIST_EMAIL_FOLDERS_FOR_EMAIL_ADDRESS_ID: &str = "listEmailFoldersForEmailAddressId";
    pub const GET_EMAIL_ADDRESS_BLOCKLIST: &str = "getEmailAddressBlocklist";

    // mutations
    pub const PROVISION_EMAIL_ADDRESS: &str = "provisionEmailAddress";
    pub const DEPROVISION_EMAIL_ADDRESS: &str = "deprovisionEmailAddress";
    pub const SEND_EMAIL_MESSAGE: &str = "sendEmailMessage";
    pub const SEND_ENCRYPTED_EMAIL_MESSAGE: &str = "sendEncryptedEmailMessage";
    pub const SCHEDULE_SEND_DRAFT_MESSAGE: &str = "scheduleSendDraftMessage";
    pub const CANCEL_SCHEDULED_DRAFT_MESSAGE: &str = "cancelScheduledDraftMessage";
    pub const UPDATE_EMAIL_MESSAGES: &str = "updateEmailMessages";
    pub const DELETE_EMAIL_MESSAGES: &str = "deleteEmailMessages";
    pub const CREATE_CUSTOM_EMAIL_FOLDER: &str = "createCustomEmailFolder";
    pub const UPDATE_CUSTOM_EMAIL_FOLDER: &str = "updateCustomEmailFolder";
    pub const DELETE_CUSTOM_EMAIL_FOLDER: &str = "deleteCustomEmailFolder";
    pub const BLOCK_EMAIL_ADDRESSES: &str = "blockEmailAddresses";
    pub const UNBLOCK_EMAIL_ADDRESSES: &str = "unblockEmailAddresses";
}

/// One page of a list query.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredDomainsResponse {
    pub domains: Vec<String>,
}

/// Bulk response for message operations.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatchResponse<S> {
    pub status: BatchOperationStatus,
    #[serde(default = "Vec::new")]
    pub success_messages: Vec<S>,
    #[serde(default)]
    pub failed_messages: Vec<crate::batch::EmailMessageOperationFailureResult>,
}

/// Bulk response for blocklist operations; items are hashed values.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistBatchResponse {
    pub status: BatchOperationStatus,
    #[serde(default)]
    pub success_addresses: Vec<String>,
    #[serde(default)]
    pub failed_addresses: Vec<String>,
}

/// Result of a send mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailMessageResult {
    pub id: String,
    pub created_at_epoch_ms: i64,
}

/// Header summary submitted with an end-to-end encrypted send.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfc822Header {
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub date: Option<String>,
}

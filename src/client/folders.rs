//! Email folders. Custom folder names are sealed with the current key.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::EmailClient;
use crate::error::{EmailError, Result};
use crate::graphql::{op, Page};
use crate::list::{unseal_page, ListApiResult, Unsealable};
use crate::sealing::{SealedAttribute, SealingService};
use crate::transport;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SealedEmailFolder {
    id: String,
    email_address_id: String,
    folder_name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    unseen_count: u64,
    #[serde(rename = "createdAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    custom_folder_name: Option<SealedAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailFolder {
    pub id: String,
    pub email_address_id: String,
    /// Service folder name (`INBOX`, `SENT`, ... or `CUSTOM`).
    pub folder_name: String,
    pub size: u64,
    pub unseen_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub custom_folder_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialEmailFolder {
    pub id: String,
    pub email_address_id: String,
    pub folder_name: String,
    pub size: u64,
    pub unseen_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unsealable for SealedEmailFolder {
    type Output = EmailFolder;
    type Partial = PartialEmailFolder;

    fn unseal(&self, sealing: &dyn SealingService) -> Result<EmailFolder> {
        let custom_folder_name = self
            .custom_folder_name
            .as_ref()
            .map(|name| name.unseal_string(sealing))
            .transpose()?;
        Ok(EmailFolder {
            id: self.id.clone(),
            email_address_id: self.email_address_id.clone(),
            folder_name: self.folder_name.clone(),
            size: self.size,
            unseen_count: self.unseen_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            custom_folder_name,
        })
    }

    fn to_partial(&self) -> PartialEmailFolder {
        PartialEmailFolder {
            id: self.id.clone(),
            email_address_id: self.email_address_id.clone(),
            folder_name: self.folder_name.clone(),
            size: self.size,
            unseen_count: self.unseen_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl EmailClient {
    fn seal_folder_name(&self, name: &str) -> Result<SealedAttribute> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EmailError::invalid_input("folder name must not be empty"));
        }
        let key_id = self.symmetric_keys.current_or_generate()?;
        Ok(SealedAttribute::seal_string(self.sealing.as_ref(), &key_id, name)?)
    }

    pub async fn create_custom_email_folder(&self, email_address_id: &str, name: &str) -> Result<EmailFolder> {
        let sealed_name = self.seal_folder_name(name)?;
        let folder: SealedEmailFolder = transport::mutate(
            self.transport.as_ref(),
            op::CREATE_CUSTOM_EMAIL_FOLDER,
            json!({ "input": { "emailAddressId": email_address_id, "customFolderName": sealed_name } }),
        )
        .await?;
        tracing::info!(email_address_id, folder_id = %folder.id, "created custom folder");
        folder.unseal(self.sealing.as_ref())
    }

    pub async fn update_custom_email_folder(
        &self,
        folder_id: &str,
        email_address_id: &str,
        name: &str,
    ) -> Result<EmailFolder> {
        let sealed_name = self.seal_folder_name(name)?;
        let folder: SealedEmailFolder = transport::mutate(
            self.transport.as_ref(),
            op::UPDATE_CUSTOM_EMAIL_FOLDER,
            json!({
                "input": {
                    "emailFolderId": folder_id,
                    "emailAddressId": email_address_id,
                    "values": { "customFolderName": sealed_name },
                }
            }),
        )
        .await?;
        folder.unseal(self.sealing.as_ref())
    }

    /// Returns the deleted folder, or `None` when it did not exist.
    pub async fn delete_custom_email_folder(
        &self,
        folder_id: &str,
        email_address_id: &str,
    ) -> Result<Option<EmailFolder>> {
        let folder: Option<SealedEmailFolder> = transport::mutate_optional(
            self.transport.as_ref(),
            op::DELETE_CUSTOM_EMAIL_FOLDER,
            json!({ "input": { "emailFolderId": folder_id, "emailAddressId": email_address_id } }),
        )
        .await?;
        folder.map(|f| f.unseal(self.sealing.as_ref())).transpose()
    }

    pub async fn list_email_folders_for_email_address_id(
        &self,
        email_address_id: &str,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<ListApiResult<EmailFolder, PartialEmailFolder>> {
        let page: Page<SealedEmailFolder> = transport::query(
            self.transport.as_ref(),
            op::LIST_EMAIL_FOLDERS_FOR_EMAIL_ADDRESS_ID,
            json!({ "input": { "emailAddressId": email_address_id, "limit": limit, "nextToken": next_token } }),
        )
        .await?;
        unseal_page(&page.items, self.sealing.as_ref(), page.next_token)
    }
}

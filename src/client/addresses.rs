//! Email address provisioning and the public key directory.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::EmailClient;
use crate::error::{EmailError, Result};
use crate::graphql::{op, Page};
use crate::list::{unseal_page, ListApiResult, Unsealable};
use crate::message::EmailAddress;
use crate::sealing::{SealedAttribute, SealingService};
use crate::secure_package::KEY_WRAP_ALGORITHM;
use crate::transport;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SealedEmailAddress {
    id: String,
    owner: String,
    email_address: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    number_of_email_messages: u64,
    #[serde(rename = "createdAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAtEpochMs", with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
    #[serde(default, rename = "lastReceivedAtEpochMs", with = "chrono::serde::ts_milliseconds_option")]
    last_received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    alias: Option<SealedAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionedEmailAddress {
    pub id: String,
    pub owner: String,
    pub email_address: String,
    pub size: u64,
    pub number_of_email_messages: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_received_at: Option<DateTime<Utc>>,
    pub alias: Option<String>,
}

/// A [`ProvisionedEmailAddress`] whose alias could not be unsealed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialProvisionedEmailAddress {
    pub id: String,
    pub owner: String,
    pub email_address: String,
    pub size: u64,
    pub number_of_email_messages: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_received_at: Option<DateTime<Utc>>,
}

impl Unsealable for SealedEmailAddress {
    type Output = ProvisionedEmailAddress;
    type Partial = PartialProvisionedEmailAddress;

    fn unseal(&self, sealing: &dyn SealingService) -> Result<ProvisionedEmailAddress> {
        let alias = self.alias.as_ref().map(|a| a.unseal_string(sealing)).transpose()?;
        Ok(ProvisionedEmailAddress {
            id: self.id.clone(),
            owner: self.owner.clone(),
            email_address: self.email_address.clone(),
            size: self.size,
            number_of_email_messages: self.number_of_email_messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_received_at: self.last_received_at,
            alias,
        })
    }

    fn to_partial(&self) -> PartialProvisionedEmailAddress {
        PartialProvisionedEmailAddress {
            id: self.id.clone(),
            owner: self.owner.clone(),
            email_address: self.email_address.clone(),
            size: self.size,
            number_of_email_messages: self.number_of_email_messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_received_at: self.last_received_at,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProvisionEmailAddressInput {
    pub email_address: String,
    pub alias: Option<String>,
}

impl EmailClient {
    /// Provision `input.email_address`, publishing the local key pair so
    /// in-network senders can encrypt to it.
    pub async fn provision_email_address(&self, input: &ProvisionEmailAddressInput) -> Result<ProvisionedEmailAddress> {
        let address = EmailAddress::new(input.email_address.trim())?;
        let key_pair_id = self.key_pairs.current_or_generate()?;
        let public_key = self
            .keys
            .public_key(&key_pair_id)?
            .ok_or_else(|| EmailError::failed(format!("key pair {} has no public key", key_pair_id)))?;

        let alias = match input.alias.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(alias) => {
                let key_id = self.symmetric_keys.current_or_generate()?;
                Some(SealedAttribute::seal_string(self.sealing.as_ref(), &key_id, alias)?)
            }
            None => None,
        };

        let sealed: SealedEmailAddress = transport::mutate(
            self.transport.as_ref(),
            op::PROVISION_EMAIL_ADDRESS,
            json!({
                "input": {
                    "emailAddress": address.normalized(),
                    "key": {
                        "keyId": key_pair_id.as_str(),
                        "publicKey": B64.encode(&public_key),
                        "algorithm": KEY_WRAP_ALGORITHM,
                    },
                    "alias": alias,
                }
            }),
        )
        .await?;
        tracing::info!(email_address_id = %sealed.id, key_id = %key_pair_id, "provisioned email address");
        sealed.unseal(self.sealing.as_ref())
    }

    pub async fn deprovision_email_address(&self, id: &str) -> Result<ProvisionedEmailAddress> {
        let sealed: SealedEmailAddress = transport::mutate(
            self.transport.as_ref(),
            op::DEPROVISION_EMAIL_ADDRESS,
            json!({ "input": { "emailAddressId": id } }),
        )
        .await?;
        tracing::info!(email_address_id = id, "deprovisioned email address");
        sealed.unseal(self.sealing.as_ref())
    }

    pub async fn get_email_address(&self, id: &str) -> Result<Option<ProvisionedEmailAddress>> {
        let sealed: Option<SealedEmailAddress> =
            transport::query_optional(self.transport.as_ref(), op::GET_EMAIL_ADDRESS, json!({ "id": id })).await?;
        sealed.map(|a| a.unseal(self.sealing.as_ref())).transpose()
    }

    pub async fn list_email_addresses(
        &self,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<ListApiResult<ProvisionedEmailAddress, PartialProvisionedEmailAddress>> {
        let page: Page<SealedEmailAddress> = transport::query(
            self.transport.as_ref(),
            op::LIST_EMAIL_ADDRESSES,
            json!({ "input": { "limit": limit, "nextToken": next_token } }),
        )
        .await?;
        unseal_page(&page.items, self.sealing.as_ref(), page.next_token)
    }
}

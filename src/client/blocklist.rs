//! Per-owner address blocklist.
//!
//! The service only ever sees a deterministic hash of each blocked address
//! (for matching inbound mail) and a sealed copy of the address (for
//! listing). Results are reconciled on the hashes and reported back in
//! terms of the addresses the caller supplied.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::EmailClient;
use crate::batch::{reconcile, BatchOperationResult, RemoteBatch};
use crate::error::{EmailError, Result};
use crate::graphql::{op, BlocklistBatchResponse};
use crate::list::{unseal_page, ListApiResult, Unsealable};
use crate::message::address::normalize_address;
use crate::message::EmailAddress;
use crate::sealing::{hash_blocked_value, SealedAttribute, SealingService};
use crate::transport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockedAddressAction {
    #[default]
    Drop,
    Spam,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SealedBlockedAddress {
    hashed_blocked_value: String,
    sealed_value: SealedAttribute,
    #[serde(default)]
    action: BlockedAddressAction,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlocklistResponse {
    #[serde(default)]
    sealed_blocked_addresses: Vec<SealedBlockedAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsealedBlockedAddress {
    pub hashed_value: String,
    pub address: String,
    pub action: BlockedAddressAction,
}

/// A blocklist entry whose address could not be unsealed. It can still be
/// removed with [`EmailClient::unblock_email_addresses_by_hashed_value`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialBlockedAddress {
    pub hashed_value: String,
    pub action: BlockedAddressAction,
}

impl Unsealable for SealedBlockedAddress {
    type Output = UnsealedBlockedAddress;
    type Partial = PartialBlockedAddress;

    fn unseal(&self, sealing: &dyn SealingService) -> Result<UnsealedBlockedAddress> {
        Ok(UnsealedBlockedAddress {
            hashed_value: self.hashed_blocked_value.clone(),
            address: self.sealed_value.unseal_string(sealing)?,
            action: self.action,
        })
    }

    fn to_partial(&self) -> PartialBlockedAddress {
        PartialBlockedAddress {
            hashed_value: self.hashed_blocked_value.clone(),
            action: self.action,
        }
    }
}

/// Reject empty input, unparseable addresses and case-insensitive duplicates.
/// Returns the normalized addresses in input order.
fn validate_addresses(addresses: &[String]) -> Result<Vec<String>> {
    if addresses.is_empty() {
        return Err(EmailError::invalid_input("no addresses supplied"));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(addresses.len());
    for raw in addresses {
        EmailAddress::parse(raw)?;
        let normalized = normalize_address(raw);
        if !seen.insert(normalized.clone()) {
            return Err(EmailError::invalid_input("duplicate address in blocklist request"));
        }
        out.push(normalized);
    }
    Ok(out)
}

fn reconcile_hashes(requested: &[String], response: BlocklistBatchResponse) -> BatchOperationResult<String, String> {
    reconcile(
        requested,
        RemoteBatch {
            status: response.status,
            success: response.success_addresses,
            failure: response.failed_addresses,
            error: None,
        },
        |id| id.to_string(),
        |id, _| id.to_string(),
    )
}

impl EmailClient {
    pub async fn block_email_addresses(&self, addresses: &[String]) -> Result<BatchOperationResult<String, String>> {
        let normalized = validate_addresses(addresses)?;
        let key_id = self.symmetric_keys.current_or_generate()?;

        let mut by_hash = HashMap::with_capacity(normalized.len());
        let mut hashes = Vec::with_capacity(normalized.len());
        let mut entries = Vec::with_capacity(normalized.len());
        for (raw, address) in addresses.iter().zip(&normalized) {
            let hashed = hash_blocked_value(&self.owner_id, address);
            let sealed = SealedAttribute::seal_string(self.sealing.as_ref(), &key_id, address)?;
            entries.push(json!({ "hashedBlockedValue": hashed, "sealedValue": sealed }));
            by_hash.insert(hashed.clone(), raw.clone());
            hashes.push(hashed);
        }

        let response: BlocklistBatchResponse = transport::mutate(
            self.transport.as_ref(),
            op::BLOCK_EMAIL_ADDRESSES,
            json!({ "input": { "owner": self.owner_id, "blockedAddresses": entries } }),
        )
        .await?;
        let result = reconcile_hashes(&hashes, response);
        tracing::info!(
            blocked = result.success_values().len(),
            failed = result.failure_values().len(),
            "block email addresses"
        );
        Ok(map_back(result, &by_hash))
    }

    pub async fn unblock_email_addresses(&self, addresses: &[String]) -> Result<BatchOperationResult<String, String>> {
        let normalized = validate_addresses(addresses)?;
        let mut by_hash = HashMap::with_capacity(normalized.len());
        let hashes: Vec<String> = addresses
            .iter()
            .zip(&normalized)
            .map(|(raw, address)| {
                let hashed = hash_blocked_value(&self.owner_id, address);
                by_hash.insert(hashed.clone(), raw.clone());
                hashed
            })
            .collect();

        let result = self.unblock_hashes(&hashes).await?;
        Ok(map_back(result, &by_hash))
    }

    /// Remove entries by the hashed values reported in the blocklist.
    pub async fn unblock_email_addresses_by_hashed_value(
        &self,
        hashed_values: &[String],
    ) -> Result<BatchOperationResult<String, String>> {
        if hashed_values.is_empty() {
            return Err(EmailError::invalid_input("no hashed values supplied"));
        }
        let mut seen = HashSet::new();
        if !hashed_values.iter().all(|h| seen.insert(h.as_str())) {
            return Err(EmailError::invalid_input("duplicate hashed value in blocklist request"));
        }
        self.unblock_hashes(hashed_values).await
    }

    async fn unblock_hashes(&self, hashes: &[String]) -> Result<BatchOperationResult<String, String>> {
        let response: BlocklistBatchResponse = transport::mutate(
            self.transport.as_ref(),
            op::UNBLOCK_EMAIL_ADDRESSES,
            json!({ "input": { "owner": self.owner_id, "unblockedAddresses": hashes } }),
        )
        .await?;
        let result = reconcile_hashes(hashes, response);
        tracing::info!(
            unblocked = result.success_values().len(),
            failed = result.failure_values().len(),
            "unblock email addresses"
        );
        Ok(result)
    }

    pub async fn get_email_address_blocklist(
        &self,
    ) -> Result<ListApiResult<UnsealedBlockedAddress, PartialBlockedAddress>> {
        let response: BlocklistResponse = transport::query(
            self.transport.as_ref(),
            op::GET_EMAIL_ADDRESS_BLOCKLIST,
            json!({ "input": { "owner": self.owner_id } }),
        )
        .await?;
        unseal_page(&response.sealed_blocked_addresses, self.sealing.as_ref(), None)
    }
}

fn map_back(
    result: BatchOperationResult<String, String>,
    by_hash: &HashMap<String, String>,
) -> BatchOperationResult<String, String> {
    let lookup = |h: String| by_hash.get(&h).cloned().unwrap_or(h);
    result.map(lookup, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_addresses_differing_in_case_are_rejected() {
        let err = validate_addresses(&strings(&["a@sudo.com", "A@Sudo.com"])).unwrap_err();
        assert!(matches!(err, EmailError::InvalidInput(_)));
    }

    #[test]
    fn invalid_and_empty_inputs_are_rejected() {
        assert!(matches!(validate_addresses(&[]), Err(EmailError::InvalidInput(_))));
        assert!(matches!(
            validate_addresses(&strings(&["not-an-address"])),
            Err(EmailError::InvalidInput(_))
        ));
    }

    #[test]
    fn display_names_are_stripped() {
        let out = validate_addresses(&strings(&["Bob <Bob@Sudo.com>", "c@sudo.com"])).unwrap();
        assert_eq!(out, strings(&["bob@sudo.com", "c@sudo.com"]));
    }
}

//! # Sudo Email
//!
//! Client core for an end-to-end encrypted email service.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sudo_email::{EmailClient, InMemoryObjectStore};
//!
//! let client = EmailClient::builder(transport, Arc::new(InMemoryObjectStore::new()), "owner-1").build()?;
//! let draft_id = client.create_draft_email_message(&rfc822, &email_address_id).await?;
//! let sent = client.send_email_message(&rfc822, &email_address_id).await?;
//! ```
//!
//! ## What happens to an outgoing message
//!
//! - Messages whose participants are all in service-hosted domains are
//!   encrypted end-to-end: a one-time key encrypts the RFC 822 bytes and is
//!   wrapped once per recipient key pair (a *secure package*).
//! - Anything else goes out as plain RFC 822 under transport encryption.
//! - An in-network participant without a published key is an error, never a
//!   silent downgrade.
//! - Drafts are additionally sealed with the account's current symmetric key
//!   before they reach object storage.
//!
//! ## Partial results
//!
//! Bulk operations return a [`BatchOperationResult`]; every requested id is
//! reported exactly once. List operations return a [`ListApiResult`]; an item
//! that fails to unseal is reported in its partial form instead of failing
//! the page.

#![deny(unsafe_code)]

pub mod batch;
pub mod client;
pub mod config;
pub mod email_crypto;
pub mod error;
pub mod graphql;
pub mod list;
pub mod logging;
pub mod message;
pub mod network;
pub mod object_store;
pub mod sealing;
pub mod secure_package;
pub mod transport;

pub use batch::{BatchOperationResult, BatchOperationStatus, EmailMessageOperationFailureResult};
pub use client::{EmailClient, EmailClientBuilder};
pub use config::{ClientConfig, EmailConfig};
pub use email_crypto::{DefaultEmailCryptoService, EmailAddressPublicInfo, EmailCryptoService};
pub use error::{EmailError, Result, SealingError, MALFORMED_SECURE_PACKAGE_MSG};
pub use graphql::SendEmailMessageResult;
pub use list::{ListApiResult, PartialResult};
pub use logging::LogFormat;
pub use message::{EmailAddress, EmailAttachment, MimeCodec, Rfc822Codec, SimplifiedEmailMessage};
pub use network::{ConfiguredDomains, NetworkClass};
pub use object_store::{InMemoryObjectStore, ObjectStore, StorageError};
pub use sealing::{DefaultSealingService, SealedAttribute, SealingService};
pub use secure_package::SecurePackage;
pub use transport::{GraphqlError, GraphqlTransport, TransportError};

pub use sudo_keymanager;

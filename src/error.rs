//! Error types for the email client.
//!
//! Callers only ever see [`EmailError`]. Collaborator errors (transport,
//! object storage, key manager) are classified into it at the boundary, and a
//! collaborator cancellation always becomes [`EmailError::Cancelled`].

use sudo_keymanager::KeyManagerError;

use crate::object_store::StorageError;
use crate::transport::TransportError;

/// Message carried by [`EmailError::Failed`] when a key exchange attachment
/// arrives without its body attachment.
pub const MALFORMED_SECURE_PACKAGE_MSG: &str =
    "Malformed secure package: key exchange attachment present without a body attachment";

/// Failure to unseal a sealed value or decrypt a secure package.
#[derive(Debug, thiserror::Error)]
pub enum SealingError {
    #[error("sealed payload too short: {len} bytes, need at least {min}")]
    PayloadTooShort { len: usize, min: usize },

    #[error("unsupported sealing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported sealed frame version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("invalid sealed data encoding: {0}")]
    InvalidEncoding(String),

    #[error("plain text type mismatch: expected {expected}, found {found}")]
    PlainTextTypeMismatch { expected: String, found: String },

    #[error("unseal failed")]
    Decrypt,

    #[error("sealing key not found: {0}")]
    KeyNotFound(String),

    #[error("key manager: {0}")]
    KeyManager(String),
}

impl From<KeyManagerError> for SealingError {
    fn from(e: KeyManagerError) -> Self {
        match e {
            KeyManagerError::KeyNotFound(id) => SealingError::KeyNotFound(id.to_string()),
            KeyManagerError::Decrypt => SealingError::Decrypt,
            other => SealingError::KeyManager(other.to_string()),
        }
    }
}

/// Every failure an email client operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// Malformed, duplicate or empty request data. Raised before any I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Recipient count, batch size or message size over a configured ceiling.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("email address not found")]
    AddressNotFound,

    #[error("email message not found")]
    EmailMessageNotFound,

    #[error("draft not found: {0}")]
    DraftNotFound(String),

    /// A participant in a hosted domain has no published public key.
    #[error("in-network address not found: {0}")]
    InNetworkAddressNotFound(String),

    #[error("unauthorized address")]
    Unauthorized,

    /// Disallowed attachment type or unacceptable message content.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// A sealed value or secure package could not be opened: missing key,
    /// wrong key, tampered or malformed data.
    #[error("unsealing failed: {0}")]
    Unsealing(SealingError),

    #[error("failed: {0}")]
    Failed(String),

    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EmailError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EmailError::Cancelled)
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        EmailError::Failed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        EmailError::InvalidInput(msg.into())
    }
}

impl From<SealingError> for EmailError {
    fn from(e: SealingError) -> Self {
        match e {
            SealingError::KeyManager(msg) => EmailError::Failed(format!("key manager: {}", msg)),
            other => EmailError::Unsealing(other),
        }
    }
}

/// Only a missing key or a failed decryption is an unsealing failure. Store,
/// random source and generation failures fail the operation.
impl From<KeyManagerError> for EmailError {
    fn from(e: KeyManagerError) -> Self {
        match e {
            KeyManagerError::KeyNotFound(_) | KeyManagerError::Decrypt => {
                EmailError::Unsealing(SealingError::from(e))
            }
            other => EmailError::Failed(other.to_string()),
        }
    }
}

impl From<StorageError> for EmailError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled => EmailError::Cancelled,
            StorageError::NotFound(_) => EmailError::EmailMessageNotFound,
            StorageError::Other(msg) => EmailError::Failed(msg),
        }
    }
}

impl From<TransportError> for EmailError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => EmailError::Cancelled,
            TransportError::Http { status: 403, .. } => EmailError::Unauthorized,
            TransportError::Http { status, message } => {
                EmailError::Unknown(format!("http {}: {}", status, message))
            }
            TransportError::Graphql(errors) => match errors.first() {
                Some(first) => classify_graphql_error(first.error_type.as_deref(), &first.message),
                None => EmailError::Unknown("empty graphql error list".into()),
            },
            TransportError::Other(msg) => EmailError::Unknown(msg),
        }
    }
}

/// Map a remote `errorType` to the closest domain error.
///
/// Remote error types are namespaced (`sudoplatform.email.AddressNotFound`);
/// only the final segment is matched.
pub(crate) fn classify_graphql_error(error_type: Option<&str>, message: &str) -> EmailError {
    let kind = error_type
        .map(|t| t.rsplit('.').next().unwrap_or(t))
        .unwrap_or_default();
    match kind {
        "AddressNotFound" => EmailError::AddressNotFound,
        "UnauthorizedAddress" => EmailError::Unauthorized,
        "InvalidArgument" | "InvalidEmailContents" => EmailError::InvalidInput(message.to_string()),
        "LimitExceededError" => EmailError::LimitExceeded(message.to_string()),
        "InNetworkAddressNotFound" => EmailError::InNetworkAddressNotFound(message.to_string()),
        "EmailMessageNotFound" => EmailError::EmailMessageNotFound,
        "MessageSizeLimitExceeded" => EmailError::LimitExceeded(message.to_string()),
        _ => EmailError::Unknown(format!("{}: {}", kind, message)),
    }
}

pub type Result<T> = std::result::Result<T, EmailError>;

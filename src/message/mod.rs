//! Message model and RFC 822 composition.

pub mod address;
pub mod attachment;
pub mod mime;

pub use address::EmailAddress;
pub use attachment::{EmailAttachment, SecureRole};
pub use mime::{MimeCodec, Rfc822Codec};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header marking a message whose body travels as a secure package.
pub const ENCRYPTION_HEADER: &str = "X-Sudoplatform-Encryption";
pub const ENCRYPTION_HEADER_VALUE: &str = "sudoplatform";

/// The parts of an RFC 822 message the client reasons about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifiedEmailMessage {
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub subject: Option<String>,
    pub body: String,
    pub is_html: bool,
    pub attachments: Vec<EmailAttachment>,
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    /// Whether the message carries the encryption header.
    pub encrypted: bool,
}

impl SimplifiedEmailMessage {
    /// to, cc and bcc, in that order.
    pub fn recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Recipients and senders, in that order.
    pub fn participants(&self) -> impl Iterator<Item = &EmailAddress> {
        self.recipients().chain(self.from.iter())
    }

    pub fn key_exchange_attachments(&self) -> impl Iterator<Item = &EmailAttachment> {
        self.attachments.iter().filter(|a| a.is_key_exchange())
    }

    pub fn body_attachment(&self) -> Option<&EmailAttachment> {
        self.attachments.iter().find(|a| a.is_secure_body())
    }

    pub fn has_key_exchange(&self) -> bool {
        self.key_exchange_attachments().next().is_some()
    }

    /// Both reserved roles are present.
    pub fn is_secure_package(&self) -> bool {
        self.has_key_exchange() && self.body_attachment().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    #[test]
    fn participants_order() {
        let msg = SimplifiedEmailMessage {
            from: vec![addr("me@sudo.com")],
            to: vec![addr("a@x.com")],
            cc: vec![addr("b@x.com")],
            bcc: vec![addr("c@x.com")],
            ..Default::default()
        };
        let all: Vec<&str> = msg.participants().map(|a| a.address.as_str()).collect();
        assert_eq!(all, vec!["a@x.com", "b@x.com", "c@x.com", "me@sudo.com"]);
        assert_eq!(msg.recipient_count(), 3);
    }

    #[test]
    fn secure_package_detection() {
        let mut msg = SimplifiedEmailMessage::default();
        assert!(!msg.is_secure_package());
        msg.attachments.push(EmailAttachment::key_exchange(vec![1]));
        assert!(msg.has_key_exchange());
        assert!(!msg.is_secure_package());
        msg.attachments.push(EmailAttachment::secure_body(vec![2]));
        assert!(msg.is_secure_package());
    }
}

//! Email addresses: parsing, display and normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EmailError, Result};

/// A mailbox, optionally with a display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl EmailAddress {
    /// A bare address without display name. The address is validated.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        validate(&address)?;
        Ok(Self {
            address,
            display_name: None,
        })
    }

    /// Control characters in `name` become spaces, so a name can never end
    /// the header line it is written into.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = sanitize_display_name(&name.into());
        self.display_name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    /// Parse `Name <local@domain>`, `"Quoted, Name" <local@domain>`,
    /// `<local@domain>` or `local@domain`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        match (input.rfind('<'), input.ends_with('>')) {
            (Some(open), true) => {
                let address = input[open + 1..input.len() - 1].trim();
                let name = input[..open].trim().trim_matches('"').trim();
                Ok(Self::new(address)?.with_display_name(name))
            }
            _ => Self::new(input),
        }
    }

    /// Lower-cased domain part.
    pub fn domain(&self) -> String {
        self.address
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn normalized(&self) -> String {
        self.address.trim().to_lowercase()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) if name.contains([',', '"', '<', '>', '@', ';', ':']) => {
                write!(f, "\"{}\" <{}>", name.replace('"', "'"), self.address)
            }
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

fn validate(address: &str) -> Result<()> {
    let invalid = || EmailError::invalid_input(format!("invalid email address: {:?}", address));
    let (local, domain) = address.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || address.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
    {
        return Err(invalid());
    }
    Ok(())
}

pub(crate) fn sanitize_display_name(name: &str) -> String {
    name.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

/// Normalize a raw address string for comparison: display name stripped,
/// trimmed and lower-cased. Unparseable input is only trimmed and lower-cased.
pub fn normalize_address(input: &str) -> String {
    EmailAddress::parse(input)
        .map(|a| a.normalized())
        .unwrap_or_else(|_| input.trim().to_lowercase())
}

/// Split a header value on commas that are outside quotes and angle brackets.
pub fn split_address_list(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// Parse an address list header. Any entry that is not an address fails the
/// whole list, so no recipient can escape counting or classification.
pub fn parse_address_list(value: &str) -> Result<Vec<EmailAddress>> {
    split_address_list(value)
        .iter()
        .map(|entry| EmailAddress::parse(entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        let a = EmailAddress::parse("Alice Smith <alice@example.com>").unwrap();
        assert_eq!(a.address, "alice@example.com");
        assert_eq!(a.display_name.as_deref(), Some("Alice Smith"));

        let b = EmailAddress::parse("\"Smith, Bob\" <bob@example.com>").unwrap();
        assert_eq!(b.display_name.as_deref(), Some("Smith, Bob"));

        let c = EmailAddress::parse("<carol@example.com>").unwrap();
        assert!(c.display_name.is_none());

        let d = EmailAddress::parse(" dave@Example.COM ").unwrap();
        assert_eq!(d.domain(), "example.com");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "no-at-sign", "@example.com", "a@", "a@nodot", "a b@example.com", "a@.com"] {
            assert!(EmailAddress::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let a = EmailAddress::new("x@example.com").unwrap().with_display_name("Smith, X");
        let shown = a.to_string();
        assert_eq!(shown, "\"Smith, X\" <x@example.com>");
        assert_eq!(EmailAddress::parse(&shown).unwrap(), a);
    }

    #[test]
    fn list_splitting_respects_quotes() {
        let list = parse_address_list("\"Doe, Jane\" <jane@example.com>, bob@example.com").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name.as_deref(), Some("Doe, Jane"));
        assert_eq!(list[1].address, "bob@example.com");
    }

    #[test]
    fn list_with_unparseable_entry_is_rejected() {
        for header in ["bob@example.com, junk", "you@sudo.com, \"Bad\" <not an address>, @@@"] {
            assert!(matches!(parse_address_list(header), Err(EmailError::InvalidInput(_))));
        }
    }

    #[test]
    fn display_name_control_characters_are_neutralized() {
        let a = EmailAddress::new("eve@example.com")
            .unwrap()
            .with_display_name("Eve\r\nBcc: spy@evil.com");
        assert_eq!(a.display_name.as_deref(), Some("Eve  Bcc: spy@evil.com"));
        assert!(!a.to_string().contains('\n'));
        assert!(EmailAddress::new("x@example.com").unwrap().with_display_name("\r\n").display_name.is_none());
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_address("Spam <Spam@Example.com>"), "spam@example.com");
        assert_eq!(normalize_address("  NOT AN ADDRESS "), "not an address");
    }
}

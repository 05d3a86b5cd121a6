//! In-network classification.
//!
//! A participant is in-network when its domain is one of the domains the
//! service hosts. A message is in-network only when every participant is.

use std::collections::HashSet;

use crate::message::{EmailAddress, SimplifiedEmailMessage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkClass {
    /// Every participant is hosted by the service.
    InNetwork,
    /// At least one participant is external; carries those addresses.
    OutOfNetwork(Vec<String>),
}

/// Set of service-hosted domains, compared case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredDomains {
    domains: HashSet<String>,
}

impl ConfiguredDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_start_matches('@').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn is_in_network(&self, address: &EmailAddress) -> bool {
        self.domains.contains(&address.domain())
    }

    /// Classify recipients and senders of `message`.
    pub fn classify(&self, message: &SimplifiedEmailMessage) -> NetworkClass {
        let external: Vec<String> = message
            .participants()
            .filter(|a| !self.is_in_network(a))
            .map(|a| a.address.clone())
            .collect();
        if external.is_empty() {
            NetworkClass::InNetwork
        } else {
            NetworkClass::OutOfNetwork(external)
        }
    }
}

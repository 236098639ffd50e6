//! Mechanism contract: the logic that turns one accepted requirement plus
//! a signer into a signed payment payload, registered under a
//! scheme+network pattern.

use async_trait::async_trait;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use url::Url;

use crate::signer::{ClientSigner, SigningError};
use crate::types::{Network, PaymentPayload, PaymentRequirements, Scheme};

/// A `scheme:network` registration pattern. The network part may be the
/// bare wildcard `*` or a `prefix:*` wildcard matching any network under
/// that prefix (e.g. `upto:tron:*` matches `tron:nile` and `tron:shasta`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MechanismPattern {
    scheme: Scheme,
    network: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid mechanism pattern '{0}': expected scheme:network")]
pub struct PatternParseError(String);

impl MechanismPattern {
    pub fn new(scheme: impl Into<Scheme>, network: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            network: network.into(),
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Case-sensitive match against a concrete scheme+network.
    pub fn matches(&self, scheme: &Scheme, network: &Network) -> bool {
        if &self.scheme != scheme {
            return false;
        }
        if self.network == network.as_str() || self.network == "*" {
            return true;
        }
        if let Some(prefix) = self.network.strip_suffix('*') {
            return network.as_str().starts_with(prefix);
        }
        false
    }

    /// Exact network patterns rank above wildcard ones; among wildcards,
    /// a longer prefix is more specific than a shorter one.
    pub fn specificity(&self) -> usize {
        if self.network.ends_with('*') {
            self.network.len()
        } else {
            usize::MAX
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.network.ends_with('*')
    }
}

impl Display for MechanismPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.network)
    }
}

impl FromStr for MechanismPattern {
    type Err = PatternParseError;

    /// Splits on the first `:` — everything after it is the network
    /// pattern, which may itself contain colons (`upto:tron:nile`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, network) = s
            .split_once(':')
            .ok_or_else(|| PatternParseError(s.to_string()))?;
        if scheme.is_empty() || network.is_empty() {
            return Err(PatternParseError(s.to_string()));
        }
        Ok(MechanismPattern::new(scheme, network))
    }
}

/// Payload-construction logic for one payment scheme family.
///
/// Mechanisms are stateless with respect to requests; the signer bound at
/// registration time carries any per-wallet state.
#[async_trait]
pub trait ClientMechanism: Send + Sync {
    /// Build a signed payment payload for the selected requirement.
    ///
    /// `resource` is the URL being paid for; `extensions` is the
    /// server's top-level extension object from the 402 challenge.
    async fn build(
        &self,
        requirements: &PaymentRequirements,
        signer: &dyn ClientSigner,
        resource: &Url,
        extensions: Option<&serde_json::Value>,
    ) -> Result<PaymentPayload, SigningError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> MechanismPattern {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let p = pattern("upto:tron:nile");
        assert_eq!(p.scheme().as_str(), "upto");
        assert!(p.matches(&"upto".into(), &"tron:nile".into()));
        assert!(!p.matches(&"upto".into(), &"tron:shasta".into()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("noseparator".parse::<MechanismPattern>().is_err());
        assert!(":nile".parse::<MechanismPattern>().is_err());
        assert!("upto:".parse::<MechanismPattern>().is_err());
    }

    #[test]
    fn test_bare_wildcard_matches_any_network() {
        let p = pattern("upto:*");
        assert!(p.matches(&"upto".into(), &"tron:nile".into()));
        assert!(p.matches(&"upto".into(), &"eip155:8453".into()));
        assert!(!p.matches(&"exact".into(), &"tron:nile".into()));
    }

    #[test]
    fn test_prefix_wildcard() {
        let p = pattern("upto:tron:*");
        assert!(p.matches(&"upto".into(), &"tron:nile".into()));
        assert!(p.matches(&"upto".into(), &"tron:shasta".into()));
        assert!(!p.matches(&"upto".into(), &"eip155:8453".into()));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let p = pattern("upto:tron:nile");
        assert!(!p.matches(&"Upto".into(), &"tron:nile".into()));
        assert!(!p.matches(&"upto".into(), &"Tron:Nile".into()));
    }

    #[test]
    fn test_specificity_ordering() {
        let exact = pattern("upto:tron:nile");
        let prefixed = pattern("upto:tron:*");
        let bare = pattern("upto:*");
        assert!(exact.specificity() > prefixed.specificity());
        assert!(prefixed.specificity() > bare.specificity());
        assert!(!exact.is_wildcard());
        assert!(bare.is_wildcard());
    }
}

//! Mechanism registry and payment negotiation.
//!
//! [`X402Client`] owns the registered mechanisms and the policy chain.
//! Both are configured up front and treated as read-only while a
//! negotiation is in flight; registering during an in-flight negotiation
//! is undefined and the borrow checker rules it out for safe callers
//! (registration takes `&mut self`).

use std::sync::Arc;
use url::Url;

use crate::mechanism::{ClientMechanism, MechanismPattern};
use crate::policy::PaymentPolicy;
use crate::signer::{ClientSigner, SignerResolver, SigningError};
use crate::types::{Network, PaymentPayload, PaymentRequirements, Scheme};

/// Negotiation failure. These are terminal for the request — never
/// retried internally.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("All payment requirements were filtered out by policies")]
    NoAffordableRequirement,
    #[error("No registered mechanism matches any advertised requirement")]
    NoMechanism,
    #[error("Failed to construct payment payload: {0}")]
    Construction(#[source] SigningError),
}

/// Custom requirement selector, consulted only when no policies are
/// registered. Receives the full advertised list; returning `None`
/// surfaces [`PaymentError::NoAffordableRequirement`].
pub type RequirementsSelector =
    dyn Fn(&[PaymentRequirements]) -> Option<PaymentRequirements> + Send + Sync;

struct MechanismEntry {
    pattern: MechanismPattern,
    mechanism: Arc<dyn ClientMechanism>,
    signer: Arc<dyn ClientSigner>,
}

/// The payment-negotiation engine: registered mechanisms plus the policy
/// pipeline, orchestrating requirement selection and payload construction.
#[derive(Default)]
pub struct X402Client {
    /// Kept sorted most-specific first; advertised requirement order is
    /// never re-sorted here, only the mechanism table is.
    mechanisms: Vec<MechanismEntry>,
    policies: Vec<Box<dyn PaymentPolicy>>,
}

impl X402Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mechanism and its signer under a `scheme:network`
    /// pattern. Re-registering the same pattern replaces the previous
    /// entry (last-write-wins).
    pub fn register(
        &mut self,
        pattern: MechanismPattern,
        mechanism: Arc<dyn ClientMechanism>,
        signer: Arc<dyn ClientSigner>,
    ) -> &mut Self {
        tracing::debug!(pattern = %pattern, "registering payment mechanism");
        if let Some(existing) = self.mechanisms.iter_mut().find(|e| e.pattern == pattern) {
            existing.mechanism = mechanism;
            existing.signer = signer;
        } else {
            self.mechanisms.push(MechanismEntry {
                pattern,
                mechanism,
                signer,
            });
            self.mechanisms
                .sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));
        }
        self
    }

    /// Append a policy to the pipeline. Policies run in registration
    /// order, each receiving the previous output.
    pub fn register_policy(&mut self, policy: impl PaymentPolicy + 'static) -> &mut Self {
        self.policies.push(Box::new(policy));
        self
    }

    /// The mechanism whose pattern matches `scheme:network`, exact
    /// network match preferred over wildcard. Case-sensitive.
    pub fn find_mechanism(
        &self,
        scheme: &Scheme,
        network: &Network,
    ) -> Option<Arc<dyn ClientMechanism>> {
        self.find_entry(scheme, network)
            .map(|entry| entry.mechanism.clone())
    }

    fn find_entry(&self, scheme: &Scheme, network: &Network) -> Option<&MechanismEntry> {
        // Sorted most-specific first at registration time.
        self.mechanisms
            .iter()
            .find(|entry| entry.pattern.matches(scheme, network))
    }

    /// Negotiate one payment for a 402 challenge: run the policy
    /// pipeline (or the custom selector when no policies are
    /// registered), match the survivors against registered mechanisms in
    /// advertised order, and have the winning mechanism build a signed
    /// payload. Exactly one payload is produced per successful call.
    pub async fn handle_payment(
        &self,
        accepts: &[PaymentRequirements],
        resource: &Url,
        extensions: Option<&serde_json::Value>,
        selector: Option<&RequirementsSelector>,
    ) -> Result<PaymentPayload, PaymentError> {
        tracing::debug!(candidates = accepts.len(), resource = %resource, "negotiating payment");

        let candidates = if self.policies.is_empty() {
            if let Some(selector) = selector {
                vec![selector(accepts).ok_or(PaymentError::NoAffordableRequirement)?]
            } else {
                accepts.to_vec()
            }
        } else {
            // Registered policies take precedence over a custom selector.
            let mut candidates = accepts.to_vec();
            for policy in &self.policies {
                candidates = policy.apply(candidates, self).await;
            }
            candidates
        };

        if candidates.is_empty() {
            return Err(PaymentError::NoAffordableRequirement);
        }

        let (selected, entry) = candidates
            .iter()
            .find_map(|req| {
                self.find_entry(&req.scheme, &req.network)
                    .map(|entry| (req, entry))
            })
            .ok_or(PaymentError::NoMechanism)?;

        tracing::info!(
            scheme = %selected.scheme,
            network = %selected.network,
            asset = %selected.asset,
            amount = %selected.amount,
            "selected payment requirement"
        );

        entry
            .mechanism
            .build(selected, entry.signer.as_ref(), resource, extensions)
            .await
            .map_err(PaymentError::Construction)
    }
}

impl SignerResolver for X402Client {
    fn resolve(&self, scheme: &Scheme, network: &Network) -> Option<Arc<dyn ClientSigner>> {
        self.find_entry(scheme, network)
            .map(|entry| entry.signer.clone())
    }
}

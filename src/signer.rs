//! Capability boundary to the signing backend.
//!
//! The negotiation core never touches key material. A [`ClientSigner`]
//! wraps whatever provider a chain family needs (a local key, a remote
//! wallet service) and exposes just the three operations the client
//! requires: address, balance query, and payload signing.

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{Network, PaymentPayload, PaymentRequirements, Scheme, TokenAmount};

/// Balance/network query failure. Recovered fail-open inside the balance
/// policy; never surfaced from it.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(String),
    #[error("Asset {asset} is not supported on {network}")]
    UnsupportedAsset { asset: String, network: Network },
}

/// Failure while constructing or signing a payment payload.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Failed to get system clock: {0}")]
    Clock(#[source] std::time::SystemTimeError),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Missing required extension: {0}")]
    MissingExtension(&'static str),
    #[error("Provider error while preparing payment: {0}")]
    Provider(#[from] ProviderError),
}

/// One signing backend for one network family.
#[async_trait]
pub trait ClientSigner: Send + Sync {
    /// The payer address this signer controls, in the network's native format.
    fn address(&self) -> String;

    /// Current balance of `asset` held by [`ClientSigner::address`] on `network`,
    /// in base units.
    async fn check_balance(
        &self,
        asset: &str,
        network: &Network,
    ) -> Result<TokenAmount, ProviderError>;

    /// Produce a signed payment payload satisfying `requirements`.
    async fn sign(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, SigningError>;
}

#[async_trait]
impl<S: ClientSigner + ?Sized> ClientSigner for Arc<S> {
    fn address(&self) -> String {
        self.as_ref().address()
    }

    async fn check_balance(
        &self,
        asset: &str,
        network: &Network,
    ) -> Result<TokenAmount, ProviderError> {
        self.as_ref().check_balance(asset, network).await
    }

    async fn sign(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, SigningError> {
        self.as_ref().sign(requirements).await
    }
}

/// Resolves the signer registered for a scheme+network, if any.
///
/// Injected into policies at apply time instead of a hidden global
/// lookup; [`crate::registry::X402Client`] implements it over its own
/// mechanism table.
pub trait SignerResolver: Send + Sync {
    fn resolve(&self, scheme: &Scheme, network: &Network) -> Option<Arc<dyn ClientSigner>>;
}

impl<F> SignerResolver for F
where
    F: Fn(&Scheme, &Network) -> Option<Arc<dyn ClientSigner>> + Send + Sync,
{
    fn resolve(&self, scheme: &Scheme, network: &Network) -> Option<Arc<dyn ClientSigner>> {
        self(scheme, network)
    }
}

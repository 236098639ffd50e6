//! Payment policies: pure filtering/reordering transforms applied to the
//! server's requirement list before mechanism matching.
//!
//! Policies run in registration order, each receiving the previous
//! output. A policy never fails the negotiation itself; emptying the
//! list makes the client surface `NoAffordableRequirement`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::assets::AssetRegistry;
use crate::signer::SignerResolver;
use crate::types::PaymentRequirements;

/// A stateless transform over candidate requirements. Order of the
/// output is significant: downstream selection takes the first entry a
/// registered mechanism can handle.
#[async_trait]
pub trait PaymentPolicy: Send + Sync {
    async fn apply(
        &self,
        requirements: Vec<PaymentRequirements>,
        resolver: &dyn SignerResolver,
    ) -> Vec<PaymentRequirements>;
}

/// Filters out requirements the configured signers cannot currently
/// afford, fee included.
///
/// Fail-open: a requirement whose network has no resolvable signer, or
/// whose balance query errors, is kept unchanged — a balance policy must
/// never reject an option solely because it could not observe the
/// balance. Evaluation is sequential in input order so log lines match
/// the server's advertised ordering; output order equals input order.
pub struct SufficientBalancePolicy {
    assets: Arc<AssetRegistry>,
}

impl SufficientBalancePolicy {
    pub fn new(assets: Arc<AssetRegistry>) -> Self {
        Self { assets }
    }
}

impl Default for SufficientBalancePolicy {
    fn default() -> Self {
        Self::new(Arc::new(AssetRegistry::new()))
    }
}

#[async_trait]
impl PaymentPolicy for SufficientBalancePolicy {
    async fn apply(
        &self,
        requirements: Vec<PaymentRequirements>,
        resolver: &dyn SignerResolver,
    ) -> Vec<PaymentRequirements> {
        let mut affordable = Vec::with_capacity(requirements.len());
        for req in requirements {
            let Some(signer) = resolver.resolve(&req.scheme, &req.network) else {
                // No signer for this network; keep so mechanism matching
                // downstream gets the final say.
                affordable.push(req);
                continue;
            };

            let balance = match signer.check_balance(&req.asset, &req.network).await {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::debug!(
                        network = %req.network,
                        asset = %req.asset,
                        error = %e,
                        "balance query failed, keeping requirement"
                    );
                    affordable.push(req);
                    continue;
                }
            };

            let Some(needed) = req.needed_amount() else {
                // amount + fee overflows U256; unaffordable by definition.
                tracing::warn!(network = %req.network, asset = %req.asset, "fee total overflows, skipping");
                continue;
            };

            let symbol = self.assets.symbol(&req.network, &req.asset);
            let h_balance = self.assets.format_units(balance, &req.network, &req.asset);
            let h_needed = self.assets.format_units(needed, &req.network, &req.asset);
            if balance >= needed {
                tracing::info!(
                    "{symbol} on {}: balance={h_balance} >= needed={h_needed} (ok)",
                    req.network
                );
                affordable.push(req);
            } else {
                tracing::info!(
                    "{symbol} on {}: balance={h_balance} < needed={h_needed} (skipped)",
                    req.network
                );
            }
        }
        if affordable.is_empty() {
            tracing::warn!("all payment requirements filtered: insufficient balance");
        }
        affordable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{ClientSigner, ProviderError, SigningError};
    use crate::types::{Network, PaymentPayload, Scheme, TokenAmount};
    use std::collections::HashMap;

    /// Signer with a fixed balance table; sign() is never reached here.
    struct StaticSigner {
        balances: HashMap<String, u64>,
        fail_balance: bool,
    }

    impl StaticSigner {
        fn with_balance(asset: &str, balance: u64) -> Arc<Self> {
            Arc::new(Self {
                balances: HashMap::from([(asset.to_string(), balance)]),
                fail_balance: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                balances: HashMap::new(),
                fail_balance: true,
            })
        }
    }

    #[async_trait]
    impl ClientSigner for StaticSigner {
        fn address(&self) -> String {
            "TTestAddress".to_string()
        }

        async fn check_balance(
            &self,
            asset: &str,
            network: &Network,
        ) -> Result<TokenAmount, ProviderError> {
            if self.fail_balance {
                return Err(ProviderError::Request("node unreachable".to_string()));
            }
            self.balances
                .get(asset)
                .map(|&b| TokenAmount::from(b))
                .ok_or_else(|| ProviderError::UnsupportedAsset {
                    asset: asset.to_string(),
                    network: network.clone(),
                })
        }

        async fn sign(
            &self,
            _requirements: &PaymentRequirements,
        ) -> Result<PaymentPayload, SigningError> {
            Err(SigningError::Signing("not under test".to_string()))
        }
    }

    fn resolver_with(signer: Arc<StaticSigner>) -> impl SignerResolver {
        move |_scheme: &Scheme, _network: &Network| {
            Some(signer.clone() as Arc<dyn ClientSigner>)
        }
    }

    fn no_signer_resolver() -> impl SignerResolver {
        |_scheme: &Scheme, _network: &Network| -> Option<Arc<dyn ClientSigner>> { None }
    }

    fn requirement(asset: &str, amount: u64) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "upto".into(),
            network: "tron:nile".into(),
            asset: asset.to_string(),
            amount: TokenAmount::from(amount),
            pay_to: "TRecipient".to_string(),
            extra: None,
        }
    }

    fn requirement_with_fee(asset: &str, amount: u64, fee: u64) -> PaymentRequirements {
        let mut req = requirement(asset, amount);
        req.extra = Some(serde_json::json!({"fee": {"feeAmount": fee.to_string()}}));
        req
    }

    #[tokio::test]
    async fn test_keeps_affordable_drops_unaffordable() {
        let policy = SufficientBalancePolicy::default();
        let resolver = resolver_with(StaticSigner::with_balance("USDT", 75));
        let out = policy
            .apply(
                vec![requirement("USDT", 100), requirement("USDT", 50)],
                &resolver,
            )
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, TokenAmount::from(50));
    }

    #[tokio::test]
    async fn test_fail_open_without_signer() {
        let policy = SufficientBalancePolicy::default();
        let resolver = no_signer_resolver();
        let input = vec![requirement("USDT", 1_000_000)];
        let out = policy.apply(input.clone(), &resolver).await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_fail_open_on_provider_error() {
        let policy = SufficientBalancePolicy::default();
        let resolver = resolver_with(StaticSigner::failing());
        let input = vec![requirement("USDT", 1_000_000)];
        let out = policy.apply(input.clone(), &resolver).await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_fail_open_on_unsupported_asset() {
        let policy = SufficientBalancePolicy::default();
        let resolver = resolver_with(StaticSigner::with_balance("USDT", 0));
        let input = vec![requirement("USDD", 10)];
        let out = policy.apply(input.clone(), &resolver).await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_fee_included_in_needed_amount() {
        let policy = SufficientBalancePolicy::default();

        // balance 119 < 100 + 20: dropped
        let resolver = resolver_with(StaticSigner::with_balance("USDT", 119));
        let out = policy
            .apply(vec![requirement_with_fee("USDT", 100, 20)], &resolver)
            .await;
        assert!(out.is_empty());

        // balance 120 == 100 + 20: kept
        let resolver = resolver_with(StaticSigner::with_balance("USDT", 120));
        let out = policy
            .apply(vec![requirement_with_fee("USDT", 100, 20)], &resolver)
            .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_output_preserves_input_order() {
        let policy = SufficientBalancePolicy::default();
        let resolver = resolver_with(StaticSigner::with_balance("USDT", 1_000));
        let input = vec![
            requirement("USDT", 300),
            requirement("USDT", 100),
            requirement("USDT", 200),
        ];
        let out = policy.apply(input.clone(), &resolver).await;
        assert_eq!(out, input);
    }
}

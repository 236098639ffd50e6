//! Registry of known token deployments, used to render base-unit amounts
//! at the right precision for logs.
//!
//! Display only: the balance policy compares raw integer amounts and the
//! registry never feeds back into that comparison. Unregistered assets
//! render at 6 decimals.

use std::collections::HashMap;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Network, TokenAmount};

/// Fallback display precision for assets the registry does not know.
pub const DEFAULT_DECIMALS: u32 = 6;

// ============================================================================
// Configuration Types
// ============================================================================

/// Mode for loading asset registry config
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryMode {
    /// Add custom assets on top of whatever is already registered
    Append,
    /// Drop existing entries and use only the configured assets
    Replace,
}

/// Asset registry configuration loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRegistryConfig {
    pub mode: RegistryMode,
    /// symbol -> deployments
    pub assets: HashMap<String, Vec<AssetDeploymentConfig>>,
}

/// One deployment of an asset on a specific network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDeploymentConfig {
    /// Network identifier (e.g. "tron:nile")
    pub network: String,
    /// Asset contract address or identifier as servers advertise it
    pub address: String,
    /// Number of decimal places
    pub decimals: u32,
}

// ============================================================================
// Asset Registry
// ============================================================================

/// Result of looking up an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub symbol: String,
    pub decimals: u32,
}

/// Lookup table from (network, asset) to display metadata.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    entries: HashMap<(Network, String), AssetInfo>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a JSON config string.
    pub fn from_config(config: AssetRegistryConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.apply_config(config)?;
        Ok(registry)
    }

    /// Merge a config into this registry, honoring its mode.
    pub fn apply_config(&mut self, config: AssetRegistryConfig) -> Result<()> {
        if matches!(config.mode, RegistryMode::Replace) {
            self.entries.clear();
        }
        for (symbol, deployments) in config.assets {
            for deployment in deployments {
                if deployment.address.is_empty() {
                    anyhow::bail!("Empty address for asset {symbol}");
                }
                if deployment.network.is_empty() {
                    anyhow::bail!("Empty network for asset {symbol}");
                }
                let network = Network::new(deployment.network);
                self.register(network, deployment.address, &symbol, deployment.decimals);
            }
        }
        Ok(())
    }

    /// Register one asset deployment. Re-registering the same
    /// (network, address) replaces the previous entry.
    pub fn register(
        &mut self,
        network: Network,
        address: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u32,
    ) {
        self.entries.insert(
            (network, address.into()),
            AssetInfo {
                symbol: symbol.into(),
                decimals,
            },
        );
    }

    pub fn lookup(&self, network: &Network, asset: &str) -> Option<&AssetInfo> {
        self.entries.get(&(network.clone(), asset.to_string()))
    }

    /// Display precision for an asset, falling back to [`DEFAULT_DECIMALS`].
    pub fn decimals(&self, network: &Network, asset: &str) -> u32 {
        self.lookup(network, asset)
            .map(|info| info.decimals)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    /// Short human label for an asset: registered symbol, or a prefix of
    /// the raw identifier.
    pub fn symbol(&self, network: &Network, asset: &str) -> String {
        self.lookup(network, asset)
            .map(|info| info.symbol.clone())
            .unwrap_or_else(|| asset.chars().take(8).collect())
    }

    /// Render a base-unit amount at the asset's registered precision.
    /// Falls back to the raw integer with a unit suffix when the amount
    /// exceeds what Decimal can represent.
    pub fn format_units(&self, amount: TokenAmount, network: &Network, asset: &str) -> String {
        let decimals = self.decimals(network, asset);
        format_units(amount, decimals)
    }
}

/// Render `amount` base units with `decimals` fractional digits.
pub fn format_units(amount: TokenAmount, decimals: u32) -> String {
    let raw = amount.0.to_string();
    match raw.parse::<Decimal>() {
        Ok(mut value) => {
            // Decimal caps scale at 28; beyond that the raw form is clearer.
            if decimals <= 28 {
                let _ = value.set_scale(decimals);
                value.normalize().to_string()
            } else {
                format!("{raw}e-{decimals}")
            }
        }
        Err(_) => format!("{raw} base units"),
    }
}

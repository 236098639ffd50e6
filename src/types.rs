//! Core x402 protocol types shared by the codec, registry, and policies.
//!
//! Schemes and networks are open identifiers: servers advertise strings
//! like `"upto"` / `"tron:nile"` and clients match them case-sensitively,
//! so both are string newtypes rather than closed enums.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::str::FromStr;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

// ============================================================================
// Protocol Version
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum X402Version {
    V1,
    V2,
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            X402Version::V1 => serializer.serialize_u8(1),
            X402Version::V2 => serializer.serialize_u8(2),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
            X402Version::V2 => write!(f, "2"),
        }
    }
}

#[derive(Debug)]
pub struct X402VersionError(pub u8);

impl Display for X402VersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported x402Version: {}", self.0)
    }
}

impl std::error::Error for X402VersionError {}

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            2 => Ok(X402Version::V2),
            _ => Err(X402VersionError(value)),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        X402Version::try_from(num).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Scheme and Network identifiers
// ============================================================================

/// A payment method family identifier, e.g. `"upto"` or `"exact"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scheme(String);

impl Scheme {
    pub fn new(s: impl Into<String>) -> Self {
        Scheme(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Scheme {
    fn from(s: &str) -> Self {
        Scheme(s.to_string())
    }
}

impl FromStr for Scheme {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Scheme(s.to_string()))
    }
}

/// A target chain/environment identifier, e.g. `"tron:nile"` or `"eip155:8453"`.
///
/// Matching against mechanism patterns is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(String);

impl Network {
    pub fn new(s: impl Into<String>) -> Self {
        Network(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Network {
    fn from(s: &str) -> Self {
        Network(s.to_string())
    }
}

impl FromStr for Network {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Network(s.to_string()))
    }
}

// ============================================================================
// Token Amount
// ============================================================================

/// An amount in token base units. Always exact integer arithmetic,
/// serialized as a decimal string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);

    pub fn checked_add(&self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s).map(TokenAmount)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = U256::from_str(&s).map_err(serde::de::Error::custom)?;
        Ok(TokenAmount(value))
    }
}

// ============================================================================
// Payment Requirements
// ============================================================================

/// One server-advertised acceptable payment option. Immutable once
/// received; uniquely identified within a response by (scheme, network,
/// asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    pub asset: String,
    pub amount: TokenAmount,
    #[serde(rename = "payTo")]
    pub pay_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Extract a string field from a JSON object
fn json_string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(ToOwned::to_owned)
}

impl PaymentRequirements {
    /// The additive fee surcharge advertised under `extra.fee.feeAmount`,
    /// if any. Accepts both string and integer JSON encodings.
    pub fn fee_amount(&self) -> Option<TokenAmount> {
        let fee = self.extra.as_ref()?.get("fee")?;
        if let Some(s) = json_string_field(fee, "feeAmount") {
            return s.parse().ok();
        }
        fee.get("feeAmount")
            .and_then(|v| v.as_u64())
            .map(TokenAmount::from)
    }

    /// The address fees are routed to (`extra.fee.feeTo`), if advertised.
    pub fn fee_to(&self) -> Option<String> {
        let fee = self.extra.as_ref()?.get("fee")?;
        json_string_field(fee, "feeTo")
    }

    /// Total base units the payer must hold: `amount + feeAmount`.
    /// `None` means the sum overflows U256 and is unaffordable outright.
    pub fn needed_amount(&self) -> Option<TokenAmount> {
        match self.fee_amount() {
            Some(fee) => self.amount.checked_add(fee),
            None => Some(self.amount),
        }
    }
}

/// The full payment challenge a resource server attaches to a 402.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequired {
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

// ============================================================================
// Payment Payload
// ============================================================================

/// A signed, mechanism-specific payment authorization. The inner
/// `payload` body is opaque to the negotiation core; only the producing
/// mechanism and the facilitator interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(rename = "x402Version")]
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: serde_json::Value,
}

// ============================================================================
// Settle Response
// ============================================================================

/// Settlement outcome reported by the server after a paid request.
/// Informational only; decode failures are swallowed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleResponse {
    pub success: bool,
    pub network: Network,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(rename = "errorReason", default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

// ============================================================================
// Unix Timestamp
// ============================================================================

/// Seconds since the Unix epoch, used for payment validity windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
        Ok(UnixTimestamp(elapsed.as_secs()))
    }

    pub fn seconds_since_epoch(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = UnixTimestamp;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requirement(amount: u64, extra: Option<serde_json::Value>) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "upto".into(),
            network: "tron:nile".into(),
            asset: "TXYZ".to_string(),
            amount: TokenAmount::from(amount),
            pay_to: "TRecipient".to_string(),
            extra,
        }
    }

    #[test]
    fn test_fee_amount_string_encoding() {
        let req = requirement(100, Some(json!({"fee": {"feeAmount": "20", "feeTo": "TFee"}})));
        assert_eq!(req.fee_amount(), Some(TokenAmount::from(20)));
        assert_eq!(req.fee_to(), Some("TFee".to_string()));
        assert_eq!(req.needed_amount(), Some(TokenAmount::from(120)));
    }

    #[test]
    fn test_fee_amount_integer_encoding() {
        let req = requirement(100, Some(json!({"fee": {"feeAmount": 20}})));
        assert_eq!(req.fee_amount(), Some(TokenAmount::from(20)));
    }

    #[test]
    fn test_no_fee() {
        let req = requirement(100, None);
        assert_eq!(req.fee_amount(), None);
        assert_eq!(req.needed_amount(), Some(TokenAmount::from(100)));
    }

    #[test]
    fn test_needed_amount_overflow() {
        let mut req = requirement(0, Some(json!({"fee": {"feeAmount": "1"}})));
        req.amount = TokenAmount(U256::MAX);
        assert_eq!(req.needed_amount(), None);
    }

    #[test]
    fn test_token_amount_serde_as_string() {
        let amount = TokenAmount::from(1_000_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1000000\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_requirements_wire_format() {
        let json = json!({
            "scheme": "upto",
            "network": "tron:nile",
            "asset": "USDT",
            "amount": "1000000",
            "payTo": "TRecipient"
        });
        let req: PaymentRequirements = serde_json::from_value(json).unwrap();
        assert_eq!(req.scheme.as_str(), "upto");
        assert_eq!(req.amount, TokenAmount::from(1_000_000));
    }

    #[test]
    fn test_x402_version_roundtrip() {
        assert_eq!(serde_json::to_string(&X402Version::V2).unwrap(), "2");
        let v: X402Version = serde_json::from_str("1").unwrap();
        assert_eq!(v, X402Version::V1);
        assert!(serde_json::from_str::<X402Version>("7").is_err());
    }
}

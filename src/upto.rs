//! Reference mechanism for the "upto" payment scheme.
//!
//! An upto payment authorizes a capped transfer: the payer signs a
//! `PaymentPermit` naming the token, the maximum amount, the payee, and
//! an optional fee route, valid for a bounded time window. The server's
//! 402 challenge may carry a `paymentPermitContext` extension with
//! server-assigned permit metadata (payment id, nonce, validity window);
//! anything it omits is generated client-side.
//!
//! The mechanism prepares the complete permit from the requirement and
//! hands it to the bound [`ClientSigner`] for signing; the concrete
//! signature algorithm stays behind the capability boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::mechanism::ClientMechanism;
use crate::signer::{ClientSigner, SigningError};
use crate::types::{PaymentPayload, PaymentRequirements, TokenAmount, UnixTimestamp};

/// Permit kind for plain payments (no delivery leg).
pub const PAYMENT_ONLY: u8 = 0;

/// Placeholder address for unset permit fields.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Permits become valid slightly in the past to absorb clock skew.
const VALIDITY_BACKDATE_SECS: u64 = 10 * 60;
/// Default forward validity when the server does not pin a window.
const VALIDITY_WINDOW_SECS: u64 = 10 * 60;

// ============================================================================
// Permit structure
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitMeta {
    pub kind: u8,
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    pub nonce: String,
    #[serde(rename = "validAfter")]
    pub valid_after: u64,
    #[serde(rename = "validBefore")]
    pub valid_before: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitPayment {
    #[serde(rename = "payToken")]
    pub pay_token: String,
    #[serde(rename = "maxPayAmount")]
    pub max_pay_amount: TokenAmount,
    #[serde(rename = "payTo")]
    pub pay_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitFee {
    #[serde(rename = "feeTo")]
    pub fee_to: String,
    #[serde(rename = "feeAmount")]
    pub fee_amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitDelivery {
    #[serde(rename = "receiveToken")]
    pub receive_token: String,
    #[serde(rename = "miniReceiveAmount")]
    pub mini_receive_amount: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
}

/// The full capped-transfer authorization the payer signs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPermit {
    pub meta: PermitMeta,
    pub buyer: String,
    pub caller: String,
    pub payment: PermitPayment,
    pub fee: PermitFee,
    pub delivery: PermitDelivery,
}

// ============================================================================
// Server-supplied permit context
// ============================================================================

/// The `paymentPermitContext` extension of a 402 challenge. All fields
/// optional; omissions are filled client-side.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentPermitContext {
    #[serde(default)]
    pub meta: ContextMeta,
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub delivery: Option<ContextDelivery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextMeta {
    #[serde(default)]
    pub kind: Option<u8>,
    #[serde(rename = "paymentId", default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(rename = "validAfter", default)]
    pub valid_after: Option<u64>,
    #[serde(rename = "validBefore", default)]
    pub valid_before: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextDelivery {
    #[serde(rename = "receiveToken", default)]
    pub receive_token: Option<String>,
    #[serde(rename = "miniReceiveAmount", default)]
    pub mini_receive_amount: Option<String>,
    #[serde(rename = "tokenId", default)]
    pub token_id: Option<String>,
}

impl PaymentPermitContext {
    /// Extract the context from the challenge's top-level extensions.
    pub fn from_extensions(extensions: Option<&serde_json::Value>) -> Option<Self> {
        let raw = extensions?.get("paymentPermitContext")?;
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Random 32-byte payment id, hex encoded.
fn generate_payment_id() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("0x{}", hex::encode(bytes))
}

/// Build the complete permit for one selected requirement.
///
/// `buyer` is the payer address from the signer. Server-assigned meta
/// fields win; missing ones get a fresh payment id, random nonce, and a
/// validity window around now.
pub fn build_permit(
    requirements: &PaymentRequirements,
    buyer: String,
    context: &PaymentPermitContext,
) -> Result<PaymentPermit, SigningError> {
    let now = UnixTimestamp::try_now().map_err(SigningError::Clock)?;
    let meta = PermitMeta {
        kind: context.meta.kind.unwrap_or(PAYMENT_ONLY),
        payment_id: context
            .meta
            .payment_id
            .clone()
            .unwrap_or_else(generate_payment_id),
        nonce: context
            .meta
            .nonce
            .clone()
            .unwrap_or_else(|| rand::random::<u64>().to_string()),
        valid_after: context
            .meta
            .valid_after
            .unwrap_or_else(|| now.seconds_since_epoch().saturating_sub(VALIDITY_BACKDATE_SECS)),
        valid_before: context
            .meta
            .valid_before
            .unwrap_or_else(|| (now + VALIDITY_WINDOW_SECS).seconds_since_epoch()),
    };

    let fee = PermitFee {
        fee_to: requirements.fee_to().unwrap_or_else(|| ZERO_ADDRESS.to_string()),
        fee_amount: requirements.fee_amount().unwrap_or(TokenAmount::ZERO),
    };

    let delivery = context.delivery.clone().unwrap_or_default();

    Ok(PaymentPermit {
        meta,
        buyer,
        caller: context.caller.clone().unwrap_or_else(|| ZERO_ADDRESS.to_string()),
        payment: PermitPayment {
            pay_token: requirements.asset.clone(),
            max_pay_amount: requirements.amount,
            pay_to: requirements.pay_to.clone(),
        },
        fee,
        delivery: PermitDelivery {
            receive_token: delivery.receive_token.unwrap_or_else(|| ZERO_ADDRESS.to_string()),
            mini_receive_amount: delivery.mini_receive_amount.unwrap_or_else(|| "0".to_string()),
            token_id: delivery.token_id.unwrap_or_else(|| "0".to_string()),
        },
    })
}

// ============================================================================
// Mechanism
// ============================================================================

/// Client mechanism for the "upto" scheme. Requires the server to send a
/// `paymentPermitContext` extension; prepares the permit and delegates
/// signing to the bound signer via an enriched requirement whose
/// `extra.permit` carries the permit to authorize.
#[derive(Debug, Default)]
pub struct UptoMechanism;

impl UptoMechanism {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClientMechanism for UptoMechanism {
    async fn build(
        &self,
        requirements: &PaymentRequirements,
        signer: &dyn ClientSigner,
        resource: &Url,
        extensions: Option<&serde_json::Value>,
    ) -> Result<PaymentPayload, SigningError> {
        let context = PaymentPermitContext::from_extensions(extensions)
            .ok_or(SigningError::MissingExtension("paymentPermitContext"))?;

        let permit = build_permit(requirements, signer.address(), &context)?;
        tracing::debug!(
            payment_id = %permit.meta.payment_id,
            valid_before = permit.meta.valid_before,
            resource = %resource,
            "prepared upto permit"
        );

        // Hand the completed permit to the signer through the
        // requirement copy; the original server-advertised entry is
        // never mutated.
        let mut prepared = requirements.clone();
        // Indexing below needs an object; a non-object extra is nested.
        let mut extra = match prepared.extra.take() {
            Some(value @ serde_json::Value::Object(_)) => value,
            Some(other) => serde_json::json!({ "extra": other }),
            None => serde_json::json!({}),
        };
        extra["permit"] = serde_json::to_value(&permit)
            .map_err(|e| SigningError::Signing(e.to_string()))?;
        extra["resource"] = serde_json::Value::String(resource.to_string());
        prepared.extra = Some(extra);

        let payload = signer.sign(&prepared).await?;

        // A payload for the wrong scheme or network must never go out.
        if payload.scheme != requirements.scheme || payload.network != requirements.network {
            return Err(SigningError::Signing(format!(
                "signer produced payload for {}:{}, expected {}:{}",
                payload.scheme, payload.network, requirements.scheme, requirements.network
            )));
        }
        Ok(payload)
    }
}

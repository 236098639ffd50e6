//! Transport-safe codec for x402 header values.
//!
//! Every structured payment object crossing an HTTP header boundary is
//! carried as base64 of its canonical JSON serialization. `encode` and
//! `decode` are mutual inverses for every valid value; `decode` rejects
//! malformed input with a typed [`DecodeError`] and never panics.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{PaymentPayload, PaymentRequired, SettleResponse};

/// Errors produced when decoding a header value back into a payment object.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64: {0}")]
    Base64(#[source] base64::DecodeError),
    #[error("Decoded bytes are not valid UTF-8: {0}")]
    Utf8(#[source] std::str::Utf8Error),
    #[error("Invalid JSON structure: {0}")]
    Json(#[source] serde_json::Error),
}

/// Errors produced when encoding a payment object for a header.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to serialize to JSON: {0}")]
    Json(#[source] serde_json::Error),
}

fn encode<T: Serialize>(value: &T) -> Result<String, EncodeError> {
    let json = serde_json::to_vec(value).map_err(EncodeError::Json)?;
    Ok(b64.encode(&json))
}

fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, DecodeError> {
    let bytes = b64.decode(encoded.trim()).map_err(DecodeError::Base64)?;
    let text = std::str::from_utf8(&bytes).map_err(DecodeError::Utf8)?;
    serde_json::from_str(text).map_err(DecodeError::Json)
}

/// Encode a signed payment payload for the `PAYMENT-SIGNATURE` request header.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, EncodeError> {
    encode(payload)
}

/// Decode a `PAYMENT-SIGNATURE` header value back into a payment payload.
pub fn decode_payment(encoded: &str) -> Result<PaymentPayload, DecodeError> {
    decode(encoded)
}

/// Decode a `PAYMENT-REQUIRED` response header into the 402 challenge.
/// A syntactically valid JSON object missing `accepts` is a [`DecodeError`],
/// so callers fall back to parsing the response body.
pub fn decode_payment_required(encoded: &str) -> Result<PaymentRequired, DecodeError> {
    decode(encoded)
}

/// Encode a 402 challenge for the `PAYMENT-REQUIRED` response header.
pub fn encode_payment_required(required: &PaymentRequired) -> Result<String, EncodeError> {
    encode(required)
}

/// Decode the informational `PAYMENT-RESPONSE` settlement header.
pub fn decode_settle_response(encoded: &str) -> Result<SettleResponse, DecodeError> {
    decode(encoded)
}

/// Encode a settlement result for the `PAYMENT-RESPONSE` header.
pub fn encode_settle_response(settle: &SettleResponse) -> Result<String, EncodeError> {
    encode(settle)
}

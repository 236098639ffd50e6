//! HTTP flow with automatic 402 payment handling.
//!
//! One request runs through at most four stages: issue the original
//! request, detect a 402, negotiate a payment through the registered
//! mechanisms, and retry exactly once with the signed payload attached.
//! A second 402 (or any other status) on the retry is returned to the
//! caller as-is; the flow never loops.
//!
//! The transport itself is a collaborator behind the [`Transport`] seam;
//! implementations are provided for `reqwest::Client` and
//! `reqwest_middleware::ClientWithMiddleware`.

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use crate::codec;
use crate::registry::{PaymentError, RequirementsSelector, X402Client};
use crate::types::{PaymentRequired, SettleResponse};

/// Request header carrying the encoded payment payload on retry.
pub const PAYMENT_SIGNATURE: HeaderName = HeaderName::from_static("payment-signature");
/// Response header carrying the encoded 402 challenge.
pub const PAYMENT_REQUIRED: HeaderName = HeaderName::from_static("payment-required");
/// Response header carrying the settlement result after a paid request.
pub const PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("payment-response");

// ============================================================================
// Transport seam
// ============================================================================

/// Failure in the underlying HTTP transport.
#[derive(Debug, thiserror::Error)]
#[error("Transport error: {0}")]
pub struct TransportError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        TransportError(Box::new(source))
    }
}

/// The underlying HTTP stack. Anything that can turn a buffered request
/// into a buffered response works; TLS, pooling, and timeouts live here,
/// not in the payment flow.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        let request = reqwest::Request::try_from(request).map_err(TransportError::new)?;
        let response = reqwest::Client::execute(self, request)
            .await
            .map_err(TransportError::new)?;
        buffer_response(response).await
    }
}

#[async_trait]
impl Transport for reqwest_middleware::ClientWithMiddleware {
    async fn execute(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        let request = reqwest::Request::try_from(request).map_err(TransportError::new)?;
        let response = reqwest_middleware::ClientWithMiddleware::execute(self, request)
            .await
            .map_err(TransportError::new)?;
        buffer_response(response).await
    }
}

async fn buffer_response(
    response: reqwest::Response,
) -> Result<http::Response<Vec<u8>>, TransportError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(TransportError::new)?.to_vec();
    let mut out = http::Response::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    Ok(out)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Negotiation failed after a 402 was detected; no retry is issued.
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("Failed to encode payment payload: {0}")]
    Encode(#[source] codec::EncodeError),
    #[error("Encoded payment payload is not a valid header value")]
    HeaderValue(#[source] http::header::InvalidHeaderValue),
    #[error("Failed to build request: {0}")]
    InvalidRequest(#[source] http::Error),
}

// ============================================================================
// Responses
// ============================================================================

/// Final response of a (possibly paid) request, plus the settlement
/// report when the server sent one.
#[derive(Debug)]
pub struct PaidResponse {
    pub response: http::Response<Vec<u8>>,
    pub settlement: Option<SettleResponse>,
}

impl PaidResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn body(&self) -> &[u8] {
        self.response.body()
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Parse the 402 challenge: the `PAYMENT-REQUIRED` header decoded via
/// the codec wins; a header that is absent or fails to decode falls
/// through to the JSON body. `None` means the 402 carried no usable
/// challenge and must be returned to the caller unpaid.
pub fn parse_payment_required(response: &http::Response<Vec<u8>>) -> Option<PaymentRequired> {
    if let Some(value) = response.headers().get(&PAYMENT_REQUIRED) {
        match value.to_str().ok().map(codec::decode_payment_required) {
            Some(Ok(required)) => return Some(required),
            _ => {
                tracing::debug!("undecodable {PAYMENT_REQUIRED:?} header, falling back to body");
            }
        }
    }
    serde_json::from_slice(response.body()).ok()
}

/// Best-effort decode of the informational settlement header. Decode
/// failures are swallowed.
pub fn parse_settlement(response: &http::Response<Vec<u8>>) -> Option<SettleResponse> {
    let value = response.headers().get(&PAYMENT_RESPONSE)?;
    match value.to_str().ok().map(codec::decode_settle_response)? {
        Ok(settle) => Some(settle),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable settlement header");
            None
        }
    }
}

// ============================================================================
// FetchClient
// ============================================================================

/// HTTP client driving the detect-402 → negotiate → retry flow over a
/// [`Transport`] and an [`X402Client`].
pub struct FetchClient<T> {
    transport: T,
    x402: X402Client,
    selector: Option<Box<RequirementsSelector>>,
}

impl<T: Transport> FetchClient<T> {
    pub fn new(transport: T, x402: X402Client) -> Self {
        Self {
            transport,
            x402,
            selector: None,
        }
    }

    /// Install a custom requirement selector. Ignored whenever policies
    /// are registered on the inner client.
    pub fn with_selector(
        mut self,
        selector: impl Fn(&[crate::types::PaymentRequirements]) -> Option<crate::types::PaymentRequirements>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    pub fn x402(&self) -> &X402Client {
        &self.x402
    }

    /// GET with payment handling.
    pub async fn get(&self, url: &Url) -> Result<PaidResponse, FetchError> {
        self.request(Method::GET, url, HeaderMap::new(), Vec::new())
            .await
    }

    /// POST with payment handling.
    pub async fn post(&self, url: &Url, body: Vec<u8>) -> Result<PaidResponse, FetchError> {
        self.request(Method::POST, url, HeaderMap::new(), body).await
    }

    /// Issue `method url` and transparently pay one 402 challenge. The
    /// retry reuses the identical method, headers, and body with the
    /// `PAYMENT-SIGNATURE` header added.
    pub async fn request(
        &self,
        method: Method,
        url: &Url,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<PaidResponse, FetchError> {
        let request = build_request(&method, url, &headers, &body, None)?;
        let response = self.transport.execute(request).await?;

        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(PaidResponse {
                response,
                settlement: None,
            });
        }

        let Some(required) = parse_payment_required(&response) else {
            // No usable challenge: hand the unpaid 402 back rather than
            // fabricating a payment.
            tracing::debug!(url = %url, "402 without parseable payment challenge");
            return Ok(PaidResponse {
                response,
                settlement: None,
            });
        };

        tracing::info!(
            url = %url,
            options = required.accepts.len(),
            "payment required, negotiating"
        );

        let payload = self
            .x402
            .handle_payment(
                &required.accepts,
                url,
                required.extensions.as_ref(),
                self.selector.as_deref(),
            )
            .await?;

        let encoded = codec::encode_payment(&payload).map_err(FetchError::Encode)?;
        let signature =
            HeaderValue::from_str(&encoded).map_err(FetchError::HeaderValue)?;

        let retry = build_request(&method, url, &headers, &body, Some(signature))?;
        let response = self.transport.execute(retry).await?;
        let settlement = parse_settlement(&response);

        if let Some(settle) = &settlement {
            tracing::info!(
                success = settle.success,
                network = %settle.network,
                transaction = settle.transaction.as_deref().unwrap_or(""),
                "payment settled"
            );
        }

        // Whatever the retry produced is final; at most one paid retry.
        Ok(PaidResponse {
            response,
            settlement,
        })
    }
}

fn build_request(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: &[u8],
    signature: Option<HeaderValue>,
) -> Result<http::Request<Vec<u8>>, FetchError> {
    let builder = http::Request::builder()
        .method(method.clone())
        .uri(url.as_str());
    let mut request = builder
        .body(body.to_vec())
        .map_err(FetchError::InvalidRequest)?;
    *request.headers_mut() = headers.clone();
    if let Some(signature) = signature {
        request.headers_mut().insert(PAYMENT_SIGNATURE, signature);
    }
    Ok(request)
}

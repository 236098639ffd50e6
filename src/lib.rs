//! Client-side x402 payment negotiation.
//!
//! When a resource server answers 402, this crate parses the advertised
//! payment options, filters them through configured policies, matches
//! them against registered payment mechanisms, has the bound signer
//! produce a signed payload, and retries the request exactly once with
//! the payload attached.

pub mod assets;
pub mod codec;
pub mod fetch;
pub mod logging;
pub mod mechanism;
pub mod policy;
pub mod registry;
pub mod signer;
pub mod types;
pub mod upto;

pub use assets::{AssetRegistry, AssetRegistryConfig};
pub use codec::{DecodeError, EncodeError};
pub use fetch::{FetchClient, FetchError, PaidResponse, Transport, TransportError};
pub use mechanism::{ClientMechanism, MechanismPattern};
pub use policy::{PaymentPolicy, SufficientBalancePolicy};
pub use registry::{PaymentError, RequirementsSelector, X402Client};
pub use signer::{ClientSigner, ProviderError, SignerResolver, SigningError};
pub use types::{
    Network, PaymentPayload, PaymentRequired, PaymentRequirements, Scheme, SettleResponse,
    TokenAmount, UnixTimestamp, X402Version,
};
pub use upto::UptoMechanism;

//! Credentials and request signing for exchange connections.
//!
//! API secrets are kept in `SecretString` and only exposed to the HMAC
//! signer. Credentials come from a stored [`model::ExchangeConnection`].

mod credentials;
mod error;
mod signer;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use signer::RequestSigner;

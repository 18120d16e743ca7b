//! API credential handling.
//!
//! Secrets are held in `secrecy` types so they stay out of logs and are
//! zeroed on drop.

use crate::error::AuthError;
use model::ExchangeConnection;
use secrecy::{ExposeSecret, SecretString};

/// API key and secret for one exchange connection.
///
/// The secret is zeroed on drop and never printed.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: SecretString::from(secret_key.into()),
        }
    }

    /// Take the credentials stored on a connection. Both parts must be set.
    pub fn from_connection(connection: &ExchangeConnection) -> Result<Self, AuthError> {
        if connection.api_key.is_empty() || connection.api_secret.is_empty() {
            return Err(AuthError::MissingCredentials(connection.id));
        }
        Ok(Self::new(
            connection.api_key.clone(),
            connection.api_secret.clone(),
        ))
    }

    /// Public part, safe to log and send as `X-MBX-APIKEY`.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{ConnectionId, ExchangeName};
    use rust_decimal_macros::dec;

    fn connection(key: &str, secret: &str) -> ExchangeConnection {
        ExchangeConnection {
            id: ConnectionId(7),
            exchange: ExchangeName::Binance,
            api_key: key.into(),
            api_secret: secret.into(),
            commission: dec!(0.001),
        }
    }

    #[test]
    fn test_from_connection() {
        let creds = ApiCredentials::from_connection(&connection("pub", "priv")).unwrap();
        assert_eq!(creds.api_key(), "pub");
        assert_eq!(creds.expose_secret(), "priv");
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let err = ApiCredentials::from_connection(&connection("pub", "")).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(ConnectionId(7))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("my_api_key", "super_secret_key");
        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("my_api_key"));
        assert!(!debug_str.contains("super_secret_key"));
    }
}

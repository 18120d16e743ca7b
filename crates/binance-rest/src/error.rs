//! Binance REST API error types.

use auth::AuthError;
use rest_client::RestError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinanceRestError {
    #[error("REST client error: {0}")]
    Rest(RestError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Binance API error {code}: {message}")]
    Api { code: i64, message: String },

    /// -2010: the account cannot cover the order.
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// -2011 / -2013: the exchange does not know the order.
    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    /// -1125: the listen key expired or was never valid.
    #[error("Listen key expired or invalid")]
    ListenKeyExpired,

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceRestError {
    pub fn from_code(code: i64, message: String) -> Self {
        match code {
            -1125 => Self::ListenKeyExpired,
            -2010 => Self::InsufficientBalance(message),
            -2011 | -2013 => Self::UnknownOrder(message),
            _ => Self::Api { code, message },
        }
    }

    /// Exchange error code, when the venue returned one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::InsufficientBalance(_) => Some(-2010),
            Self::UnknownOrder(_) => Some(-2011),
            Self::ListenKeyExpired => Some(-1125),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rest(e) => e.is_retryable(),
            // Unknown, disconnected, too many requests, timeout
            Self::Api { code, .. } => matches!(code, -1000 | -1001 | -1003 | -1007 | -1015),
            _ => false,
        }
    }
}

impl From<RestError> for BinanceRestError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http { ref body, .. } => match serde_json::from_str::<ApiErrorBody>(body) {
                Ok(api) => Self::from_code(api.code, api.msg),
                Err(_) => Self::Rest(err),
            },
            other => Self::Rest(other),
        }
    }
}

//! Binance environment configuration.
//!
//! Production and testnet, each with its REST and WebSocket base URLs.

use model::ExchangeName;
use std::fmt;

/// Which Binance deployment a connection trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinanceEnvironment {
    #[default]
    Production,
    Testnet,
}

impl BinanceEnvironment {
    /// `None` for venues that are not Binance.
    pub fn for_exchange(exchange: ExchangeName) -> Option<Self> {
        match exchange {
            ExchangeName::Binance => Some(Self::Production),
            ExchangeName::BinanceTest => Some(Self::Testnet),
            ExchangeName::Fake => None,
        }
    }

    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.binance.com",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }

    /// User data streams are served under `/ws/<listenKey>`.
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://stream.binance.com:9443",
            Self::Testnet => "wss://testnet.binance.vision",
        }
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

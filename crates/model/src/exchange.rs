//! Exchange connections and symbol metadata.

use crate::ids::ConnectionId;
use crate::ParseEnumError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Venue an exchange connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeName {
    Binance,
    #[serde(rename = "BINANCETEST")]
    BinanceTest,
    /// In-process venue used to drive the engine without an exchange.
    Fake,
}

impl ExchangeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "BINANCE",
            Self::BinanceTest => "BINANCETEST",
            Self::Fake => "FAKE",
        }
    }
}

impl fmt::Display for ExchangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeName {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BINANCE" => Ok(Self::Binance),
            "BINANCETEST" => Ok(Self::BinanceTest),
            "FAKE" => Ok(Self::Fake),
            _ => Err(ParseEnumError::new("exchange", s)),
        }
    }
}

/// API credentials for one account on one venue.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangeConnection {
    pub id: ConnectionId,
    pub exchange: ExchangeName,
    pub api_key: String,
    pub api_secret: String,
    /// Taker/maker fee rate, e.g. 0.001.
    pub commission: Decimal,
}

impl fmt::Debug for ExchangeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConnection")
            .field("id", &self.id)
            .field("exchange", &self.exchange)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("commission", &self.commission)
            .finish()
    }
}

/// Trading rules for one symbol, as published by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// PRICE_FILTER tick. Zero disables price rounding.
    pub tick_size: Decimal,
    /// LOT_SIZE step. Zero disables quantity rounding.
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
    /// Last known price of the base asset in quote units.
    pub price: Option<Decimal>,
}

//! Exchange-side order vocabulary.

use model::OrderStatus;
use serde::{Deserialize, Serialize};

/// Order status as the exchange reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    /// Order acknowledged by exchange.
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    PendingCancel,
    /// Anything this engine does not recognise.
    Unknown,
}

impl ExchangeOrderStatus {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            "PENDING_CANCEL" => Some(Self::PendingCancel),
            _ => None,
        }
    }

    /// Like [`from_binance_str`](Self::from_binance_str), mapping unknown
    /// strings to [`Unknown`](Self::Unknown).
    pub fn parse_lenient(s: &str) -> Self {
        Self::from_binance_str(s).unwrap_or(Self::Unknown)
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::PendingCancel => "PENDING_CANCEL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Internal status this report moves an order to, if any.
    ///
    /// Partial fills, pending cancels and rejections carry no transition.
    pub fn to_internal(&self) -> Option<OrderStatus> {
        match self {
            Self::New => Some(OrderStatus::Active),
            Self::Filled => Some(OrderStatus::Filled),
            Self::Canceled => Some(OrderStatus::Canceled),
            Self::Expired => Some(OrderStatus::Expired),
            Self::PartiallyFilled | Self::Rejected | Self::PendingCancel | Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for ExchangeOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_binance_str())
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Canceled - remains active until filled or canceled.
    GTC,
    /// Immediate Or Cancel - fill what's possible immediately, cancel rest.
    IOC,
    /// Fill Or Kill - must be filled completely immediately or canceled.
    FOK,
}

impl TimeInForce {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "GTC" => Some(Self::GTC),
            "IOC" => Some(Self::IOC),
            "FOK" => Some(Self::FOK),
            _ => None,
        }
    }

    /// Convert to Binance string representation.
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        assert_eq!(
            ExchangeOrderStatus::from_binance_str("FILLED"),
            Some(ExchangeOrderStatus::Filled)
        );
        assert_eq!(ExchangeOrderStatus::from_binance_str("PENDING_NEW"), None);
        assert_eq!(
            ExchangeOrderStatus::parse_lenient("PENDING_NEW"),
            ExchangeOrderStatus::Unknown
        );
    }

    #[test]
    fn test_status_maps_to_internal() {
        assert_eq!(
            ExchangeOrderStatus::New.to_internal(),
            Some(OrderStatus::Active)
        );
        assert_eq!(
            ExchangeOrderStatus::Filled.to_internal(),
            Some(OrderStatus::Filled)
        );
        assert_eq!(
            ExchangeOrderStatus::Expired.to_internal(),
            Some(OrderStatus::Expired)
        );
    }

    #[test]
    fn test_unhandled_statuses_are_no_ops() {
        for status in [
            ExchangeOrderStatus::PartiallyFilled,
            ExchangeOrderStatus::PendingCancel,
            ExchangeOrderStatus::Rejected,
            ExchangeOrderStatus::Unknown,
        ] {
            assert_eq!(status.to_internal(), None, "{status}");
        }
    }

    #[test]
    fn test_time_in_force_conversion() {
        assert_eq!(TimeInForce::from_binance_str("GTC"), Some(TimeInForce::GTC));
        assert_eq!(TimeInForce::from_binance_str("GTX"), None);
        assert_eq!(TimeInForce::FOK.as_binance_str(), "FOK");
    }
}

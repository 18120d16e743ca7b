//! Order reports from the exchange, before and after correlation.

use crate::order::ExchangeOrderStatus;
use model::{FillAmounts, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An order report as the adapter received it, keyed by client order id.
///
/// Produced by push streams and by placement/cancel acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    /// Client-generated order id, `<tag>-<order id>`.
    pub client_order_id: String,
    pub symbol: String,
    pub status: ExchangeOrderStatus,
    /// Event timestamp in milliseconds.
    pub event_time_ms: i64,
    /// Cumulative filled base quantity.
    pub cumulative_filled_qty: Option<Decimal>,
    /// Cumulative filled quote quantity.
    pub cumulative_quote_qty: Option<Decimal>,
}

impl ExchangeEvent {
    pub fn new(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        status: ExchangeOrderStatus,
        event_time_ms: i64,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            status,
            event_time_ms,
            cumulative_filled_qty: None,
            cumulative_quote_qty: None,
        }
    }

    pub fn with_fills(mut self, filled_qty: Decimal, quote_qty: Decimal) -> Self {
        self.cumulative_filled_qty = Some(filled_qty);
        self.cumulative_quote_qty = Some(quote_qty);
        self
    }

    /// Fill amounts, carried only on FILLED reports.
    pub fn fills(&self) -> Option<FillAmounts> {
        if self.status != ExchangeOrderStatus::Filled {
            return None;
        }
        Some(FillAmounts {
            filled_quantity: self.cumulative_filled_qty?,
            quote_quantity: self.cumulative_quote_qty?,
        })
    }

    /// Attach the decoded internal order id.
    pub fn into_update(self, order_id: OrderId, source: UpdateSource) -> OrderUpdate {
        OrderUpdate {
            order_id,
            status: self.status,
            event_time_ms: self.event_time_ms,
            fills: self.fills(),
            source,
        }
    }
}

/// Where an update came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateSource {
    Stream,
    Reconcile,
    /// Acknowledgement returned by a placement or cancel call.
    Ack,
    /// Manually injected against the fake venue.
    Injected,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stream => "stream",
            Self::Reconcile => "reconcile",
            Self::Ack => "ack",
            Self::Injected => "injected",
        };
        f.write_str(s)
    }
}

/// A correlated status report for one of our orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub status: ExchangeOrderStatus,
    pub event_time_ms: i64,
    pub fills: Option<FillAmounts>,
    pub source: UpdateSource,
}

impl OrderUpdate {
    pub fn new(
        order_id: OrderId,
        status: ExchangeOrderStatus,
        event_time_ms: i64,
        source: UpdateSource,
    ) -> Self {
        Self {
            order_id,
            status,
            event_time_ms,
            fills: None,
            source,
        }
    }

    pub fn with_fills(mut self, fills: FillAmounts) -> Self {
        self.fills = Some(fills);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fills_only_on_filled() {
        let canceled = ExchangeEvent::new("abc-1", "BTCUSDT", ExchangeOrderStatus::Canceled, 10)
            .with_fills(dec!(0.5), dec!(100));
        assert_eq!(canceled.fills(), None);

        let filled = ExchangeEvent::new("abc-1", "BTCUSDT", ExchangeOrderStatus::Filled, 11)
            .with_fills(dec!(0.5), dec!(100));
        assert_eq!(
            filled.fills(),
            Some(FillAmounts {
                filled_quantity: dec!(0.5),
                quote_quantity: dec!(100),
            })
        );
    }

    #[test]
    fn test_filled_without_amounts_has_no_fills() {
        let filled = ExchangeEvent::new("abc-1", "BTCUSDT", ExchangeOrderStatus::Filled, 11);
        assert_eq!(filled.fills(), None);
    }

    #[test]
    fn test_into_update_keeps_time_and_status() {
        let update = ExchangeEvent::new("abc-9", "ETHUSDT", ExchangeOrderStatus::New, 42)
            .into_update(OrderId(9), UpdateSource::Stream);
        assert_eq!(update.order_id, OrderId(9));
        assert_eq!(update.status, ExchangeOrderStatus::New);
        assert_eq!(update.event_time_ms, 42);
        assert_eq!(update.source.to_string(), "stream");
    }
}

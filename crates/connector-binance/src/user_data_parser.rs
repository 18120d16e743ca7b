//! Binance user data stream messages.
//!
//! Only `executionReport` and `listenKeyExpired` matter to the engine;
//! balance and list-status events are recognised and skipped.

use execution_core::{ExchangeEvent, ExchangeOrderStatus};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExecutionReportRaw {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    /// Client id of the request that caused this report. For cancels this
    /// is the cancel request's own id.
    #[serde(rename = "c")]
    client_order_id: String,
    /// Original client id, set on cancel and expiry reports.
    #[serde(rename = "C", default)]
    original_client_order_id: Option<String>,
    #[serde(rename = "X")]
    order_status: String,
    #[serde(rename = "z")]
    cumulative_filled_qty: Decimal,
    #[serde(rename = "Z")]
    cumulative_quote_qty: Decimal,
}

impl ExecutionReportRaw {
    fn into_event(self) -> ExchangeEvent {
        let client_order_id = match self.original_client_order_id {
            Some(original) if !original.is_empty() => original,
            _ => self.client_order_id,
        };
        ExchangeEvent::new(
            client_order_id,
            self.symbol,
            ExchangeOrderStatus::parse_lenient(&self.order_status),
            self.event_time,
        )
        .with_fills(self.cumulative_filled_qty, self.cumulative_quote_qty)
    }
}

#[derive(Debug)]
pub enum UserDataMessage {
    Execution(ExchangeEvent),
    /// The stream will close; a new listen key is needed.
    ListenKeyExpired,
    Other,
}

pub fn parse_user_data_message(text: &str) -> Result<UserDataMessage, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    match value.get("e").and_then(|v| v.as_str()) {
        Some("executionReport") => {
            let raw: ExecutionReportRaw = serde_json::from_value(value)?;
            Ok(UserDataMessage::Execution(raw.into_event()))
        }
        Some("listenKeyExpired") => Ok(UserDataMessage::ListenKeyExpired),
        _ => Ok(UserDataMessage::Other),
    }
}

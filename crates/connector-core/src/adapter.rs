//! The venue trait and its request types.

use crate::client_id::ClientIdCodec;
use crate::{ConnectorError, EventSender};
use async_trait::async_trait;
use execution_core::{ExchangeEvent, OrderUpdate};
use model::{ExchangeName, OrderSide, OrderType, SymbolInfo};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

/// How an order's size is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Base-asset quantity.
    Base(Decimal),
    /// Quote-asset amount to spend (market buys).
    Quote(Decimal),
}

/// One order to place, with values not yet rounded to the symbol's filters.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub client_id: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub sizing: Sizing,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

/// A limit-maker leg and a stop-limit leg placed as one OCO list.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Limit-maker leg price.
    pub price: Decimal,
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub limit_client_id: String,
    pub stop_client_id: String,
}

/// Everything the engine needs from a venue.
///
/// Placement and cancel calls return whatever acknowledgements the venue
/// gives synchronously; the caller feeds them to the engine like any other
/// event. Later transitions arrive through [`stream_events`] or
/// [`reconcile`].
///
/// [`stream_events`]: ExchangeAdapter::stream_events
/// [`reconcile`]: ExchangeAdapter::reconcile
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> ExchangeName;

    fn client_ids(&self) -> &ClientIdCodec;

    async fn place_order(&self, request: &OrderRequest)
        -> Result<Vec<ExchangeEvent>, ConnectorError>;

    async fn place_oco(&self, request: &OcoRequest) -> Result<Vec<ExchangeEvent>, ConnectorError>;

    /// Cancelling an order the venue no longer knows is not an error.
    async fn cancel_order(
        &self,
        symbol: &str,
        client_id: &str,
    ) -> Result<Vec<ExchangeEvent>, ConnectorError>;

    async fn get_asset_price(&self, symbol: &str) -> Result<Decimal, ConnectorError>;

    /// Free balance of `asset`.
    async fn get_asset_balance(&self, asset: &str) -> Result<Decimal, ConnectorError>;

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ConnectorError>;

    /// Recent orders for `symbol` carrying our client id tag, stamped with
    /// the venue's last update time.
    async fn reconcile(&self, symbol: &str) -> Result<Vec<OrderUpdate>, ConnectorError>;

    /// Run one push-stream session, forwarding order events to `sender`
    /// until the transport ends or `shutdown` flips to true. Returns `Ok`
    /// only on shutdown.
    async fn stream_events(
        &self,
        sender: EventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError>;

    /// Refresh whatever keeps the push stream authorised.
    async fn keep_alive(&self) -> Result<(), ConnectorError>;
}

pub type SharedAdapter = Arc<dyn ExchangeAdapter>;

//! Order placement and cancellation for one connection.
//!
//! Every placement records the order first, then sends it. If sending fails
//! the row is moved to ERROR and the venue's error is returned unchanged.
//! Acknowledgements returned by the venue are submitted to the engine before
//! the call returns.

use crate::adapter::{OcoRequest, OrderRequest, SharedAdapter, Sizing};
use crate::ConnectorError;
use execution_core::{ExchangeEvent, SharedEventSink, UpdateSource};
use model::{
    CallbackDescriptor, CallbackStatus, NewOrder, Order, OrderId, OrderSide, OrderStatus,
    OrderType, PositionId,
};
use order_store::SharedOrderStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

/// Where an order belongs and what to run when it settles.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub symbol: String,
    pub position: PositionId,
    pub callback: Option<CallbackDescriptor>,
    pub position_key: Option<String>,
}

impl Placement {
    pub fn new(symbol: impl Into<String>, position: PositionId) -> Self {
        Self {
            symbol: symbol.into(),
            position,
            callback: None,
            position_key: None,
        }
    }

    pub fn with_callback(mut self, callback: CallbackDescriptor) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_position_key(mut self, key: impl Into<String>) -> Self {
        self.position_key = Some(key.into());
        self
    }

    fn order(&self, order_type: OrderType, side: OrderSide) -> NewOrder {
        NewOrder::new(self.position, order_type, side)
            .callback(self.callback.clone())
            .position_key(self.position_key.clone())
    }
}

/// Per-leg callback and key of an OCO pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcoLeg {
    pub callback: Option<CallbackDescriptor>,
    pub position_key: Option<String>,
}

impl OcoLeg {
    pub fn new(callback: Option<CallbackDescriptor>) -> Self {
        Self {
            callback,
            position_key: None,
        }
    }

    pub fn with_position_key(mut self, key: impl Into<String>) -> Self {
        self.position_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcoPlacement {
    pub symbol: String,
    pub position: PositionId,
    pub quantity: Decimal,
    /// Limit-maker leg price.
    pub price: Decimal,
    pub stop_price: Decimal,
    /// Defaults from the stop price when unset.
    pub stop_limit_price: Option<Decimal>,
    pub limit: OcoLeg,
    pub stop: OcoLeg,
}

/// Limit price used below a falling stop.
fn below_stop(stop_price: Decimal) -> Decimal {
    (stop_price * dec!(0.9)).round_dp(8)
}

/// Limit price used above a rising stop.
fn above_stop(stop_price: Decimal) -> Decimal {
    (stop_price * dec!(1.1)).round_dp(8)
}

/// Order entry point for algorithms and operators, bound to one connection.
#[derive(Clone)]
pub struct OrderGateway {
    store: SharedOrderStore,
    adapter: SharedAdapter,
    sink: SharedEventSink,
}

impl OrderGateway {
    pub fn new(store: SharedOrderStore, adapter: SharedAdapter, sink: SharedEventSink) -> Self {
        Self {
            store,
            adapter,
            sink,
        }
    }

    pub fn adapter(&self) -> &SharedAdapter {
        &self.adapter
    }

    pub async fn new_order_market_buy(
        &self,
        placement: Placement,
        quote_quantity: Decimal,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::Market, OrderSide::Buy)
            .quote_quantity(quote_quantity);
        self.place(&placement.symbol, new, Sizing::Quote(quote_quantity))
            .await
    }

    pub async fn new_order_market_sell(
        &self,
        placement: Placement,
        quantity: Decimal,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::Market, OrderSide::Sell)
            .quantity(quantity);
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    pub async fn new_order_limit_buy(
        &self,
        placement: Placement,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::Limit, OrderSide::Buy)
            .quantity(quantity)
            .price(price);
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    pub async fn new_order_limit_sell(
        &self,
        placement: Placement,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::Limit, OrderSide::Sell)
            .quantity(quantity)
            .price(price);
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    /// Sell once the price falls to `stop_price`.
    pub async fn new_order_stop_down_limit_sell(
        &self,
        placement: Placement,
        quantity: Decimal,
        stop_price: Decimal,
        price: Option<Decimal>,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::StopLossLimit, OrderSide::Sell)
            .quantity(quantity)
            .stop_price(stop_price)
            .price(price.unwrap_or_else(|| below_stop(stop_price)));
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    /// Buy once the price rises to `stop_price`.
    pub async fn new_order_stop_up_limit_buy(
        &self,
        placement: Placement,
        quantity: Decimal,
        stop_price: Decimal,
        price: Option<Decimal>,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::StopLossLimit, OrderSide::Buy)
            .quantity(quantity)
            .stop_price(stop_price)
            .price(price.unwrap_or_else(|| above_stop(stop_price)));
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    /// Buy once the price falls to `stop_price`.
    pub async fn new_order_stop_down_limit_buy(
        &self,
        placement: Placement,
        quantity: Decimal,
        stop_price: Decimal,
        price: Option<Decimal>,
    ) -> Result<Order, ConnectorError> {
        let new = placement
            .order(OrderType::TakeProfitLimit, OrderSide::Buy)
            .quantity(quantity)
            .stop_price(stop_price)
            .price(price.unwrap_or_else(|| above_stop(stop_price)));
        self.place(&placement.symbol, new, Sizing::Base(quantity)).await
    }

    /// Returns `(limit_leg, stop_leg)`.
    pub async fn new_order_oco_buy(
        &self,
        placement: OcoPlacement,
    ) -> Result<(Order, Order), ConnectorError> {
        self.place_oco(placement, OrderSide::Buy).await
    }

    /// Returns `(limit_leg, stop_leg)`.
    pub async fn new_order_oco_sell(
        &self,
        placement: OcoPlacement,
    ) -> Result<(Order, Order), ConnectorError> {
        self.place_oco(placement, OrderSide::Sell).await
    }

    /// Cancel an ACTIVE order. Its callback, and its OCO sibling's, will not
    /// run. Orders in any other status are left alone.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), ConnectorError> {
        let order = self.store.order(order_id)?;
        if order.status != OrderStatus::Active {
            debug!(order_id = %order_id, status = %order.status, "cancel skipped, order not active");
            return Ok(());
        }

        if let Some(sibling) = order.oco_order {
            self.store
                .transition_callback(sibling, CallbackStatus::Waiting, CallbackStatus::Canceled)?;
        }
        self.store
            .transition_callback(order_id, CallbackStatus::Waiting, CallbackStatus::Canceled)?;

        let symbol = self.store.bot_for_order(order_id)?.symbol;
        let client_id = self.adapter.client_ids().encode(order_id);
        match self.adapter.cancel_order(&symbol, &client_id).await {
            Ok(acks) => {
                info!(order_id = %order_id, symbol = %symbol, "order cancel sent");
                self.feed(acks).await
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "order cancel failed");
                self.store.mark_error(order_id)?;
                Err(e)
            }
        }
    }

    async fn place(
        &self,
        symbol: &str,
        new: NewOrder,
        sizing: Sizing,
    ) -> Result<Order, ConnectorError> {
        let order = self.store.create_order(new)?;
        let request = OrderRequest {
            symbol: symbol.to_string(),
            client_id: self.adapter.client_ids().encode(order.id),
            order_type: order.order_type,
            side: order.side,
            sizing,
            price: order.price,
            stop_price: order.stop_price,
        };

        match self.adapter.place_order(&request).await {
            Ok(acks) => {
                info!(
                    order_id = %order.id,
                    symbol = %symbol,
                    order_type = %order.order_type,
                    side = %order.side,
                    "order placed"
                );
                self.feed(acks).await?;
                Ok(self.store.order(order.id)?)
            }
            Err(e) => {
                error!(order_id = %order.id, symbol = %symbol, error = %e, "order placement failed");
                self.store.mark_error(order.id)?;
                Err(e)
            }
        }
    }

    async fn place_oco(
        &self,
        placement: OcoPlacement,
        side: OrderSide,
    ) -> Result<(Order, Order), ConnectorError> {
        let stop_limit_price = placement.stop_limit_price.unwrap_or_else(|| match side {
            OrderSide::Buy => above_stop(placement.stop_price),
            OrderSide::Sell => below_stop(placement.stop_price),
        });

        let limit = NewOrder::new(placement.position, OrderType::LimitMaker, side)
            .quantity(placement.quantity)
            .price(placement.price)
            .callback(placement.limit.callback.clone())
            .position_key(placement.limit.position_key.clone());
        let stop = NewOrder::new(placement.position, OrderType::StopLossLimit, side)
            .quantity(placement.quantity)
            .price(stop_limit_price)
            .stop_price(placement.stop_price)
            .callback(placement.stop.callback.clone())
            .position_key(placement.stop.position_key.clone());
        let (limit, stop) = self.store.create_oco_pair(limit, stop)?;

        let codec = self.adapter.client_ids();
        let request = OcoRequest {
            symbol: placement.symbol.clone(),
            side,
            quantity: placement.quantity,
            price: placement.price,
            stop_price: placement.stop_price,
            stop_limit_price,
            limit_client_id: codec.encode(limit.id),
            stop_client_id: codec.encode(stop.id),
        };

        match self.adapter.place_oco(&request).await {
            Ok(acks) => {
                info!(
                    limit_order_id = %limit.id,
                    stop_order_id = %stop.id,
                    symbol = %placement.symbol,
                    side = %side,
                    "oco placed"
                );
                self.feed(acks).await?;
                Ok((self.store.order(limit.id)?, self.store.order(stop.id)?))
            }
            Err(e) => {
                error!(
                    limit_order_id = %limit.id,
                    stop_order_id = %stop.id,
                    error = %e,
                    "oco placement failed"
                );
                self.store.mark_error(limit.id)?;
                self.store.mark_error(stop.id)?;
                Err(e)
            }
        }
    }

    /// Submit acknowledgements to the engine.
    async fn feed(&self, acks: Vec<ExchangeEvent>) -> Result<(), ConnectorError> {
        for event in acks {
            let Some(order_id) = self.adapter.client_ids().decode(&event.client_order_id) else {
                warn!(client_order_id = %event.client_order_id, "ack for foreign client id dropped");
                continue;
            };
            self.sink
                .submit(event.into_update(order_id, UpdateSource::Ack))
                .await?;
        }
        Ok(())
    }
}

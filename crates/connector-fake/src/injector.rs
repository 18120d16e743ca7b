//! Hand-driven fills, cancels and expiries.
//!
//! Every injected event is stamped from the process-wide fake clock and
//! submitted like a stream event, so the usual guard and dispatch rules
//! apply.

use crate::clock::next_event_time;
use connector_core::{ConnectionRegistry, ConnectorError};
use execution_core::{
    ExchangeOrderStatus, OrderUpdate, SharedEventSink, TransitionOutcome, UpdateSource,
};
use model::{Bot, ExchangeName, FillAmounts, Order, OrderId, OrderStatus};
use rust_decimal::Decimal;
use tracing::info;

const FILL_DP: u32 = 8;

/// Optional values for an injected fill. Unset fields come from the order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillOverrides {
    /// Used when the order carries no price of its own.
    pub price: Option<Decimal>,
    pub filled_quantity: Option<Decimal>,
    pub quote_quantity: Option<Decimal>,
}

/// Manual fills, cancels and expiries for orders on FAKE connections.
#[derive(Clone)]
pub struct FakeInjector {
    registry: ConnectionRegistry,
    sink: SharedEventSink,
}

impl FakeInjector {
    pub fn new(registry: ConnectionRegistry, sink: SharedEventSink) -> Self {
        Self { registry, sink }
    }

    /// Reload an ACTIVE order on a FAKE connection, with its bot.
    fn active_fake_order(&self, order_id: OrderId) -> Result<(Order, Bot), ConnectorError> {
        let store = self.registry.store();
        let order = store.order(order_id)?;
        let bot = store.bot_for_order(order_id)?;
        let exchange = store.connection(bot.connection_id)?.exchange;
        if exchange != ExchangeName::Fake {
            return Err(ConnectorError::InvalidRequest(format!(
                "order {order_id} is on {exchange}, not FAKE"
            )));
        }
        if order.status != OrderStatus::Active {
            return Err(ConnectorError::OrderNotActive {
                order: order_id,
                status: order.status,
            });
        }
        Ok((order, bot))
    }

    async fn push(
        &self,
        update: OrderUpdate,
    ) -> Result<TransitionOutcome, ConnectorError> {
        let order_id = update.order_id;
        let status = update.status;
        let outcome = self.sink.submit(update).await?;
        info!(order_id = %order_id, status = %status, outcome = ?outcome, "fake event injected");
        Ok(outcome)
    }

    /// Fill an order completely.
    pub async fn fill(
        &self,
        order_id: OrderId,
        price: Option<Decimal>,
    ) -> Result<TransitionOutcome, ConnectorError> {
        self.fill_with(
            order_id,
            FillOverrides {
                price,
                ..Default::default()
            },
        )
        .await
    }

    /// Fill an order, optionally reporting a different size or notional
    /// than the order asked for.
    ///
    /// The fill price is, in order of preference: the order's stop price,
    /// its limit price, `overrides.price`, the ratio of both quantity
    /// overrides, the average of any recorded result, and finally the
    /// venue's quoted price.
    pub async fn fill_with(
        &self,
        order_id: OrderId,
        overrides: FillOverrides,
    ) -> Result<TransitionOutcome, ConnectorError> {
        let (order, bot) = self.active_fake_order(order_id)?;
        for (name, value) in [
            ("filled quantity", overrides.filled_quantity),
            ("quote quantity", overrides.quote_quantity),
        ] {
            if value.is_some_and(|v| v <= Decimal::ZERO) {
                return Err(ConnectorError::InvalidRequest(format!(
                    "{name} override must be positive"
                )));
            }
        }

        let average = |quote: Option<Decimal>, filled: Option<Decimal>| match (quote, filled) {
            (Some(quote), Some(filled)) if !filled.is_zero() => quote.checked_div(filled),
            _ => None,
        };
        let price = match order
            .stop_price
            .or(order.price)
            .or(overrides.price)
            .or_else(|| average(overrides.quote_quantity, overrides.filled_quantity))
            .or_else(|| average(order.result_quote_quantity, order.result_filled_quantity))
        {
            Some(price) => price,
            None => {
                self.registry
                    .adapter(bot.connection_id)?
                    .get_asset_price(&bot.symbol)
                    .await?
            }
        };
        if price <= Decimal::ZERO {
            return Err(ConnectorError::InvalidRequest(format!(
                "cannot fill order {order_id} at price {price}"
            )));
        }

        let sized = match (order.quantity, order.quote_quantity) {
            (Some(qty), Some(quote)) => Some((qty, quote)),
            (Some(qty), None) => qty.checked_mul(price).map(|quote| (qty, quote)),
            (None, Some(quote)) => quote.checked_div(price).map(|qty| (qty, quote)),
            (None, None) => match (overrides.filled_quantity, overrides.quote_quantity) {
                (Some(qty), Some(quote)) => Some((qty, quote)),
                _ => {
                    return Err(ConnectorError::InvalidRequest(format!(
                        "order {order_id} has no size"
                    )))
                }
            },
        };
        let (filled_quantity, quote_quantity) = sized.ok_or_else(|| {
            ConnectorError::InvalidRequest(format!(
                "order {order_id} cannot be sized at price {price}"
            ))
        })?;
        let fills = FillAmounts {
            filled_quantity: overrides
                .filled_quantity
                .unwrap_or(filled_quantity)
                .round_dp(FILL_DP),
            quote_quantity: overrides
                .quote_quantity
                .unwrap_or(quote_quantity)
                .round_dp(FILL_DP),
        };

        let update = OrderUpdate::new(
            order_id,
            ExchangeOrderStatus::Filled,
            next_event_time(),
            UpdateSource::Injected,
        )
        .with_fills(fills);
        self.push(update).await
    }

    /// Cancel an order and its still-active OCO sibling.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Vec<TransitionOutcome>, ConnectorError> {
        let (order, _) = self.active_fake_order(order_id)?;

        let mut targets = vec![order_id];
        if let Some(sibling) = order.oco_order {
            if self.registry.store().order(sibling)?.status == OrderStatus::Active {
                targets.push(sibling);
            }
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for id in targets {
            let update = OrderUpdate::new(
                id,
                ExchangeOrderStatus::Canceled,
                next_event_time(),
                UpdateSource::Injected,
            );
            outcomes.push(self.push(update).await?);
        }
        Ok(outcomes)
    }

    pub async fn expire(&self, order_id: OrderId) -> Result<TransitionOutcome, ConnectorError> {
        self.active_fake_order(order_id)?;
        let update = OrderUpdate::new(
            order_id,
            ExchangeOrderStatus::Expired,
            next_event_time(),
            UpdateSource::Injected,
        );
        self.push(update).await
    }
}

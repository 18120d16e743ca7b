//! Binance spot implementation of [`ExchangeAdapter`].
//!
//! Orders are snapped to the symbol's filters before they are sent.
//! Reconciliation queries recent orders per symbol and keeps only those
//! carrying this engine's client id tag.

use crate::rounding::{round_lot, round_price, round_quote};
use crate::symbols::{symbol_info, SymbolCache};
use crate::user_data_stream::run_session;
use async_trait::async_trait;
use auth::ApiCredentials;
use binance_rest::{
    BinanceEnvironment, BinanceRestClient, BinanceRestError, OcoParams, OrderParams, OrderReport,
};
use connector_core::{
    ClientIdCodec, ConnectorError, EventSender, ExchangeAdapter, OcoRequest, OrderRequest, Sizing,
};
use execution_core::{ExchangeEvent, ExchangeOrderStatus, OrderUpdate, TimeInForce, UpdateSource};
use metrics::SharedMetrics;
use model::{ExchangeConnection, ExchangeName, OrderSide, OrderType, SymbolInfo};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, warn};

fn exchange_error(err: BinanceRestError) -> ConnectorError {
    match err {
        BinanceRestError::Auth(e) => ConnectorError::InvalidRequest(e.to_string()),
        other => ConnectorError::Exchange {
            code: other.code(),
            retryable: other.is_retryable(),
            message: other.to_string(),
        },
    }
}

fn ack(report: OrderReport, fallback_time_ms: i64) -> ExchangeEvent {
    ExchangeEvent::new(
        report.client_order_id,
        report.symbol,
        ExchangeOrderStatus::parse_lenient(&report.status),
        report.transact_time.unwrap_or(fallback_time_ms),
    )
    .with_fills(report.executed_qty, report.cummulative_quote_qty)
}

/// Binance spot account behind one exchange connection.
pub struct BinanceAdapter {
    exchange: ExchangeName,
    environment: BinanceEnvironment,
    rest: BinanceRestClient,
    codec: ClientIdCodec,
    symbols: SymbolCache,
    /// Key of the current stream session, refreshed by `keep_alive`.
    listen_key: Mutex<Option<String>>,
    metrics: SharedMetrics,
}

impl BinanceAdapter {
    pub fn new(
        connection: &ExchangeConnection,
        codec: ClientIdCodec,
        metrics: SharedMetrics,
    ) -> Result<Self, ConnectorError> {
        let environment = BinanceEnvironment::for_exchange(connection.exchange)
            .ok_or(ConnectorError::UnsupportedExchange(connection.exchange))?;
        let credentials = ApiCredentials::from_connection(connection)
            .map_err(|e| ConnectorError::InvalidRequest(e.to_string()))?;
        let rest = BinanceRestClient::new(credentials, environment).map_err(exchange_error)?;

        Ok(Self {
            exchange: connection.exchange,
            environment,
            rest,
            codec,
            symbols: SymbolCache::default(),
            listen_key: Mutex::new(None),
            metrics,
        })
    }

    fn order_params(&self, symbol: &SymbolInfo, request: &OrderRequest) -> Result<OrderParams, ConnectorError> {
        let (quantity, quote_order_qty) = match (request.order_type, request.side, request.sizing) {
            (OrderType::Market, OrderSide::Buy, Sizing::Quote(quote)) => (None, Some(round_quote(symbol, quote)?)),
            (_, _, Sizing::Base(qty)) => (Some(round_lot(symbol, qty)?), None),
            (order_type, side, Sizing::Quote(_)) => {
                return Err(ConnectorError::InvalidRequest(format!(
                    "{side} {order_type} cannot be sized in quote"
                )))
            }
        };
        let time_in_force = match request.order_type {
            OrderType::Limit | OrderType::StopLossLimit | OrderType::TakeProfitLimit => {
                Some(TimeInForce::GTC)
            }
            _ => None,
        };

        Ok(OrderParams {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            client_order_id: request.client_id.clone(),
            quantity,
            quote_order_qty,
            price: request.price.map(|p| round_price(symbol, p)).transpose()?,
            stop_price: request.stop_price.map(|p| round_price(symbol, p)).transpose()?,
            time_in_force,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn exchange(&self) -> ExchangeName {
        self.exchange
    }

    fn client_ids(&self) -> &ClientIdCodec {
        &self.codec
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        let symbol = self.symbol_info(&request.symbol).await?;
        let params = self.order_params(&symbol, request)?;
        let report = self.rest.new_order(&params).await.map_err(exchange_error)?;
        Ok(vec![ack(report, self.rest.server_timestamp_ms())])
    }

    async fn place_oco(&self, request: &OcoRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        let symbol = self.symbol_info(&request.symbol).await?;
        let params = OcoParams {
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: round_lot(&symbol, request.quantity)?,
            price: round_price(&symbol, request.price)?,
            stop_price: round_price(&symbol, request.stop_price)?,
            stop_limit_price: round_price(&symbol, request.stop_limit_price)?,
            list_client_order_id: request.limit_client_id.clone(),
            limit_client_order_id: request.limit_client_id.clone(),
            stop_client_order_id: request.stop_client_id.clone(),
        };
        let response = self.rest.new_oco(&params).await.map_err(exchange_error)?;
        let time = response.transaction_time;
        Ok(response
            .order_reports
            .into_iter()
            .map(|report| ack(report, time))
            .collect())
    }

    async fn cancel_order(&self, symbol: &str, client_id: &str) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        let report = self
            .rest
            .cancel_order(symbol, client_id)
            .await
            .map_err(exchange_error)?;
        let now = self.rest.server_timestamp_ms();
        Ok(report.into_iter().map(|r| ack(r, now)).collect())
    }

    async fn get_asset_price(&self, symbol: &str) -> Result<Decimal, ConnectorError> {
        self.rest.avg_price(symbol).await.map_err(exchange_error)
    }

    async fn get_asset_balance(&self, asset: &str) -> Result<Decimal, ConnectorError> {
        let balance = self.rest.balance(asset).await.map_err(exchange_error)?;
        Ok(balance.map(|b| b.free).unwrap_or_default())
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ConnectorError> {
        if let Some(info) = self.symbols.get(symbol) {
            return Ok(info);
        }
        let entry = self
            .rest
            .symbol_entry(symbol)
            .await
            .map_err(exchange_error)?
            .ok_or_else(|| ConnectorError::UnknownSymbol(symbol.to_string()))?;
        let info = symbol_info(entry);
        debug!(symbol = %symbol, tick_size = %info.tick_size, step_size = %info.step_size, "symbol filters loaded");
        self.symbols.insert(info.clone());
        Ok(info)
    }

    async fn reconcile(&self, symbol: &str) -> Result<Vec<OrderUpdate>, ConnectorError> {
        let orders = self.rest.all_orders(symbol).await.map_err(exchange_error)?;
        let total = orders.len();
        let updates: Vec<OrderUpdate> = orders
            .into_iter()
            .filter_map(|order| {
                let order_id = self.codec.decode(&order.client_order_id)?;
                let event = ExchangeEvent::new(
                    order.client_order_id,
                    order.symbol,
                    ExchangeOrderStatus::parse_lenient(&order.status),
                    order.update_time,
                )
                .with_fills(order.executed_qty, order.cummulative_quote_qty);
                Some(event.into_update(order_id, UpdateSource::Reconcile))
            })
            .collect();
        debug!(symbol = %symbol, total, ours = updates.len(), "reconcile snapshot fetched");
        Ok(updates)
    }

    async fn stream_events(
        &self,
        sender: EventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        if let Err(e) = self.rest.sync_time().await {
            warn!(error = %e, "clock sync failed, keeping previous offset");
        }
        let listen_key = self.rest.create_listen_key().await.map_err(exchange_error)?;
        *self.listen_key.lock() = Some(listen_key.clone());

        let result = run_session(self.environment, &listen_key, sender, shutdown, &self.metrics).await;

        self.listen_key.lock().take();
        if let Err(e) = self.rest.close_listen_key(&listen_key).await {
            debug!(error = %e, "listen key close failed");
        }
        result
    }

    async fn keep_alive(&self) -> Result<(), ConnectorError> {
        let Some(listen_key) = self.listen_key.lock().clone() else {
            return Ok(());
        };
        match self.rest.keepalive_listen_key(&listen_key).await {
            Ok(()) => Ok(()),
            Err(BinanceRestError::ListenKeyExpired) => {
                warn!("listen key expired on refresh");
                Err(ConnectorError::ConnectionClosed)
            }
            Err(e) => Err(exchange_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ConnectionId;
    use rust_decimal_macros::dec;

    fn adapter() -> BinanceAdapter {
        let connection = ExchangeConnection {
            id: ConnectionId(1),
            exchange: ExchangeName::BinanceTest,
            api_key: "key".into(),
            api_secret: "secret".into(),
            commission: dec!(0.001),
        };
        BinanceAdapter::new(
            &connection,
            ClientIdCodec::new("tbotprod0001").unwrap(),
            metrics::create_metrics(),
        )
        .unwrap()
    }

    fn symbol() -> SymbolInfo {
        SymbolInfo {
            symbol: "BTCUSDT".into(),
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            tick_size: dec!(0.01),
            step_size: dec!(0.0001),
            min_qty: dec!(0.0001),
            min_notional: dec!(5),
            price: None,
        }
    }

    fn request(order_type: OrderType, side: OrderSide, sizing: Sizing) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            client_id: "tbotprod0001-3".into(),
            order_type,
            side,
            sizing,
            price: Some(dec!(27000.123)),
            stop_price: Some(dec!(30000.006)),
        }
    }

    #[test]
    fn test_market_buy_rounds_quote() {
        let params = adapter()
            .order_params(&symbol(), &request(OrderType::Market, OrderSide::Buy, Sizing::Quote(dec!(25.123456789))))
            .unwrap();
        assert_eq!(params.quote_order_qty, Some(dec!(25.123457)));
        assert_eq!(params.quantity, None);
        assert_eq!(params.time_in_force, None);
    }

    #[test]
    fn test_stop_limit_rounds_prices_and_sets_gtc() {
        let params = adapter()
            .order_params(&symbol(), &request(OrderType::TakeProfitLimit, OrderSide::Buy, Sizing::Base(dec!(0.12345))))
            .unwrap();
        assert_eq!(params.quantity, Some(dec!(0.1234)));
        assert_eq!(params.price, Some(dec!(27000.12)));
        assert_eq!(params.stop_price, Some(dec!(30000.01)));
        assert_eq!(params.time_in_force, Some(TimeInForce::GTC));
    }

    #[test]
    fn test_quote_sizing_only_for_market_buy() {
        let err = adapter()
            .order_params(&symbol(), &request(OrderType::Limit, OrderSide::Sell, Sizing::Quote(dec!(10))))
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidRequest(_)));
    }

    #[test]
    fn test_fake_connection_is_rejected() {
        let connection = ExchangeConnection {
            id: ConnectionId(2),
            exchange: ExchangeName::Fake,
            api_key: String::new(),
            api_secret: String::new(),
            commission: dec!(0),
        };
        let result = BinanceAdapter::new(
            &connection,
            ClientIdCodec::new("tbotprod0001").unwrap(),
            metrics::create_metrics(),
        );
        assert!(matches!(result, Err(ConnectorError::UnsupportedExchange(ExchangeName::Fake))));
    }

    #[test]
    fn test_balance_rejection_keeps_code() {
        let err = exchange_error(BinanceRestError::InsufficientBalance("no funds".into()));
        assert!(matches!(err, ConnectorError::Exchange { code: Some(-2010), retryable: false, .. }));
    }
}

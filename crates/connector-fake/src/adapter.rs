//! A venue that acknowledges everything and never trades by itself.

use crate::clock::next_event_time;
use async_trait::async_trait;
use connector_core::{
    ClientIdCodec, ConnectorError, EventSender, ExchangeAdapter, OcoRequest, OrderRequest,
};
use dashmap::DashMap;
use execution_core::{ExchangeEvent, ExchangeOrderStatus, OrderUpdate};
use model::{ExchangeName, SymbolInfo};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_FAKE_BALANCE: Decimal = dec!(1000000);

fn seed_symbol(symbol: &str, base: &str, quote: &str, price: Decimal) -> SymbolInfo {
    SymbolInfo {
        symbol: symbol.to_string(),
        base_asset: base.to_string(),
        quote_asset: quote.to_string(),
        tick_size: dec!(0.01),
        step_size: dec!(0.00001),
        min_qty: dec!(0.00001),
        min_notional: dec!(5),
        price: Some(price),
    }
}

/// Venue that accepts everything and never trades.
pub struct FakeAdapter {
    codec: ClientIdCodec,
    balance: Decimal,
    symbols: DashMap<String, SymbolInfo>,
}

impl FakeAdapter {
    /// Seeded with BTCUSDT and ETHUSDT.
    pub fn new(codec: ClientIdCodec, balance: Decimal) -> Self {
        let symbols = DashMap::new();
        for info in [
            seed_symbol("BTCUSDT", "BTC", "USDT", dec!(30000)),
            seed_symbol("ETHUSDT", "ETH", "USDT", dec!(2000)),
        ] {
            symbols.insert(info.symbol.clone(), info);
        }
        Self {
            codec,
            balance,
            symbols,
        }
    }

    /// Move the quoted price of a known symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) -> Result<(), ConnectorError> {
        let mut info = self
            .symbols
            .get_mut(symbol)
            .ok_or_else(|| ConnectorError::UnknownSymbol(symbol.to_string()))?;
        info.price = Some(price);
        Ok(())
    }

    fn ack(&self, client_id: &str, symbol: &str, status: ExchangeOrderStatus) -> ExchangeEvent {
        ExchangeEvent::new(client_id, symbol, status, next_event_time())
    }
}

#[async_trait]
impl ExchangeAdapter for FakeAdapter {
    fn exchange(&self) -> ExchangeName {
        ExchangeName::Fake
    }

    fn client_ids(&self) -> &ClientIdCodec {
        &self.codec
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        debug!(client_id = %request.client_id, order_type = %request.order_type, "fake order accepted");
        Ok(vec![self.ack(&request.client_id, &request.symbol, ExchangeOrderStatus::New)])
    }

    async fn place_oco(&self, request: &OcoRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        debug!(limit = %request.limit_client_id, stop = %request.stop_client_id, "fake oco accepted");
        Ok(vec![
            self.ack(&request.limit_client_id, &request.symbol, ExchangeOrderStatus::New),
            self.ack(&request.stop_client_id, &request.symbol, ExchangeOrderStatus::New),
        ])
    }

    async fn cancel_order(&self, symbol: &str, client_id: &str) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        Ok(vec![self.ack(client_id, symbol, ExchangeOrderStatus::Canceled)])
    }

    async fn get_asset_price(&self, symbol: &str) -> Result<Decimal, ConnectorError> {
        self.symbols
            .get(symbol)
            .and_then(|info| info.price)
            .ok_or_else(|| ConnectorError::UnknownSymbol(symbol.to_string()))
    }

    async fn get_asset_balance(&self, _asset: &str) -> Result<Decimal, ConnectorError> {
        Ok(self.balance)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ConnectorError> {
        self.symbols
            .get(symbol)
            .map(|info| info.clone())
            .ok_or_else(|| ConnectorError::UnknownSymbol(symbol.to_string()))
    }

    async fn reconcile(&self, _symbol: &str) -> Result<Vec<OrderUpdate>, ConnectorError> {
        Ok(Vec::new())
    }

    /// Nothing is ever pushed; idle until shutdown.
    async fn stream_events(
        &self,
        _sender: EventSender,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        info!("fake stream idle");
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn keep_alive(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_core::{create_event_channel, Sizing};
    use model::{OrderSide, OrderType};
    use std::time::Duration;

    fn adapter() -> FakeAdapter {
        FakeAdapter::new(ClientIdCodec::new("fakefake0001").unwrap(), DEFAULT_FAKE_BALANCE)
    }

    #[tokio::test]
    async fn test_placement_is_acknowledged_as_new() {
        let request = OrderRequest {
            symbol: "BTCUSDT".into(),
            client_id: "fakefake0001-1".into(),
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            sizing: Sizing::Base(dec!(1)),
            price: Some(dec!(100)),
            stop_price: None,
        };
        let acks = adapter().place_order(&request).await.unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].status, ExchangeOrderStatus::New);
        assert_eq!(acks[0].client_order_id, "fakefake0001-1");
    }

    #[tokio::test]
    async fn test_prices_and_balance() {
        let adapter = adapter();
        assert_eq!(adapter.get_asset_price("BTCUSDT").await.unwrap(), dec!(30000));
        adapter.set_price("BTCUSDT", dec!(25000)).unwrap();
        assert_eq!(adapter.get_asset_price("BTCUSDT").await.unwrap(), dec!(25000));
        assert!(matches!(
            adapter.get_asset_price("DOGEUSDT").await,
            Err(ConnectorError::UnknownSymbol(_))
        ));
        assert_eq!(adapter.get_asset_balance("USDT").await.unwrap(), dec!(1000000));
    }

    #[tokio::test]
    async fn test_stream_returns_on_shutdown() {
        let adapter = std::sync::Arc::new(adapter());
        let (tx, _rx) = create_event_channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn({
            let adapter = adapter.clone();
            async move { adapter.stream_events(tx, stop_rx).await }
        });
        stop_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}

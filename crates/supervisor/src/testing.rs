//! Scripted adapter and store fixtures for worker and supervisor tests.

use async_trait::async_trait;
use connector_core::{
    ClientIdCodec, ConnectorError, EventSender, ExchangeAdapter, OcoRequest, OrderRequest,
};
use execution_core::{
    AlgorithmInvoker, ExchangeEvent, Invocation, InvocationError, LifecycleEngine, OrderUpdate,
    SharedEventSink,
};
use model::{
    BotStatus, ConnectionId, ExchangeConnection, ExchangeName, NewOrder, Order, OrderSide,
    OrderStatus, OrderType, SymbolInfo,
};
use order_store::{MemoryOrderStore, SharedOrderStore, StatusChange};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const TAG: &str = "supvtests001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Wait for shutdown, then return Ok.
    Idle,
    /// Return `ConnectionClosed` right after the scripted events.
    Fail,
}

pub struct ScriptedAdapter {
    codec: ClientIdCodec,
    pub stream_events: Mutex<Vec<ExchangeEvent>>,
    pub reconcile_updates: Mutex<Vec<OrderUpdate>>,
    pub end: StreamEnd,
    pub sessions: AtomicUsize,
    pub keep_alives: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(end: StreamEnd) -> Self {
        Self {
            codec: ClientIdCodec::new(TAG).unwrap(),
            stream_events: Mutex::new(Vec::new()),
            reconcile_updates: Mutex::new(Vec::new()),
            end,
            sessions: AtomicUsize::new(0),
            keep_alives: AtomicUsize::new(0),
        }
    }

    fn unsupported() -> ConnectorError {
        ConnectorError::InvalidRequest("not scripted".into())
    }
}

#[async_trait]
impl ExchangeAdapter for ScriptedAdapter {
    fn exchange(&self) -> ExchangeName {
        ExchangeName::Fake
    }

    fn client_ids(&self) -> &ClientIdCodec {
        &self.codec
    }

    async fn place_order(&self, _request: &OrderRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        Err(Self::unsupported())
    }

    async fn place_oco(&self, _request: &OcoRequest) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        Err(Self::unsupported())
    }

    async fn cancel_order(&self, _symbol: &str, _client_id: &str) -> Result<Vec<ExchangeEvent>, ConnectorError> {
        Err(Self::unsupported())
    }

    async fn get_asset_price(&self, _symbol: &str) -> Result<Decimal, ConnectorError> {
        Ok(dec!(100))
    }

    async fn get_asset_balance(&self, _asset: &str) -> Result<Decimal, ConnectorError> {
        Ok(Decimal::ZERO)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ConnectorError> {
        Err(ConnectorError::UnknownSymbol(symbol.to_string()))
    }

    async fn reconcile(&self, _symbol: &str) -> Result<Vec<OrderUpdate>, ConnectorError> {
        Ok(std::mem::take(&mut *self.reconcile_updates.lock()))
    }

    async fn stream_events(
        &self,
        sender: EventSender,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let events = std::mem::take(&mut *self.stream_events.lock());
        for event in events {
            sender.send(event).await.map_err(|_| ConnectorError::ChannelClosed)?;
        }
        match self.end {
            StreamEnd::Fail => Err(ConnectorError::ConnectionClosed),
            StreamEnd::Idle => {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    async fn keep_alive(&self) -> Result<(), ConnectorError> {
        self.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingInvoker {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AlgorithmInvoker for CountingInvoker {
    async fn invoke(&self, _invocation: Invocation, _sink: SharedEventSink) -> Result<(), InvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Seeded {
    pub store: SharedOrderStore,
    pub engine: LifecycleEngine,
}

/// A store with one FAKE connection per id, each with an ON bot on BTCUSDT.
pub fn seeded(connections: &[ConnectionId]) -> Seeded {
    let store: SharedOrderStore = Arc::new(MemoryOrderStore::new());
    for &id in connections {
        store
            .insert_connection(ExchangeConnection {
                id,
                exchange: ExchangeName::Fake,
                api_key: String::new(),
                api_secret: String::new(),
                commission: dec!(0.001),
            })
            .unwrap();
        let bot = store
            .create_bot(id, "BTCUSDT", "TEST", serde_json::json!({}))
            .unwrap();
        store.set_bot_status(bot.id, BotStatus::On).unwrap();
    }
    let engine = LifecycleEngine::new(store.clone(), Arc::new(CountingInvoker::default()));
    Seeded { store, engine }
}

/// An ACTIVE limit order on the first bot of `connection`.
pub fn active_order(store: &SharedOrderStore, connection: ConnectionId) -> Order {
    let bot = store.bots_for_connection(connection).unwrap().remove(0);
    let round = store.create_round(bot.id).unwrap();
    let position = store.create_position(round.id).unwrap();
    let order = store
        .create_order(
            NewOrder::new(position.id, OrderType::Limit, OrderSide::Buy)
                .quantity(dec!(1))
                .price(dec!(100)),
        )
        .unwrap();
    store
        .compare_and_apply(order.id, &StatusChange::new(OrderStatus::Active, 1))
        .unwrap();
    store.order(order.id).unwrap()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

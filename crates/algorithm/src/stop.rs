//! Stopping a bot from outside a callback.

use crate::error::AlgorithmError;
use connector_core::ConnectionRegistry;
use execution_core::SharedEventSink;
use model::{Bot, BotId, BotStatus, OrderId};
use std::fmt;
use tracing::{error, info};

/// What happens to a stopped bot's ACTIVE orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Leave them resting. Their callbacks will not run while the bot is off.
    Freeze,
    /// Cancel them.
    Keep,
}

impl fmt::Display for StopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Freeze => "freeze",
            Self::Keep => "keep",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub canceled: Vec<OrderId>,
    pub failed: Vec<OrderId>,
}

/// Operator stop: switch an ON bot to OFF and apply `mode` to its open
/// orders. Cancels go through the gateway, so none of them run a callback.
pub async fn stop_bot(
    bot_id: BotId,
    mode: StopMode,
    connections: &ConnectionRegistry,
    sink: SharedEventSink,
) -> Result<StopReport, AlgorithmError> {
    let bot = connections.store().bot(bot_id)?;
    if !bot.is_on() {
        return Err(AlgorithmError::BotNotOn {
            bot: bot.id,
            status: bot.status,
        });
    }

    connections.store().set_bot_status(bot.id, BotStatus::Off)?;
    info!(bot_id = %bot.id, mode = %mode, "bot stopped by operator");

    match mode {
        StopMode::Freeze => Ok(StopReport::default()),
        StopMode::Keep => cancel_active_orders(&bot, connections, sink).await,
    }
}

/// Cancel every ACTIVE order of `bot`. A failed cancel is logged and the
/// rest are still attempted.
pub(crate) async fn cancel_active_orders(
    bot: &Bot,
    connections: &ConnectionRegistry,
    sink: SharedEventSink,
) -> Result<StopReport, AlgorithmError> {
    let gateway = connections.gateway(bot.connection_id, sink)?;
    let mut report = StopReport::default();
    for order in connections.store().active_orders_for_bot(bot.id)? {
        info!(bot_id = %bot.id, order_id = %order.id, "cancelling open order");
        match gateway.cancel_order(order.id).await {
            Ok(()) => report.canceled.push(order.id),
            Err(e) => {
                error!(bot_id = %bot.id, order_id = %order.id, error = %e, "cancel failed");
                report.failed.push(order.id);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlgorithmRegistry, StepTest};
    use connector_core::{AdapterFactory, ClientIdCodec, OrderGateway, Placement, SharedAdapter};
    use connector_fake::{FakeAdapter, FakeInjector, DEFAULT_FAKE_BALANCE};
    use execution_core::{LifecycleEngine, TransitionOutcome};
    use model::{
        CallbackDescriptor, CallbackStatus, ConnectionId, ExchangeConnection, ExchangeName,
        Order, OrderStatus,
    };
    use order_store::{MemoryOrderStore, SharedOrderStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const CONN: ConnectionId = ConnectionId(1);

    struct Fixture {
        store: SharedOrderStore,
        connections: ConnectionRegistry,
        engine: LifecycleEngine,
        gateway: OrderGateway,
        bot: Bot,
    }

    fn fixture() -> Fixture {
        let store: SharedOrderStore = Arc::new(MemoryOrderStore::new());
        store
            .insert_connection(ExchangeConnection {
                id: CONN,
                exchange: ExchangeName::Fake,
                api_key: String::new(),
                api_secret: String::new(),
                commission: dec!(0.001),
            })
            .unwrap();
        let bot = store
            .create_bot(CONN, "BTCUSDT", StepTest::TAG, serde_json::json!({}))
            .unwrap();
        store.set_bot_status(bot.id, BotStatus::On).unwrap();
        let bot = store.bot(bot.id).unwrap();

        let factory = AdapterFactory::new().with(ExchangeName::Fake, |_| {
            Ok(Arc::new(FakeAdapter::new(
                ClientIdCodec::new("stoptests001")?,
                DEFAULT_FAKE_BALANCE,
            )) as SharedAdapter)
        });
        let connections = ConnectionRegistry::new(store.clone(), factory);
        let registry = AlgorithmRegistry::new(connections.clone()).with(StepTest);
        let engine = LifecycleEngine::new(store.clone(), Arc::new(registry));

        Fixture {
            gateway: connections.gateway(CONN, engine.sink()).unwrap(),
            store,
            connections,
            engine,
            bot,
        }
    }

    async fn resting_buy(f: &Fixture) -> Order {
        let round = f.store.create_round(f.bot.id).unwrap();
        let position = f.store.create_position(round.id).unwrap();
        f.gateway
            .new_order_limit_buy(
                Placement::new("BTCUSDT", position.id)
                    .with_callback(CallbackDescriptor::new("step_test")),
                dec!(1),
                dec!(100),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_keep_cancels_open_orders_without_callbacks() {
        let f = fixture();
        let first = resting_buy(&f).await;
        let second = resting_buy(&f).await;

        let report = stop_bot(f.bot.id, StopMode::Keep, &f.connections, f.engine.sink())
            .await
            .unwrap();

        assert_eq!(report.canceled, vec![first.id, second.id]);
        assert!(report.failed.is_empty());
        assert_eq!(f.store.bot(f.bot.id).unwrap().status, BotStatus::Off);
        for id in [first.id, second.id] {
            let order = f.store.order(id).unwrap();
            assert_eq!(order.status, OrderStatus::Canceled);
            assert_eq!(order.callback_status, CallbackStatus::Canceled);
        }
    }

    #[tokio::test]
    async fn test_freeze_leaves_orders_resting() {
        let f = fixture();
        let order = resting_buy(&f).await;

        let report = stop_bot(f.bot.id, StopMode::Freeze, &f.connections, f.engine.sink())
            .await
            .unwrap();
        assert_eq!(report, StopReport::default());
        assert_eq!(f.store.bot(f.bot.id).unwrap().status, BotStatus::Off);
        assert_eq!(f.store.order(order.id).unwrap().status, OrderStatus::Active);

        let injector = FakeInjector::new(f.connections.clone(), f.engine.sink());
        let outcome = injector.fill(order.id, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(
            f.store.order(order.id).unwrap().callback_status,
            CallbackStatus::Waiting
        );
    }

    #[tokio::test]
    async fn test_only_running_bots_can_be_stopped() {
        let f = fixture();
        f.store.set_bot_status(f.bot.id, BotStatus::Canceled).unwrap();

        let err = stop_bot(f.bot.id, StopMode::Keep, &f.connections, f.engine.sink())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AlgorithmError::BotNotOn {
                status: BotStatus::Canceled,
                ..
            }
        ));
    }
}

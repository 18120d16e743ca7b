//! Routes settled orders to their bot's algorithm.
//!
//! Before any method runs, a bot whose orders were canceled from outside is
//! switched to CANCELED and its remaining orders are cancelled.

use crate::algorithm::{Algorithm, SharedAlgorithm};
use crate::context::AlgorithmContext;
use crate::error::AlgorithmError;
use async_trait::async_trait;
use connector_core::ConnectionRegistry;
use execution_core::{AlgorithmInvoker, Invocation, InvocationError, SharedEventSink};
use model::{Order, OrderStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STEP_TEST: &str = "step_test";

/// Resolves `bot.algorithm` to a registered [`Algorithm`] and runs callbacks
/// against it.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, SharedAlgorithm>,
    connections: ConnectionRegistry,
}

impl AlgorithmRegistry {
    pub fn new(connections: ConnectionRegistry) -> Self {
        Self {
            algorithms: HashMap::new(),
            connections,
        }
    }

    pub fn with<A: Algorithm + 'static>(mut self, algorithm: A) -> Self {
        self.register(Arc::new(algorithm));
        self
    }

    pub fn register(&mut self, algorithm: SharedAlgorithm) {
        self.algorithms.insert(algorithm.tag().to_string(), algorithm);
    }

    pub fn get(&self, tag: &str) -> Option<&SharedAlgorithm> {
        self.algorithms.get(tag)
    }

    /// A CANCELED order whose sibling (if any) is also CANCELED was pulled
    /// from outside the engine; the bot stops instead of reacting.
    fn cancels_bot(&self, order: &Order) -> Result<bool, AlgorithmError> {
        if order.status != OrderStatus::Canceled {
            return Ok(false);
        }
        match order.oco_order {
            None => Ok(true),
            Some(sibling) => {
                Ok(self.connections.store().order(sibling)?.status == OrderStatus::Canceled)
            }
        }
    }
}

#[async_trait]
impl AlgorithmInvoker for AlgorithmRegistry {
    async fn invoke(
        &self,
        invocation: Invocation,
        sink: SharedEventSink,
    ) -> Result<(), InvocationError> {
        let algorithm = self
            .algorithms
            .get(&invocation.bot.algorithm)
            .cloned()
            .ok_or_else(|| InvocationError::UnknownAlgorithm(invocation.bot.algorithm.clone()))?;
        let ctx = AlgorithmContext::new(invocation.bot.clone(), self.connections.clone(), sink);

        if self.cancels_bot(&invocation.order)? {
            warn!(
                bot_id = %invocation.bot.id,
                order_id = %invocation.order.id,
                "order canceled externally, stopping bot"
            );
            ctx.stop(true).await?;
            return Ok(());
        }

        let method = invocation.callback.method.as_str();
        if method == STEP_TEST {
            info!(
                bot_id = %invocation.bot.id,
                order_id = %invocation.order.id,
                status = %invocation.order.status,
                order = ?invocation.order,
                "step_test"
            );
            return Ok(());
        }

        debug!(
            bot_id = %invocation.bot.id,
            algorithm = %algorithm.tag(),
            method = %method,
            "invoking callback"
        );
        algorithm.call(method, invocation.arguments(), &ctx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Arguments;
    use crate::StepTest;
    use connector_core::{AdapterFactory, ClientIdCodec, OcoLeg, OcoPlacement, OrderGateway, Placement, SharedAdapter};
    use connector_fake::{FakeAdapter, FakeInjector, DEFAULT_FAKE_BALANCE};
    use execution_core::{DispatchOutcome, LifecycleEngine, TransitionOutcome};
    use model::{
        BotId, BotStatus, CallbackDescriptor, CallbackStatus, ConnectionId, ExchangeConnection,
        ExchangeName, PositionId,
    };
    use order_store::{MemoryOrderStore, SharedOrderStore};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    const CONN: ConnectionId = ConnectionId(1);

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Arguments)>>,
    }

    #[async_trait]
    impl Algorithm for Recording {
        fn tag(&self) -> &str {
            "REC"
        }

        async fn call(
            &self,
            method: &str,
            args: Arguments,
            ctx: &AlgorithmContext,
        ) -> Result<(), AlgorithmError> {
            match method {
                "bought" => {
                    self.calls.lock().push((method.to_string(), args));
                    Ok(())
                }
                "halt" => {
                    self.calls.lock().push((method.to_string(), args));
                    ctx.stop(false).await
                }
                _ => Err(AlgorithmError::unknown_method(self.tag(), method)),
            }
        }
    }

    struct Fixture {
        store: SharedOrderStore,
        recording: Arc<Recording>,
        gateway: OrderGateway,
        injector: FakeInjector,
        bot: BotId,
        position: PositionId,
    }

    fn fixture(algorithm: &str) -> Fixture {
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
            .create_bot(CONN, "BTCUSDT", algorithm, serde_json::json!({}))
            .unwrap();
        store.set_bot_status(bot.id, BotStatus::On).unwrap();
        let round = store.create_round(bot.id).unwrap();
        let position = store.create_position(round.id).unwrap();

        let factory = AdapterFactory::new().with(ExchangeName::Fake, |_| {
            Ok(Arc::new(FakeAdapter::new(
                ClientIdCodec::new("algotests001")?,
                DEFAULT_FAKE_BALANCE,
            )) as SharedAdapter)
        });
        let connections = ConnectionRegistry::new(store.clone(), factory);
        let recording = Arc::new(Recording::default());
        let mut registry = AlgorithmRegistry::new(connections.clone()).with(StepTest);
        registry.register(recording.clone());
        let engine = LifecycleEngine::new(store.clone(), Arc::new(registry));

        Fixture {
            gateway: connections.gateway(CONN, engine.sink()).unwrap(),
            injector: FakeInjector::new(connections, engine.sink()),
            store,
            recording,
            bot: bot.id,
            position: position.id,
        }
    }

    fn placement(f: &Fixture, callback: CallbackDescriptor) -> Placement {
        Placement::new("BTCUSDT", f.position).with_callback(callback)
    }

    #[tokio::test]
    async fn test_callback_receives_params_and_order() {
        let f = fixture("REC");
        let order = f
            .gateway
            .new_order_limit_buy(
                placement(&f, CallbackDescriptor::new("bought").with_param("level", 2)),
                dec!(1),
                dec!(100),
            )
            .await
            .unwrap();

        let outcome = f.injector.fill(order.id, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Dispatched(DispatchOutcome::Done));

        let calls = f.recording.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        let (method, args) = &calls[0];
        assert_eq!(method, "bought");
        assert_eq!(args["level"], serde_json::json!(2));
        assert!(args["order"].is_object());
    }

    #[tokio::test]
    async fn test_step_test_is_a_base_method() {
        let f = fixture(StepTest::TAG);
        let order = f
            .gateway
            .new_order_market_sell(placement(&f, CallbackDescriptor::new("step_test")), dec!(1))
            .await
            .unwrap();

        f.injector.fill(order.id, Some(dec!(50))).await.unwrap();
        assert_eq!(f.store.order(order.id).unwrap().callback_status, CallbackStatus::Done);
    }

    #[tokio::test]
    async fn test_unknown_method_records_error() {
        let f = fixture(StepTest::TAG);
        let order = f
            .gateway
            .new_order_limit_sell(placement(&f, CallbackDescriptor::new("bought")), dec!(1), dec!(100))
            .await
            .unwrap();

        let outcome = f.injector.fill(order.id, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Dispatched(DispatchOutcome::Failed));
        assert_eq!(f.store.order(order.id).unwrap().callback_status, CallbackStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_algorithm_records_error() {
        let f = fixture("MISSING");
        let order = f
            .gateway
            .new_order_limit_sell(placement(&f, CallbackDescriptor::new("bought")), dec!(1), dec!(100))
            .await
            .unwrap();

        let outcome = f.injector.fill(order.id, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Dispatched(DispatchOutcome::Failed));
    }

    #[tokio::test]
    async fn test_external_cancel_stops_bot_and_cancels_the_rest() {
        let f = fixture("REC");
        let pulled = f
            .gateway
            .new_order_limit_buy(placement(&f, CallbackDescriptor::new("bought")), dec!(1), dec!(100))
            .await
            .unwrap();
        let resting = f
            .gateway
            .new_order_limit_buy(placement(&f, CallbackDescriptor::new("bought")), dec!(1), dec!(90))
            .await
            .unwrap();

        f.injector.cancel(pulled.id).await.unwrap();

        assert_eq!(f.store.bot(f.bot).unwrap().status, BotStatus::Canceled);
        assert_eq!(f.store.order(pulled.id).unwrap().callback_status, CallbackStatus::Done);
        let resting = f.store.order(resting.id).unwrap();
        assert_eq!(resting.status, OrderStatus::Canceled);
        assert_eq!(resting.callback_status, CallbackStatus::Canceled);
        assert!(f.recording.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_oco_stops_bot_only_when_both_legs_canceled() {
        let f = fixture("REC");
        let (limit, stop) = f
            .gateway
            .new_order_oco_sell(OcoPlacement {
                symbol: "BTCUSDT".into(),
                position: f.position,
                quantity: dec!(1),
                price: dec!(120),
                stop_price: dec!(90),
                stop_limit_price: None,
                limit: OcoLeg::new(Some(CallbackDescriptor::new("bought"))),
                stop: OcoLeg::new(Some(CallbackDescriptor::new("bought"))),
            })
            .await
            .unwrap();

        // Stop leg expires while the limit leg rests: nothing happens yet.
        f.injector.expire(stop.id).await.unwrap();
        assert_eq!(f.store.bot(f.bot).unwrap().status, BotStatus::On);

        // Limit leg canceled: the sibling is EXPIRED, not CANCELED, so the
        // callback runs normally.
        f.injector.cancel(limit.id).await.unwrap();
        assert_eq!(f.store.bot(f.bot).unwrap().status, BotStatus::On);
        assert_eq!(f.recording.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_oco_both_legs_canceled_stops_bot() {
        let f = fixture("REC");
        let (limit, _stop) = f
            .gateway
            .new_order_oco_buy(OcoPlacement {
                symbol: "BTCUSDT".into(),
                position: f.position,
                quantity: dec!(1),
                price: dec!(80),
                stop_price: dec!(110),
                stop_limit_price: None,
                limit: OcoLeg::new(Some(CallbackDescriptor::new("bought"))),
                stop: OcoLeg::new(Some(CallbackDescriptor::new("bought"))),
            })
            .await
            .unwrap();

        f.injector.cancel(limit.id).await.unwrap();
        assert_eq!(f.store.bot(f.bot).unwrap().status, BotStatus::Canceled);
        assert!(f.recording.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stop_from_callback_turns_bot_off() {
        let f = fixture("REC");
        let trigger = f
            .gateway
            .new_order_limit_buy(placement(&f, CallbackDescriptor::new("halt")), dec!(1), dec!(100))
            .await
            .unwrap();
        let other = f
            .gateway
            .new_order_limit_sell(placement(&f, CallbackDescriptor::new("bought")), dec!(1), dec!(200))
            .await
            .unwrap();

        f.injector.fill(trigger.id, None).await.unwrap();

        assert_eq!(f.store.bot(f.bot).unwrap().status, BotStatus::Off);
        assert_eq!(f.store.order(other.id).unwrap().status, OrderStatus::Canceled);
        assert_eq!(f.store.order(trigger.id).unwrap().callback_status, CallbackStatus::Done);
    }
}

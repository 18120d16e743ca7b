//! Runs each order's callback at most once, honouring OCO pairing.
//!
//! Dispatch has two phases. The decision phase resolves the OCO rules and
//! claims the callback by moving it out of WAITING; for a linked pair it runs
//! under a per-pair lock so both legs never decide at the same time. The
//! invocation phase runs outside any lock.

use crate::engine::SharedEventSink;
use crate::error::EngineError;
use crate::invoker::{Invocation, SharedInvoker};
use dashmap::DashMap;
use metrics::SharedMetrics;
use model::{CallbackStatus, Order, OrderId, OrderStatus};
use order_store::SharedOrderStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Callback already left WAITING.
    Skipped,
    /// Callback ran (or there was none) and is DONE.
    Done,
    /// Callback raised; status is ERROR.
    Failed,
    /// OCO sibling still resting; decide when it settles.
    Deferred,
    /// The sibling owns the pair's callback.
    OcoCanceled,
}

/// Decision reached under the pair lock.
enum Claim {
    Settled(DispatchOutcome),
    /// Claimed WAITING -> STARTED; invoke next.
    Invoke(Order),
}

#[derive(Clone)]
pub struct CallbackDispatcher {
    store: SharedOrderStore,
    invoker: SharedInvoker,
    metrics: SharedMetrics,
    pair_locks: Arc<DashMap<OrderId, Arc<Mutex<()>>>>,
}

impl CallbackDispatcher {
    pub fn new(store: SharedOrderStore, invoker: SharedInvoker, metrics: SharedMetrics) -> Self {
        Self {
            store,
            invoker,
            metrics,
            pair_locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn dispatch(
        &self,
        order_id: OrderId,
        sink: SharedEventSink,
    ) -> Result<DispatchOutcome, EngineError> {
        let claim = match self.store.order(order_id)?.oco_order {
            None => self.claim(order_id)?,
            Some(sibling) => {
                let key = order_id.min(sibling);
                let lock = self
                    .pair_locks
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let claim = {
                    let _guard = lock.lock().await;
                    self.decide_oco(order_id, sibling)
                };
                drop(lock);
                self.pair_locks
                    .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
                claim?
            }
        };

        match claim {
            Claim::Settled(outcome) => Ok(outcome),
            Claim::Invoke(order) => self.invoke(order, sink).await,
        }
    }

    /// OCO rules. Returns with this leg's callback claimed or settled.
    fn decide_oco(&self, order_id: OrderId, sibling_id: OrderId) -> Result<Claim, EngineError> {
        let order = self.store.order(order_id)?;
        if order.callback_status != CallbackStatus::Waiting {
            return Ok(Claim::Settled(DispatchOutcome::Skipped));
        }

        let sibling = self.store.order(sibling_id)?;
        let filled = order.status == OrderStatus::Filled;

        if !filled && sibling.status == OrderStatus::Active {
            debug!(order_id = %order_id, sibling_id = %sibling_id, "oco sibling still active, deferring");
            return Ok(Claim::Settled(DispatchOutcome::Deferred));
        }
        if !filled && sibling.status == OrderStatus::Filled {
            return self.oco_cancel(order_id);
        }

        self.store.transition_callback(
            sibling_id,
            CallbackStatus::Waiting,
            CallbackStatus::OcoCanceled,
        )?;
        let sibling = self.store.order(sibling_id)?;
        if sibling.callback_status.was_invoked() {
            return self.oco_cancel(order_id);
        }

        self.claim(order_id)
    }

    fn oco_cancel(&self, order_id: OrderId) -> Result<Claim, EngineError> {
        let moved = self.store.transition_callback(
            order_id,
            CallbackStatus::Waiting,
            CallbackStatus::OcoCanceled,
        )?;
        let outcome = if moved {
            info!(order_id = %order_id, "callback oco-canceled");
            DispatchOutcome::OcoCanceled
        } else {
            DispatchOutcome::Skipped
        };
        Ok(Claim::Settled(outcome))
    }

    /// Move the callback out of WAITING: straight to DONE when there is
    /// nothing to run, otherwise to STARTED.
    fn claim(&self, order_id: OrderId) -> Result<Claim, EngineError> {
        let order = self.store.order(order_id)?;
        if order.callback_status != CallbackStatus::Waiting {
            return Ok(Claim::Settled(DispatchOutcome::Skipped));
        }

        if order.callback.is_none() {
            let moved =
                self.store
                    .transition_callback(order_id, CallbackStatus::Waiting, CallbackStatus::Done)?;
            return Ok(Claim::Settled(if moved {
                DispatchOutcome::Done
            } else {
                DispatchOutcome::Skipped
            }));
        }

        if !self
            .store
            .transition_callback(order_id, CallbackStatus::Waiting, CallbackStatus::Started)?
        {
            return Ok(Claim::Settled(DispatchOutcome::Skipped));
        }
        Ok(Claim::Invoke(order))
    }

    async fn invoke(
        &self,
        order: Order,
        sink: SharedEventSink,
    ) -> Result<DispatchOutcome, EngineError> {
        let Some(callback) = order.callback.clone() else {
            return Ok(DispatchOutcome::Skipped);
        };
        let bot = self.store.bot_for_order(order.id)?;
        let order_id = order.id;
        let method = callback.method.clone();

        debug!(order_id = %order_id, bot_id = %bot.id, method = %method, "invoking callback");
        let invocation = Invocation {
            bot,
            order,
            callback,
        };

        match self.invoker.invoke(invocation, sink).await {
            Ok(()) => {
                self.store.transition_callback(
                    order_id,
                    CallbackStatus::Started,
                    CallbackStatus::Done,
                )?;
                self.metrics.inc_callbacks_done();
                Ok(DispatchOutcome::Done)
            }
            Err(e) => {
                error!(order_id = %order_id, method = %method, error = %e, "callback failed");
                self.store.transition_callback(
                    order_id,
                    CallbackStatus::Started,
                    CallbackStatus::Error,
                )?;
                self.metrics.inc_callbacks_failed();
                Ok(DispatchOutcome::Failed)
            }
        }
    }
}

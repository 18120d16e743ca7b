//! The single entry point for exchange-sourced order transitions.

use crate::dispatcher::{CallbackDispatcher, DispatchOutcome};
use crate::error::EngineError;
use crate::execution::OrderUpdate;
use crate::invoker::SharedInvoker;
use crate::transition::TransitionOutcome;
use async_trait::async_trait;
use metrics::{create_metrics, SharedMetrics};
use model::{OrderId, OrderStatus};
use order_store::{ApplyOutcome, SharedOrderStore, StatusChange};
use std::sync::Arc;
use tracing::{debug, info};

/// Anything that accepts correlated order updates.
#[async_trait]
pub trait OrderEventSink: Send + Sync {
    async fn submit(&self, update: OrderUpdate) -> Result<TransitionOutcome, EngineError>;
}

pub type SharedEventSink = Arc<dyn OrderEventSink>;

/// Applies updates to the store and hands terminal ones to the dispatcher.
///
/// Cheap to clone; clones share the store, invoker and metrics.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: SharedOrderStore,
    dispatcher: CallbackDispatcher,
    metrics: SharedMetrics,
}

impl LifecycleEngine {
    pub fn new(store: SharedOrderStore, invoker: SharedInvoker) -> Self {
        Self::with_metrics(store, invoker, create_metrics())
    }

    pub fn with_metrics(
        store: SharedOrderStore,
        invoker: SharedInvoker,
        metrics: SharedMetrics,
    ) -> Self {
        let dispatcher = CallbackDispatcher::new(store.clone(), invoker, metrics.clone());
        Self {
            store,
            dispatcher,
            metrics,
        }
    }

    pub fn store(&self) -> &SharedOrderStore {
        &self.store
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// This engine as a sink for code it calls back into.
    pub fn sink(&self) -> SharedEventSink {
        Arc::new(self.clone())
    }

    pub async fn submit(&self, update: OrderUpdate) -> Result<TransitionOutcome, EngineError> {
        let order_id = update.order_id;
        let Some(status) = update.status.to_internal() else {
            debug!(order_id = %order_id, status = %update.status, "exchange status ignored");
            return Ok(TransitionOutcome::Ignored);
        };

        let change = StatusChange::new(status, update.event_time_ms).with_fills(update.fills);
        let order = match self.store.compare_and_apply(order_id, &change)? {
            ApplyOutcome::Applied(order) => order,
            other => {
                if other == ApplyOutcome::Stale {
                    self.metrics.inc_stale_rejected();
                }
                debug!(
                    order_id = %order_id,
                    status = %status,
                    event_time_ms = update.event_time_ms,
                    source = %update.source,
                    outcome = ?other,
                    "transition not applied"
                );
                return Ok(TransitionOutcome::from_unapplied(other).unwrap_or(TransitionOutcome::Stale));
            }
        };

        self.metrics.inc_transitions_applied();
        info!(
            order_id = %order_id,
            status = %order.status,
            event_time_ms = update.event_time_ms,
            source = %update.source,
            "order transition applied"
        );

        if status == OrderStatus::Expired && order.is_oco() {
            return Ok(TransitionOutcome::Suppressed);
        }
        if status == OrderStatus::Active {
            return Ok(TransitionOutcome::Recorded);
        }

        let bot = self.store.bot_for_order(order_id)?;
        if !bot.is_on() {
            debug!(order_id = %order_id, bot_id = %bot.id, bot_status = %bot.status, "bot not on, callback not dispatched");
            return Ok(TransitionOutcome::Applied);
        }

        let outcome = self.dispatcher.dispatch(order_id, self.sink()).await?;
        Ok(TransitionOutcome::Dispatched(outcome))
    }

    /// Put a failed callback back to WAITING and dispatch it again, whatever
    /// the bot's status. The order must be settled and its callback ERROR or
    /// stuck in STARTED.
    pub async fn replay_callback(&self, order_id: OrderId) -> Result<DispatchOutcome, EngineError> {
        let order = self.store.reset_callback(order_id)?;
        info!(order_id = %order_id, status = %order.status, "replaying callback");
        self.dispatcher.dispatch(order_id, self.sink()).await
    }
}

#[async_trait]
impl OrderEventSink for LifecycleEngine {
    async fn submit(&self, update: OrderUpdate) -> Result<TransitionOutcome, EngineError> {
        LifecycleEngine::submit(self, update).await
    }
}

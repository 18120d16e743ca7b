//! The order registry contract.

use crate::error::StoreError;
use model::{
    Bot, BotId, BotStatus, CallbackStatus, ConnectionId, ExchangeConnection, FillAmounts,
    NewOrder, Order, OrderId, OrderStatus, Position, PositionId, Round, RoundId,
};
use std::sync::Arc;

/// A status write sourced from the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: OrderStatus,
    /// Exchange event time in milliseconds; becomes the row's `updated_at`.
    pub event_time_ms: i64,
    pub fills: Option<FillAmounts>,
}

impl StatusChange {
    pub fn new(status: OrderStatus, event_time_ms: i64) -> Self {
        Self {
            status,
            event_time_ms,
            fills: None,
        }
    }

    pub fn with_fills(mut self, fills: Option<FillAmounts>) -> Self {
        self.fills = fills;
        self
    }
}

/// Result of [`OrderStore::compare_and_apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The write took effect; carries the updated row.
    Applied(Order),
    /// The row already holds an event at least as new.
    Stale,
    /// The row is already in the requested status.
    Unchanged,
    /// The move would go backward or leave a terminal status.
    Rejected { from: OrderStatus, to: OrderStatus },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Persisted connection/bot/round/position/order hierarchy.
///
/// Every mutation of a single order row is atomic. [`compare_and_apply`] is
/// the only path exchange events take into the store.
///
/// [`compare_and_apply`]: OrderStore::compare_and_apply
pub trait OrderStore: Send + Sync {
    fn insert_connection(&self, connection: ExchangeConnection) -> Result<(), StoreError>;

    fn connection(&self, id: ConnectionId) -> Result<ExchangeConnection, StoreError>;

    /// Create a bot in status OFF.
    fn create_bot(
        &self,
        connection_id: ConnectionId,
        symbol: &str,
        algorithm: &str,
        params: serde_json::Value,
    ) -> Result<Bot, StoreError>;

    fn bot(&self, id: BotId) -> Result<Bot, StoreError>;

    fn bots_for_connection(&self, id: ConnectionId) -> Result<Vec<Bot>, StoreError>;

    fn set_bot_status(&self, id: BotId, status: BotStatus) -> Result<(), StoreError>;

    fn create_round(&self, bot_id: BotId) -> Result<Round, StoreError>;

    fn latest_round(&self, bot_id: BotId) -> Result<Option<Round>, StoreError>;

    fn create_position(&self, round_id: RoundId) -> Result<Position, StoreError>;

    /// Record a placement attempt as a NEW order with callback WAITING.
    fn create_order(&self, new: NewOrder) -> Result<Order, StoreError>;

    /// Record two linked placement attempts. The returned rows reference
    /// each other.
    fn create_oco_pair(&self, first: NewOrder, second: NewOrder)
        -> Result<(Order, Order), StoreError>;

    fn order(&self, id: OrderId) -> Result<Order, StoreError>;

    fn order_by_position_key(
        &self,
        position_id: PositionId,
        key: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Apply `change` only if the row's `updated_at` is unset or strictly
    /// older than the event time and the status moves forward.
    fn compare_and_apply(&self, id: OrderId, change: &StatusChange)
        -> Result<ApplyOutcome, StoreError>;

    /// Unconditionally move to ERROR. Used when placement fails.
    fn mark_error(&self, id: OrderId) -> Result<Order, StoreError>;

    /// Move the callback status from `from` to `to`. Returns `false` when the
    /// row is not in `from`. Entering STARTED stamps `callback_at_ms`.
    fn transition_callback(
        &self,
        id: OrderId,
        from: CallbackStatus,
        to: CallbackStatus,
    ) -> Result<bool, StoreError>;

    /// Put the callback back to WAITING so it can be replayed. Only a
    /// terminal order whose callback is ERROR or stuck in STARTED qualifies;
    /// anything else is [`StoreError::NotReplayable`].
    fn reset_callback(&self, id: OrderId) -> Result<Order, StoreError>;

    fn active_orders_for_bot(&self, bot_id: BotId) -> Result<Vec<Order>, StoreError>;

    /// Bot that owns the order through its position and round.
    fn bot_for_order(&self, id: OrderId) -> Result<Bot, StoreError>;

    /// Connections whose bots hold at least one NEW or ACTIVE order.
    fn connections_with_open_interest(&self) -> Result<Vec<ConnectionId>, StoreError>;
}

pub type SharedOrderStore = Arc<dyn OrderStore>;

pub(crate) fn check_replayable(order: &Order) -> Result<(), StoreError> {
    let stuck = matches!(
        order.callback_status,
        CallbackStatus::Error | CallbackStatus::Started
    );
    if stuck && order.status.is_terminal() {
        return Ok(());
    }
    Err(StoreError::NotReplayable {
        order: order.id,
        status: order.status,
        callback: order.callback_status,
    })
}

/// Decide what `change` does to `current`, before any write.
pub(crate) fn evaluate(current: &Order, change: &StatusChange) -> Option<ApplyOutcome> {
    if let Some(updated_at) = current.updated_at_ms {
        if updated_at >= change.event_time_ms {
            return Some(ApplyOutcome::Stale);
        }
    }
    if current.status == change.status {
        return Some(ApplyOutcome::Unchanged);
    }
    if !current.status.can_advance_to(change.status) {
        return Some(ApplyOutcome::Rejected {
            from: current.status,
            to: change.status,
        });
    }
    None
}

/// Apply an accepted change to an in-memory row.
pub(crate) fn apply(order: &mut Order, change: &StatusChange) {
    order.status = change.status;
    order.updated_at_ms = Some(change.event_time_ms);
    if let Some(fills) = change.fills {
        order.result_filled_quantity = Some(fills.filled_quantity);
        order.result_quote_quantity = Some(fills.quote_quantity);
    }
}


/// Expands to one `#[test]` per conformance check for the given store
/// constructor.
#[cfg(test)]
macro_rules! store_conformance_tests {
    ($make:expr; $($name:ident),+ $(,)?) => {
        mod conformance_tests {
            use super::*;

            $(
                #[test]
                fn $name() {
                    let store = $make;
                    crate::store::conformance::$name(&store);
                }
            )+
        }
    };
    ($make:expr) => {
        crate::store::store_conformance_tests!(
            $make;
            created_order_is_new_and_waiting,
            oco_pair_is_mutual,
            guard_rejects_older_and_equal_events,
            later_event_wins_in_either_order,
            terminal_status_does_not_move,
            mark_error_bypasses_guard,
            callback_transitions_are_compare_and_set,
            replay_only_resets_failed_settled_callbacks,
            position_keys_are_unique,
            open_interest_and_ownership,
            bot_status_and_rounds,
        );
    };
}

#[cfg(test)]
pub(crate) use store_conformance_tests;

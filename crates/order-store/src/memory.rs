//! In-process store backed by concurrent maps.
//!
//! Each order lives in one `DashMap` slot; holding the slot's write guard for
//! the whole check-then-write makes every single-row mutation atomic without
//! a store-wide lock.

use crate::error::StoreError;
use crate::store::{apply, check_replayable, evaluate, ApplyOutcome, OrderStore, StatusChange};
use common::now_ms;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use model::{
    Bot, BotId, BotStatus, CallbackStatus, ConnectionId, ExchangeConnection, NewOrder, Order,
    OrderId, OrderStatus, Position, PositionId, Round, RoundId,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    connections: DashMap<ConnectionId, ExchangeConnection>,
    bots: DashMap<BotId, Bot>,
    rounds: DashMap<RoundId, Round>,
    positions: DashMap<PositionId, Position>,
    orders: DashMap<OrderId, Order>,
    position_keys: DashMap<(PositionId, String), OrderId>,
    sequence: AtomicI64,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn build_order(&self, id: OrderId, new: NewOrder) -> Order {
        Order {
            id,
            position_id: new.position_id,
            created_at_ms: now_ms(),
            updated_at_ms: None,
            status: OrderStatus::New,
            order_type: new.order_type,
            side: new.side,
            quantity: new.quantity,
            quote_quantity: new.quote_quantity,
            price: new.price,
            stop_price: new.stop_price,
            callback: new.callback,
            position_key: new.position_key,
            callback_status: CallbackStatus::Waiting,
            callback_at_ms: None,
            result_quote_quantity: None,
            result_filled_quantity: None,
            oco_order: None,
        }
    }

    /// Reserve the position key, if any, for `id`.
    fn claim_position_key(&self, new: &NewOrder, id: OrderId) -> Result<(), StoreError> {
        let Some(key) = &new.position_key else {
            return Ok(());
        };
        match self.position_keys.entry((new.position_id, key.clone())) {
            Entry::Occupied(_) => Err(StoreError::DuplicatePositionKey {
                position: new.position_id,
                key: key.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn release_position_key(&self, new: &NewOrder) {
        if let Some(key) = &new.position_key {
            self.position_keys.remove(&(new.position_id, key.clone()));
        }
    }

    fn ensure_position(&self, id: PositionId) -> Result<(), StoreError> {
        if self.positions.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::not_found("position", id))
        }
    }

    fn owning_bot_id(&self, order: &Order) -> Option<BotId> {
        let round_id = self.positions.get(&order.position_id)?.round_id;
        let bot_id = self.rounds.get(&round_id)?.bot_id;
        Some(bot_id)
    }
}

impl OrderStore for MemoryOrderStore {
    fn insert_connection(&self, connection: ExchangeConnection) -> Result<(), StoreError> {
        self.connections.insert(connection.id, connection);
        Ok(())
    }

    fn connection(&self, id: ConnectionId) -> Result<ExchangeConnection, StoreError> {
        self.connections
            .get(&id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::not_found("connection", id))
    }

    fn create_bot(
        &self,
        connection_id: ConnectionId,
        symbol: &str,
        algorithm: &str,
        params: serde_json::Value,
    ) -> Result<Bot, StoreError> {
        if !self.connections.contains_key(&connection_id) {
            return Err(StoreError::not_found("connection", connection_id));
        }
        let bot = Bot {
            id: BotId(self.next_id()),
            connection_id,
            symbol: symbol.to_string(),
            algorithm: algorithm.to_string(),
            status: BotStatus::Off,
            params,
        };
        self.bots.insert(bot.id, bot.clone());
        Ok(bot)
    }

    fn bot(&self, id: BotId) -> Result<Bot, StoreError> {
        self.bots
            .get(&id)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::not_found("bot", id))
    }

    fn bots_for_connection(&self, id: ConnectionId) -> Result<Vec<Bot>, StoreError> {
        let mut bots: Vec<Bot> = self
            .bots
            .iter()
            .filter(|b| b.connection_id == id)
            .map(|b| b.clone())
            .collect();
        bots.sort_by_key(|b| b.id);
        Ok(bots)
    }

    fn set_bot_status(&self, id: BotId, status: BotStatus) -> Result<(), StoreError> {
        let mut bot = self
            .bots
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("bot", id))?;
        bot.status = status;
        Ok(())
    }

    fn create_round(&self, bot_id: BotId) -> Result<Round, StoreError> {
        if !self.bots.contains_key(&bot_id) {
            return Err(StoreError::not_found("bot", bot_id));
        }
        let round = Round {
            id: RoundId(self.next_id()),
            bot_id,
        };
        self.rounds.insert(round.id, round);
        Ok(round)
    }

    fn latest_round(&self, bot_id: BotId) -> Result<Option<Round>, StoreError> {
        Ok(self
            .rounds
            .iter()
            .filter(|r| r.bot_id == bot_id)
            .map(|r| *r)
            .max_by_key(|r| r.id))
    }

    fn create_position(&self, round_id: RoundId) -> Result<Position, StoreError> {
        if !self.rounds.contains_key(&round_id) {
            return Err(StoreError::not_found("round", round_id));
        }
        let position = Position {
            id: PositionId(self.next_id()),
            round_id,
        };
        self.positions.insert(position.id, position);
        Ok(position)
    }

    fn create_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        self.ensure_position(new.position_id)?;
        let id = OrderId(self.next_id());
        self.claim_position_key(&new, id)?;

        let order = self.build_order(id, new);
        self.orders.insert(id, order.clone());
        Ok(order)
    }

    fn create_oco_pair(
        &self,
        first: NewOrder,
        second: NewOrder,
    ) -> Result<(Order, Order), StoreError> {
        self.ensure_position(first.position_id)?;
        self.ensure_position(second.position_id)?;

        let first_id = OrderId(self.next_id());
        let second_id = OrderId(self.next_id());
        self.claim_position_key(&first, first_id)?;
        if let Err(e) = self.claim_position_key(&second, second_id) {
            self.release_position_key(&first);
            return Err(e);
        }

        let mut a = self.build_order(first_id, first);
        let mut b = self.build_order(second_id, second);
        a.oco_order = Some(second_id);
        b.oco_order = Some(first_id);

        self.orders.insert(first_id, a.clone());
        self.orders.insert(second_id, b.clone());
        Ok((a, b))
    }

    fn order(&self, id: OrderId) -> Result<Order, StoreError> {
        self.orders
            .get(&id)
            .map(|o| o.clone())
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    fn order_by_position_key(
        &self,
        position_id: PositionId,
        key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let Some(id) = self
            .position_keys
            .get(&(position_id, key.to_string()))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        self.order(id).map(Some)
    }

    fn compare_and_apply(
        &self,
        id: OrderId,
        change: &StatusChange,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;

        if let Some(outcome) = evaluate(&order, change) {
            return Ok(outcome);
        }
        apply(&mut order, change);
        Ok(ApplyOutcome::Applied(order.clone()))
    }

    fn mark_error(&self, id: OrderId) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order.status = OrderStatus::Error;
        Ok(order.clone())
    }

    fn transition_callback(
        &self,
        id: OrderId,
        from: CallbackStatus,
        to: CallbackStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_move_to(to) {
            return Err(StoreError::InvalidCallbackTransition {
                order: id,
                from,
                to,
            });
        }
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if order.callback_status != from {
            return Ok(false);
        }
        order.callback_status = to;
        if to == CallbackStatus::Started {
            order.callback_at_ms = Some(now_ms());
        }
        Ok(true)
    }

    fn reset_callback(&self, id: OrderId) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        check_replayable(&order)?;
        order.callback_status = CallbackStatus::Waiting;
        Ok(order.clone())
    }

    fn active_orders_for_bot(&self, bot_id: BotId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Active)
            .filter(|o| self.owning_bot_id(o) == Some(bot_id))
            .map(|o| o.clone())
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    fn bot_for_order(&self, id: OrderId) -> Result<Bot, StoreError> {
        let order = self.order(id)?;
        let bot_id = self
            .owning_bot_id(&order)
            .ok_or_else(|| StoreError::Corrupt(format!("order {} has no owning bot", id)))?;
        self.bot(bot_id)
    }

    fn connections_with_open_interest(&self) -> Result<Vec<ConnectionId>, StoreError> {
        let bot_ids: BTreeSet<BotId> = self
            .orders
            .iter()
            .filter(|o| o.status.is_open())
            .filter_map(|o| self.owning_bot_id(&o))
            .collect();

        let connections: BTreeSet<ConnectionId> = bot_ids
            .into_iter()
            .filter_map(|id| self.bots.get(&id).map(|b| b.connection_id))
            .collect();
        Ok(connections.into_iter().collect())
    }
}

//! SQLite-backed store.
//!
//! One connection behind a mutex. Decimals are kept as TEXT so they survive
//! the round trip exactly; the callback descriptor is kept as its JSON form.

use crate::error::StoreError;
use crate::store::{check_replayable, evaluate, ApplyOutcome, OrderStore, StatusChange};
use common::now_ms;
use model::{
    Bot, BotId, BotStatus, CallbackDescriptor, CallbackStatus, ConnectionId, ExchangeConnection,
    NewOrder, Order, OrderId, OrderStatus, Position, PositionId, Round, RoundId,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY,
    exchange TEXT NOT NULL,
    api_key TEXT NOT NULL,
    api_secret TEXT NOT NULL,
    commission TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connection_id INTEGER NOT NULL REFERENCES connections(id),
    symbol TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    status TEXT NOT NULL,
    params TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bot_id INTEGER NOT NULL REFERENCES bots(id)
);

CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    round_id INTEGER NOT NULL REFERENCES rounds(id)
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    position_id INTEGER NOT NULL REFERENCES positions(id),
    created_at INTEGER NOT NULL,
    updated_at INTEGER,
    status TEXT NOT NULL,
    order_type TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity TEXT,
    quote_quantity TEXT,
    price TEXT,
    stop_price TEXT,
    callback TEXT,
    position_key TEXT,
    callback_status TEXT NOT NULL,
    callback_at INTEGER,
    result_quote_quantity TEXT,
    result_filled_quantity TEXT,
    oco_order INTEGER REFERENCES orders(id),
    UNIQUE (position_id, position_key)
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
"#;

const ORDER_COLUMNS: &str = "id, position_id, created_at, updated_at, status, order_type, side, \
     quantity, quote_quantity, price, stop_price, callback, position_key, callback_status, \
     callback_at, result_quote_quantity, result_filled_quantity, oco_order";

pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "order store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Order row as stored, before its text columns are decoded.
struct OrderRow {
    id: i64,
    position_id: i64,
    created_at: i64,
    updated_at: Option<i64>,
    status: String,
    order_type: String,
    side: String,
    quantity: Option<String>,
    quote_quantity: Option<String>,
    price: Option<String>,
    stop_price: Option<String>,
    callback: Option<String>,
    position_key: Option<String>,
    callback_status: String,
    callback_at: Option<i64>,
    result_quote_quantity: Option<String>,
    result_filled_quantity: Option<String>,
    oco_order: Option<i64>,
}

impl OrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            position_id: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            status: row.get(4)?,
            order_type: row.get(5)?,
            side: row.get(6)?,
            quantity: row.get(7)?,
            quote_quantity: row.get(8)?,
            price: row.get(9)?,
            stop_price: row.get(10)?,
            callback: row.get(11)?,
            position_key: row.get(12)?,
            callback_status: row.get(13)?,
            callback_at: row.get(14)?,
            result_quote_quantity: row.get(15)?,
            result_filled_quantity: row.get(16)?,
            oco_order: row.get(17)?,
        })
    }

    fn decode(self) -> Result<Order, StoreError> {
        let callback = self
            .callback
            .as_deref()
            .map(CallbackDescriptor::from_json)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("order {} callback: {}", self.id, e)))?;

        Ok(Order {
            id: OrderId(self.id),
            position_id: PositionId(self.position_id),
            created_at_ms: self.created_at,
            updated_at_ms: self.updated_at,
            status: parse_text(&self.status)?,
            order_type: parse_text(&self.order_type)?,
            side: parse_text(&self.side)?,
            quantity: decimal_opt(self.quantity)?,
            quote_quantity: decimal_opt(self.quote_quantity)?,
            price: decimal_opt(self.price)?,
            stop_price: decimal_opt(self.stop_price)?,
            callback,
            position_key: self.position_key,
            callback_status: parse_text(&self.callback_status)?,
            callback_at_ms: self.callback_at,
            result_quote_quantity: decimal_opt(self.result_quote_quantity)?,
            result_filled_quantity: decimal_opt(self.result_filled_quantity)?,
            oco_order: self.oco_order.map(OrderId),
        })
    }
}

fn parse_text<T>(raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decimal_opt(raw: Option<String>) -> Result<Option<Decimal>, StoreError> {
    raw.map(|s| parse_text::<Decimal>(&s)).transpose()
}

fn text_opt(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn load_order(conn: &Connection, id: OrderId) -> Result<Order, StoreError> {
    let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
    conn.query_row(&sql, params![id.0], OrderRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("order", id))?
        .decode()
}

fn load_orders(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Order>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, OrderRow::from_row)?;
    let mut orders = Vec::new();
    for row in rows {
        orders.push(row?.decode()?);
    }
    Ok(orders)
}

fn load_bot(conn: &Connection, id: BotId) -> Result<Bot, StoreError> {
    let raw = conn
        .query_row(
            "SELECT id, connection_id, symbol, algorithm, status, params FROM bots WHERE id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("bot", id))?;

    let (id, connection_id, symbol, algorithm, status, params) = raw;
    Ok(Bot {
        id: BotId(id),
        connection_id: ConnectionId(connection_id),
        symbol,
        algorithm,
        status: parse_text(&status)?,
        params: serde_json::from_str(&params)
            .map_err(|e| StoreError::Corrupt(format!("bot {} params: {}", id, e)))?,
    })
}

fn position_exists(conn: &Connection, id: PositionId) -> Result<(), StoreError> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM positions WHERE id = ?1", params![id.0], |row| row.get(0))
        .optional()?;
    found
        .map(|_| ())
        .ok_or_else(|| StoreError::not_found("position", id))
}

fn insert_order(conn: &Connection, new: &NewOrder) -> Result<OrderId, StoreError> {
    let result = conn.execute(
        "INSERT INTO orders (position_id, created_at, status, order_type, side, quantity, \
         quote_quantity, price, stop_price, callback, position_key, callback_status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            new.position_id.0,
            now_ms(),
            OrderStatus::New.as_str(),
            new.order_type.as_str(),
            new.side.as_str(),
            text_opt(new.quantity),
            text_opt(new.quote_quantity),
            text_opt(new.price),
            text_opt(new.stop_price),
            new.callback.as_ref().map(CallbackDescriptor::to_json),
            new.position_key,
            CallbackStatus::Waiting.as_str(),
        ],
    );

    match result {
        Ok(_) => Ok(OrderId(conn.last_insert_rowid())),
        Err(e) if is_constraint_violation(&e) && new.position_key.is_some() => {
            Err(StoreError::DuplicatePositionKey {
                position: new.position_id,
                key: new.position_key.clone().unwrap_or_default(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

impl OrderStore for SqliteOrderStore {
    fn insert_connection(&self, connection: ExchangeConnection) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO connections (id, exchange, api_key, api_secret, commission) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET exchange = excluded.exchange, \
             api_key = excluded.api_key, api_secret = excluded.api_secret, \
             commission = excluded.commission",
            params![
                connection.id.0,
                connection.exchange.as_str(),
                connection.api_key,
                connection.api_secret,
                connection.commission.to_string(),
            ],
        )?;
        Ok(())
    }

    fn connection(&self, id: ConnectionId) -> Result<ExchangeConnection, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT exchange, api_key, api_secret, commission FROM connections WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("connection", id))?;

        let (exchange, api_key, api_secret, commission) = raw;
        Ok(ExchangeConnection {
            id,
            exchange: parse_text(&exchange)?,
            api_key,
            api_secret,
            commission: parse_text(&commission)?,
        })
    }

    fn create_bot(
        &self,
        connection_id: ConnectionId,
        symbol: &str,
        algorithm: &str,
        params: serde_json::Value,
    ) -> Result<Bot, StoreError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM connections WHERE id = ?1",
                params![connection_id.0],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::not_found("connection", connection_id));
        }

        conn.execute(
            "INSERT INTO bots (connection_id, symbol, algorithm, status, params) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                connection_id.0,
                symbol,
                algorithm,
                BotStatus::Off.as_str(),
                params.to_string(),
            ],
        )?;
        load_bot(&conn, BotId(conn.last_insert_rowid()))
    }

    fn bot(&self, id: BotId) -> Result<Bot, StoreError> {
        load_bot(&self.conn.lock(), id)
    }

    fn bots_for_connection(&self, id: ConnectionId) -> Result<Vec<Bot>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM bots WHERE connection_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![id.0], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter().map(|id| load_bot(&conn, BotId(id))).collect()
    }

    fn set_bot_status(&self, id: BotId, status: BotStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE bots SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.0],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("bot", id));
        }
        debug!(bot_id = %id, status = %status, "bot status set");
        Ok(())
    }

    fn create_round(&self, bot_id: BotId) -> Result<Round, StoreError> {
        let conn = self.conn.lock();
        load_bot(&conn, bot_id)?;
        conn.execute("INSERT INTO rounds (bot_id) VALUES (?1)", params![bot_id.0])?;
        Ok(Round {
            id: RoundId(conn.last_insert_rowid()),
            bot_id,
        })
    }

    fn latest_round(&self, bot_id: BotId) -> Result<Option<Round>, StoreError> {
        let conn = self.conn.lock();
        let id: Option<i64> = conn
            .query_row(
                "SELECT MAX(id) FROM rounds WHERE bot_id = ?1",
                params![bot_id.0],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(id.map(|id| Round {
            id: RoundId(id),
            bot_id,
        }))
    }

    fn create_position(&self, round_id: RoundId) -> Result<Position, StoreError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM rounds WHERE id = ?1", params![round_id.0], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::not_found("round", round_id));
        }
        conn.execute("INSERT INTO positions (round_id) VALUES (?1)", params![round_id.0])?;
        Ok(Position {
            id: PositionId(conn.last_insert_rowid()),
            round_id,
        })
    }

    fn create_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let conn = self.conn.lock();
        position_exists(&conn, new.position_id)?;
        let id = insert_order(&conn, &new)?;
        load_order(&conn, id)
    }

    fn create_oco_pair(
        &self,
        first: NewOrder,
        second: NewOrder,
    ) -> Result<(Order, Order), StoreError> {
        let mut conn = self.conn.lock();
        position_exists(&conn, first.position_id)?;
        position_exists(&conn, second.position_id)?;

        let tx = conn.transaction()?;
        let a = insert_order(&tx, &first)?;
        let b = insert_order(&tx, &second)?;
        tx.execute(
            "UPDATE orders SET oco_order = ?1 WHERE id = ?2",
            params![b.0, a.0],
        )?;
        tx.execute(
            "UPDATE orders SET oco_order = ?1 WHERE id = ?2",
            params![a.0, b.0],
        )?;
        tx.commit()?;

        Ok((load_order(&conn, a)?, load_order(&conn, b)?))
    }

    fn order(&self, id: OrderId) -> Result<Order, StoreError> {
        load_order(&self.conn.lock(), id)
    }

    fn order_by_position_key(
        &self,
        position_id: PositionId,
        key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM orders WHERE position_id = ?1 AND position_key = ?2",
            ORDER_COLUMNS
        );
        let mut orders = load_orders(&conn, &sql, params![position_id.0, key])?;
        Ok(orders.pop())
    }

    fn compare_and_apply(
        &self,
        id: OrderId,
        change: &StatusChange,
    ) -> Result<ApplyOutcome, StoreError> {
        let conn = self.conn.lock();
        let current = load_order(&conn, id)?;
        if let Some(outcome) = evaluate(&current, change) {
            return Ok(outcome);
        }

        let (filled, quote) = match change.fills {
            Some(f) => (Some(f.filled_quantity), Some(f.quote_quantity)),
            None => (None, None),
        };
        // Same guard in SQL; other processes may share the file.
        let changed = conn.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2, \
             result_filled_quantity = COALESCE(?3, result_filled_quantity), \
             result_quote_quantity = COALESCE(?4, result_quote_quantity) \
             WHERE id = ?5 AND status = ?6 AND (updated_at IS NULL OR updated_at < ?2)",
            params![
                change.status.as_str(),
                change.event_time_ms,
                text_opt(filled),
                text_opt(quote),
                id.0,
                current.status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(ApplyOutcome::Stale);
        }
        Ok(ApplyOutcome::Applied(load_order(&conn, id)?))
    }

    fn mark_error(&self, id: OrderId) -> Result<Order, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE orders SET status = ?1 WHERE id = ?2",
            params![OrderStatus::Error.as_str(), id.0],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("order", id));
        }
        load_order(&conn, id)
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
        let started_at = (to == CallbackStatus::Started).then(now_ms);

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE orders SET callback_status = ?1, callback_at = COALESCE(?2, callback_at) \
             WHERE id = ?3 AND callback_status = ?4",
            params![to.as_str(), started_at, id.0, from.as_str()],
        )?;
        if changed == 0 {
            // Distinguish a lost race from a missing row.
            load_order(&conn, id)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn reset_callback(&self, id: OrderId) -> Result<Order, StoreError> {
        let conn = self.conn.lock();
        check_replayable(&load_order(&conn, id)?)?;
        conn.execute(
            "UPDATE orders SET callback_status = ?1 WHERE id = ?2",
            params![CallbackStatus::Waiting.as_str(), id.0],
        )?;
        load_order(&conn, id)
    }

    fn active_orders_for_bot(&self, bot_id: BotId) -> Result<Vec<Order>, StoreError> {
        let conn = self.conn.lock();
        let columns = ORDER_COLUMNS
            .split(", ")
            .map(|c| format!("o.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM orders o \
             JOIN positions p ON p.id = o.position_id \
             JOIN rounds r ON r.id = p.round_id \
             WHERE r.bot_id = ?1 AND o.status = ?2 ORDER BY o.id",
            columns
        );
        load_orders(&conn, &sql, params![bot_id.0, OrderStatus::Active.as_str()])
    }

    fn bot_for_order(&self, id: OrderId) -> Result<Bot, StoreError> {
        let conn = self.conn.lock();
        let bot_id: Option<i64> = conn
            .query_row(
                "SELECT r.bot_id FROM orders o \
                 JOIN positions p ON p.id = o.position_id \
                 JOIN rounds r ON r.id = p.round_id \
                 WHERE o.id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        match bot_id {
            Some(bot_id) => load_bot(&conn, BotId(bot_id)),
            None => {
                load_order(&conn, id)?;
                Err(StoreError::Corrupt(format!("order {} has no owning bot", id)))
            }
        }
    }

    fn connections_with_open_interest(&self) -> Result<Vec<ConnectionId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT b.connection_id FROM orders o \
             JOIN positions p ON p.id = o.position_id \
             JOIN rounds r ON r.id = p.round_id \
             JOIN bots b ON b.id = r.bot_id \
             WHERE o.status IN (?1, ?2) ORDER BY b.connection_id",
        )?;
        let ids = stmt
            .query_map(
                params![OrderStatus::New.as_str(), OrderStatus::Active.as_str()],
                |row| row.get::<_, i64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(ConnectionId).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use model::{FillAmounts, OrderSide, OrderType};
    use rust_decimal_macros::dec;

    crate::store::store_conformance_tests!(SqliteOrderStore::open_in_memory().unwrap());

    #[test]
    fn test_decimals_survive_storage_exactly() {
        let store = SqliteOrderStore::open_in_memory().unwrap();
        let fx = conformance::seed(&store);
        let order = store
            .create_order(
                NewOrder::new(fx.position.id, OrderType::StopLossLimit, OrderSide::Sell)
                    .quantity(dec!(0.00012345))
                    .price(dec!(27123.45))
                    .stop_price(dec!(27200.10))
                    .callback(Some(CallbackDescriptor::new("on_stop").with_param("leg", "sl"))),
            )
            .unwrap();

        let fills = FillAmounts {
            filled_quantity: dec!(0.00012345),
            quote_quantity: dec!(3.34839),
        };
        store
            .compare_and_apply(
                order.id,
                &StatusChange::new(OrderStatus::Filled, 1_700_000_000_000).with_fills(Some(fills)),
            )
            .unwrap();

        let stored = store.order(order.id).unwrap();
        assert_eq!(stored.quantity, Some(dec!(0.00012345)));
        assert_eq!(stored.stop_price, Some(dec!(27200.10)));
        assert_eq!(stored.result_quote_quantity, Some(dec!(3.34839)));
        assert_eq!(stored.callback.unwrap().method, "on_stop");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = std::env::temp_dir().join(format!("order-store-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&dir);

        let order_id = {
            let store = SqliteOrderStore::open(&dir).unwrap();
            let fx = conformance::seed(&store);
            store
                .create_order(NewOrder::new(fx.position.id, OrderType::Market, OrderSide::Buy))
                .unwrap()
                .id
        };

        let store = SqliteOrderStore::open(&dir).unwrap();
        assert_eq!(store.order(order_id).unwrap().status, OrderStatus::New);
        assert_eq!(store.connections_with_open_interest().unwrap(), vec![ConnectionId(7)]);
        let _ = std::fs::remove_file(&dir);
    }
}

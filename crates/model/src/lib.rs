//! Domain entities shared by every engine crate.
//!
//! The hierarchy is `ExchangeConnection -> Bot -> Round -> Position -> Order`.
//! Everything below the connection is owned by the order store; other crates
//! refer to rows by id and re-read them before mutating.

mod bot;
mod callback;
mod exchange;
mod ids;
mod order;

pub use bot::{Bot, BotStatus, Position, Round};
pub use callback::{CallbackDecodeError, CallbackDescriptor, CALLBACK_VERSION};
pub use exchange::{ExchangeConnection, ExchangeName, SymbolInfo};
pub use ids::{BotId, ConnectionId, OrderId, PositionId, RoundId};
pub use order::{
    CallbackStatus, FillAmounts, NewOrder, Order, OrderSide, OrderStatus, OrderType,
};

use thiserror::Error;

/// A stored or wire string that does not name a known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//! Orders and their status vocabularies.

use crate::callback::CallbackDescriptor;
use crate::ids::{OrderId, PositionId};
use crate::ParseEnumError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError::new($kind, s)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

string_enum!(OrderSide, "order side", { Buy => "BUY", Sell => "SELL" });

/// Order type, in the exchange's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    /// Limit order rejected if it would trade immediately as taker.
    LimitMaker,
}

string_enum!(OrderType, "order type", {
    Market => "MARKET",
    Limit => "LIMIT",
    StopLoss => "STOP_LOSS",
    StopLossLimit => "STOP_LOSS_LIMIT",
    TakeProfit => "TAKE_PROFIT",
    TakeProfitLimit => "TAKE_PROFIT_LIMIT",
    LimitMaker => "LIMIT_MAKER",
});

/// Internal order status.
///
/// ```text
/// NEW -> ACTIVE -> { FILLED, CANCELED, EXPIRED }
/// NEW ----------->  { FILLED, CANCELED, EXPIRED }
/// any -> ERROR      (placement failure only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Recorded locally, not yet acknowledged by the exchange.
    New,
    /// Resting on the exchange.
    Active,
    Filled,
    Canceled,
    Expired,
    Error,
}

string_enum!(OrderStatus, "order status", {
    New => "NEW",
    Active => "ACTIVE",
    Filled => "FILLED",
    Canceled => "CANCELED",
    Expired => "EXPIRED",
    Error => "ERROR",
});

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Expired | Self::Error
        )
    }

    /// NEW or ACTIVE.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether an exchange-driven transition from `self` to `next` moves
    /// forward. ERROR is never reached this way.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (New, Active | Filled | Canceled | Expired) => true,
            (Active, Filled | Canceled | Expired) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Waiting,
    Started,
    Done,
    /// The order was canceled on request; its callback will not run.
    Canceled,
    /// The OCO sibling fired instead.
    OcoCanceled,
    Error,
}

string_enum!(CallbackStatus, "callback status", {
    Waiting => "WAITING",
    Started => "STARTED",
    Done => "DONE",
    Canceled => "CANCELED",
    OcoCanceled => "OCO_CANCELED",
    Error => "ERROR",
});

impl CallbackStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Started)
    }

    /// True once the callback body has begun running.
    pub fn was_invoked(&self) -> bool {
        matches!(self, Self::Started | Self::Done | Self::Error)
    }

    pub fn can_move_to(&self, next: CallbackStatus) -> bool {
        use CallbackStatus::*;
        matches!(
            (self, next),
            (Waiting, Started | Done | Canceled | OcoCanceled) | (Started, Done | Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub position_id: PositionId,
    pub created_at_ms: i64,
    /// Exchange event time of the last applied transition. `None` until the
    /// exchange reports anything.
    pub updated_at_ms: Option<i64>,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Option<Decimal>,
    pub quote_quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub callback: Option<CallbackDescriptor>,
    /// Caller correlation token, unique within the position.
    pub position_key: Option<String>,
    pub callback_status: CallbackStatus,
    pub callback_at_ms: Option<i64>,
    /// Cumulative quote amount filled, as reported by the exchange.
    pub result_quote_quantity: Option<Decimal>,
    /// Cumulative base amount filled, as reported by the exchange.
    pub result_filled_quantity: Option<Decimal>,
    pub oco_order: Option<OrderId>,
}

impl Order {
    pub fn is_oco(&self) -> bool {
        self.oco_order.is_some()
    }
}

/// Cumulative fill amounts reported with a FILLED transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillAmounts {
    pub filled_quantity: Decimal,
    pub quote_quantity: Decimal,
}

/// Fields supplied by the caller when recording a placement attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub position_id: PositionId,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Option<Decimal>,
    pub quote_quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub callback: Option<CallbackDescriptor>,
    pub position_key: Option<String>,
}

impl NewOrder {
    pub fn new(position_id: PositionId, order_type: OrderType, side: OrderSide) -> Self {
        Self {
            position_id,
            order_type,
            side,
            quantity: None,
            quote_quantity: None,
            price: None,
            stop_price: None,
            callback: None,
            position_key: None,
        }
    }

    pub fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn quote_quantity(mut self, quote_quantity: Decimal) -> Self {
        self.quote_quantity = Some(quote_quantity);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn callback(mut self, callback: Option<CallbackDescriptor>) -> Self {
        self.callback = callback;
        self
    }

    pub fn position_key(mut self, key: Option<String>) -> Self {
        self.position_key = key;
        self
    }
}

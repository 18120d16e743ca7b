//! Binance spot venue for the order engine.
//!
//! [`BinanceAdapter`] places and cancels through the REST API, rounds every
//! value to the symbol's filters first, reconciles from `allOrders`, and
//! streams execution reports from the user data WebSocket.

mod adapter;
mod rounding;
mod symbols;
mod user_data_parser;
mod user_data_stream;

pub use adapter::BinanceAdapter;
pub use rounding::{round_lot, round_price, round_quote};
pub use user_data_parser::{parse_user_data_message, UserDataMessage};

//! Typed client for the Binance spot REST API.
//!
//! Covers what the order engine needs: listen keys for the user data
//! stream, order placement (single and OCO), cancel, `allOrders` for
//! reconciliation, average price, balances and symbol filters. Error bodies
//! are decoded into [`BinanceRestError`] so callers can branch on codes.

mod client;
mod environment;
mod error;
mod responses;

pub use client::{BinanceRestClient, OcoParams, OrderParams, ALL_ORDERS_LIMIT};
pub use environment::BinanceEnvironment;
pub use error::BinanceRestError;
pub use responses::{
    AssetBalance, OcoResponse, OrderReport, QueriedOrder, SymbolEntry, SymbolFilter,
};

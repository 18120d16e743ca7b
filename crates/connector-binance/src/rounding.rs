//! Snap prices and sizes to a symbol's exchange filters.
//!
//! Each value is rounded to the nearest multiple of its increment (ties to
//! even), then to eight decimal places. A zero increment leaves the value
//! unrounded apart from the final eight places.

use connector_core::ConnectorError;
use model::SymbolInfo;
use rust_decimal::Decimal;

const MAX_DP: u32 = 8;

fn to_multiple(value: Decimal, increment: Decimal) -> Result<Decimal, ConnectorError> {
    if increment.is_zero() {
        return Ok(value.round_dp(MAX_DP));
    }
    value
        .checked_div(increment)
        .and_then(|steps| steps.round().checked_mul(increment))
        .map(|snapped| snapped.round_dp(MAX_DP))
        .ok_or_else(|| {
            ConnectorError::InvalidRequest(format!(
                "{value} cannot be snapped to increment {increment}"
            ))
        })
}

/// PRICE_FILTER tick.
pub fn round_price(symbol: &SymbolInfo, price: Decimal) -> Result<Decimal, ConnectorError> {
    to_multiple(price, symbol.tick_size)
}

/// LOT_SIZE step.
pub fn round_lot(symbol: &SymbolInfo, quantity: Decimal) -> Result<Decimal, ConnectorError> {
    to_multiple(quantity, symbol.step_size)
}

/// Quote amounts snap to `step * tick`.
pub fn round_quote(symbol: &SymbolInfo, quote: Decimal) -> Result<Decimal, ConnectorError> {
    let increment = symbol
        .step_size
        .checked_mul(symbol.tick_size)
        .ok_or_else(|| ConnectorError::InvalidRequest(format!("{} quote increment overflows", symbol.symbol)))?;
    to_multiple(quote, increment)
}

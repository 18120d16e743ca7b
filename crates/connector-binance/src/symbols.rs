//! Exchange-info cache with a fixed time to live.

use binance_rest::SymbolEntry;
use dashmap::DashMap;
use model::SymbolInfo;
use std::time::{Duration, Instant};

/// Exchange filters rarely change; refetch after this long.
pub(crate) const SYMBOL_TTL: Duration = Duration::from_secs(15 * 60);

/// Per-adapter cache of symbol filters.
#[derive(Debug, Default)]
pub(crate) struct SymbolCache {
    entries: DashMap<String, (SymbolInfo, Instant)>,
}

impl SymbolCache {
    pub(crate) fn get(&self, symbol: &str) -> Option<SymbolInfo> {
        let entry = self.entries.get(symbol)?;
        let (info, fetched_at) = entry.value();
        (fetched_at.elapsed() < SYMBOL_TTL).then(|| info.clone())
    }

    pub(crate) fn insert(&self, info: SymbolInfo) {
        self.entries
            .insert(info.symbol.clone(), (info, Instant::now()));
    }
}

pub(crate) fn symbol_info(entry: SymbolEntry) -> SymbolInfo {
    let (step_size, min_qty) = entry.lot_size();
    SymbolInfo {
        tick_size: entry.tick_size(),
        min_notional: entry.min_notional(),
        step_size,
        min_qty,
        symbol: entry.symbol,
        base_asset: entry.base_asset,
        quote_asset: entry.quote_asset,
        price: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cache_round_trip() {
        let cache = SymbolCache::default();
        assert!(cache.get("BTCUSDT").is_none());
        cache.insert(SymbolInfo {
            symbol: "BTCUSDT".into(),
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            tick_size: dec!(0.01),
            step_size: dec!(0.00001),
            min_qty: dec!(0.00001),
            min_notional: dec!(5),
            price: None,
        });
        assert_eq!(cache.get("BTCUSDT").unwrap().tick_size, dec!(0.01));
    }
}

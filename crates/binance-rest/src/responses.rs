//! Binance spot REST payloads.

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    pub server_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyResponse {
    pub listen_key: String,
}

/// An order as returned by placement (`newOrderRespType=RESULT`), cancel
/// and the OCO `orderReports`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReport {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    #[serde(default)]
    pub transact_time: Option<i64>,
    pub status: String,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcoResponse {
    pub order_list_id: i64,
    pub list_client_order_id: String,
    pub transaction_time: i64,
    pub order_reports: Vec<OrderReport>,
}

/// One entry of `GET /api/v3/allOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueriedOrder {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub time: i64,
    pub update_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvgPriceResponse {
    pub mins: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Trading filters we read; everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    #[serde(rename_all = "camelCase")]
    PriceFilter { tick_size: Decimal },
    #[serde(rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    #[serde(rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(other)]
    Other,
}

impl SymbolEntry {
    pub fn tick_size(&self) -> Decimal {
        self.filters
            .iter()
            .find_map(|f| match f {
                SymbolFilter::PriceFilter { tick_size } => Some(*tick_size),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// `(step_size, min_qty)`.
    pub fn lot_size(&self) -> (Decimal, Decimal) {
        self.filters
            .iter()
            .find_map(|f| match f {
                SymbolFilter::LotSize { step_size, min_qty } => Some((*step_size, *min_qty)),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn min_notional(&self) -> Decimal {
        self.filters
            .iter()
            .find_map(|f| match f {
                SymbolFilter::MinNotional { min_notional } | SymbolFilter::Notional { min_notional } => {
                    Some(*min_notional)
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_all_orders_entry() {
        let json = r#"{
            "symbol": "LTCBTC",
            "orderId": 1,
            "orderListId": -1,
            "clientOrderId": "tbotprod0001-17",
            "price": "0.1",
            "origQty": "1.0",
            "executedQty": "1.0",
            "cummulativeQuoteQty": "0.1",
            "status": "FILLED",
            "timeInForce": "GTC",
            "type": "LIMIT",
            "side": "BUY",
            "stopPrice": "0.0",
            "icebergQty": "0.0",
            "time": 1499827319559,
            "updateTime": 1499827319600,
            "isWorking": true,
            "origQuoteOrderQty": "0.000000"
        }"#;
        let order: QueriedOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.client_order_id, "tbotprod0001-17");
        assert_eq!(order.cummulative_quote_qty, dec!(0.1));
        assert_eq!(order.update_time, 1499827319600);
    }

    #[test]
    fn test_deserialize_oco_response() {
        let json = r#"{
            "orderListId": 0,
            "contingencyType": "OCO",
            "listStatusType": "EXEC_STARTED",
            "listOrderStatus": "EXECUTING",
            "listClientOrderId": "tbotprod0001-8",
            "transactionTime": 1563417480525,
            "symbol": "LTCBTC",
            "orders": [],
            "orderReports": [
                {"symbol": "LTCBTC", "orderId": 2, "orderListId": 0, "clientOrderId": "tbotprod0001-9",
                 "transactTime": 1563417480525, "price": "0.000000", "origQty": "0.624363",
                 "executedQty": "0.000000", "cummulativeQuoteQty": "0.000000", "status": "NEW",
                 "timeInForce": "GTC", "type": "STOP_LOSS_LIMIT", "side": "BUY", "stopPrice": "0.960664"},
                {"symbol": "LTCBTC", "orderId": 3, "orderListId": 0, "clientOrderId": "tbotprod0001-8",
                 "transactTime": 1563417480525, "price": "0.036435", "origQty": "0.624363",
                 "executedQty": "0.000000", "cummulativeQuoteQty": "0.000000", "status": "NEW",
                 "timeInForce": "GTC", "type": "LIMIT_MAKER", "side": "BUY"}
            ]
        }"#;
        let oco: OcoResponse = serde_json::from_str(json).unwrap();
        assert_eq!(oco.order_reports.len(), 2);
        assert_eq!(oco.order_reports[1].client_order_id, "tbotprod0001-8");
    }

    #[test]
    fn test_symbol_filters() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000.00", "tickSize": "0.01"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001", "maxQty": "9000.0", "stepSize": "0.00001"},
                {"filterType": "ICEBERG_PARTS", "limit": 10},
                {"filterType": "NOTIONAL", "minNotional": "5.0", "applyMinToMarket": true}
            ]
        }"#;
        let entry: SymbolEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.tick_size(), dec!(0.01));
        assert_eq!(entry.lot_size(), (dec!(0.00001), dec!(0.00001)));
        assert_eq!(entry.min_notional(), dec!(5.0));
    }
}

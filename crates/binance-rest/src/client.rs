//! Binance spot REST client.

use crate::environment::BinanceEnvironment;
use crate::error::BinanceRestError;
use crate::responses::{
    AccountResponse, AssetBalance, AvgPriceResponse, ExchangeInfoResponse, ListenKeyResponse,
    OcoResponse, OrderReport, QueriedOrder, ServerTimeResponse, SymbolEntry,
};
use auth::{ApiCredentials, RequestSigner};
use common::now_ms;
use execution_core::TimeInForce;
use model::{OrderSide, OrderType};
use rest_client::{Method, RestClient};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_WINDOW_MS: u64 = 5_000;
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// `allOrders` returns at most this many of the most recent orders.
pub const ALL_ORDERS_LIMIT: u32 = 500;

/// A single order for `POST /api/v3/order`. Values must already be rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParams {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub client_order_id: String,
    pub quantity: Option<Decimal>,
    /// Market buys only.
    pub quote_order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderParams {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
        ];
        if let Some(tif) = self.time_in_force {
            params.push(("timeInForce", tif.as_binance_str().to_string()));
        }
        if let Some(qty) = self.quantity {
            params.push(("quantity", wire(qty)));
        }
        if let Some(quote) = self.quote_order_qty {
            params.push(("quoteOrderQty", wire(quote)));
        }
        if let Some(price) = self.price {
            params.push(("price", wire(price)));
        }
        if let Some(stop) = self.stop_price {
            params.push(("stopPrice", wire(stop)));
        }
        params.push(("newClientOrderId", self.client_order_id.clone()));
        params.push(("newOrderRespType", "RESULT".to_string()));
        params
    }
}

/// An OCO list for `POST /api/v3/order/oco`. Values must already be rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoParams {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub list_client_order_id: String,
    pub limit_client_order_id: String,
    pub stop_client_order_id: String,
}

impl OcoParams {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("quantity", wire(self.quantity)),
            ("price", wire(self.price)),
            ("stopPrice", wire(self.stop_price)),
            ("stopLimitPrice", wire(self.stop_limit_price)),
            ("stopLimitTimeInForce", TimeInForce::GTC.as_binance_str().to_string()),
            ("listClientOrderId", self.list_client_order_id.clone()),
            ("limitClientOrderId", self.limit_client_order_id.clone()),
            ("stopClientOrderId", self.stop_client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ]
    }
}

/// Decimal as Binance expects it: plain notation, no trailing zeros.
fn wire(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Authenticated client for one Binance account.
pub struct BinanceRestClient {
    client: RestClient,
    signer: RequestSigner,
    environment: BinanceEnvironment,
    /// local clock minus server clock
    time_offset_ms: AtomicI64,
}

impl BinanceRestClient {
    pub fn new(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
    ) -> Result<Self, BinanceRestError> {
        let client = RestClient::new(environment.rest_base_url(), REQUEST_TIMEOUT)?;
        Ok(Self {
            client,
            signer: RequestSigner::new(credentials).with_recv_window(RECV_WINDOW_MS),
            environment,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    pub fn environment(&self) -> BinanceEnvironment {
        self.environment
    }

    /// Local clock corrected by the last [`sync_time`](Self::sync_time).
    pub fn server_timestamp_ms(&self) -> i64 {
        now_ms() - self.time_offset_ms.load(Ordering::Relaxed)
    }

    pub async fn sync_time(&self) -> Result<(), BinanceRestError> {
        let sent = Instant::now();
        let response: ServerTimeResponse = self
            .client
            .send(Method::GET, "/api/v3/time", None, &[])
            .await?;
        let rtt = sent.elapsed().as_millis() as i64;

        let offset = now_ms() - (response.server_time + rtt / 2);
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        info!(offset_ms = offset, rtt_ms = rtt, "time synchronized with binance");
        Ok(())
    }

    async fn signed<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceRestError> {
        let query = self.signer.signed_query(params, self.server_timestamp_ms());
        let headers = [(API_KEY_HEADER, self.signer.api_key())];
        Ok(self.client.send(method, path, Some(&query), &headers).await?)
    }

    async fn keyed_empty(
        &self,
        method: Method,
        query: Option<&str>,
    ) -> Result<(), BinanceRestError> {
        let headers = [(API_KEY_HEADER, self.signer.api_key())];
        Ok(self
            .client
            .send_empty(method, "/api/v3/userDataStream", query, &headers)
            .await?)
    }

    pub async fn create_listen_key(&self) -> Result<String, BinanceRestError> {
        let headers = [(API_KEY_HEADER, self.signer.api_key())];
        let response: ListenKeyResponse = self
            .client
            .send(Method::POST, "/api/v3/userDataStream", None, &headers)
            .await?;
        debug!("listen key created");
        Ok(response.listen_key)
    }

    /// Extend the key's 60 minute validity.
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), BinanceRestError> {
        self.keyed_empty(Method::PUT, Some(&format!("listenKey={listen_key}")))
            .await?;
        debug!("listen key refreshed");
        Ok(())
    }

    pub async fn close_listen_key(&self, listen_key: &str) -> Result<(), BinanceRestError> {
        self.keyed_empty(Method::DELETE, Some(&format!("listenKey={listen_key}")))
            .await
    }

    pub async fn new_order(&self, params: &OrderParams) -> Result<OrderReport, BinanceRestError> {
        let report: OrderReport = self
            .signed(Method::POST, "/api/v3/order", &params.to_query())
            .await?;
        info!(
            symbol = %report.symbol,
            client_order_id = %report.client_order_id,
            status = %report.status,
            "binance order accepted"
        );
        Ok(report)
    }

    pub async fn new_oco(&self, params: &OcoParams) -> Result<OcoResponse, BinanceRestError> {
        let response: OcoResponse = self
            .signed(Method::POST, "/api/v3/order/oco", &params.to_query())
            .await?;
        info!(
            list_client_order_id = %response.list_client_order_id,
            order_list_id = response.order_list_id,
            "binance oco accepted"
        );
        Ok(response)
    }

    /// `None` when the exchange does not know the order (-2011).
    pub async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderReport>, BinanceRestError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        match self.signed(Method::DELETE, "/api/v3/order", &params).await {
            Ok(report) => Ok(Some(report)),
            Err(BinanceRestError::UnknownOrder(message)) => {
                debug!(client_order_id = %client_order_id, message = %message, "cancel of unknown order ignored");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Most recent orders for `symbol`, oldest first.
    pub async fn all_orders(&self, symbol: &str) -> Result<Vec<QueriedOrder>, BinanceRestError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("limit", ALL_ORDERS_LIMIT.to_string()),
        ];
        self.signed(Method::GET, "/api/v3/allOrders", &params).await
    }

    pub async fn avg_price(&self, symbol: &str) -> Result<Decimal, BinanceRestError> {
        let query = format!("symbol={symbol}");
        let response: AvgPriceResponse = self
            .client
            .send(Method::GET, "/api/v3/avgPrice", Some(&query), &[])
            .await?;
        Ok(response.price)
    }

    pub async fn balance(&self, asset: &str) -> Result<Option<AssetBalance>, BinanceRestError> {
        let account: AccountResponse = self
            .signed(Method::GET, "/api/v3/account", &[("omitZeroBalances", "false".to_string())])
            .await?;
        Ok(account.balances.into_iter().find(|b| b.asset == asset))
    }

    pub async fn symbol_entry(&self, symbol: &str) -> Result<Option<SymbolEntry>, BinanceRestError> {
        let query = format!("symbol={symbol}");
        let info: ExchangeInfoResponse = self
            .client
            .send(Method::GET, "/api/v3/exchangeInfo", Some(&query), &[])
            .await?;
        Ok(info.symbols.into_iter().find(|s| s.symbol == symbol))
    }
}

impl std::fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("environment", &self.environment)
            .field("api_key", &self.signer.api_key())
            .field("time_offset_ms", &self.time_offset_ms.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_buy_uses_quote_quantity() {
        let params = OrderParams {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            client_order_id: "tbotprod0001-5".into(),
            quantity: None,
            quote_order_qty: Some(dec!(25.50)),
            price: None,
            stop_price: None,
            time_in_force: None,
        };
        let query = params.to_query();
        assert!(query.contains(&("quoteOrderQty", "25.5".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "quantity" || *k == "timeInForce"));
    }

    #[test]
    fn test_stop_limit_carries_both_prices() {
        let params = OrderParams {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            order_type: OrderType::StopLossLimit,
            client_order_id: "tbotprod0001-6".into(),
            quantity: Some(dec!(0.00100000)),
            quote_order_qty: None,
            price: Some(dec!(27000)),
            stop_price: Some(dec!(30000.00)),
            time_in_force: Some(TimeInForce::GTC),
        };
        let query = params.to_query();
        assert!(query.contains(&("type", "STOP_LOSS_LIMIT".to_string())));
        assert!(query.contains(&("quantity", "0.001".to_string())));
        assert!(query.contains(&("stopPrice", "30000".to_string())));
        assert!(query.contains(&("timeInForce", "GTC".to_string())));
    }

    #[test]
    fn test_oco_query_names_both_legs() {
        let params = OcoParams {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            quantity: dec!(1),
            price: dec!(120),
            stop_price: dec!(90),
            stop_limit_price: dec!(81),
            list_client_order_id: "tbotprod0001-7".into(),
            limit_client_order_id: "tbotprod0001-7".into(),
            stop_client_order_id: "tbotprod0001-8".into(),
        };
        let query = params.to_query();
        assert!(query.contains(&("stopLimitTimeInForce", "GTC".to_string())));
        assert!(query.contains(&("stopClientOrderId", "tbotprod0001-8".to_string())));
    }
}

//! Exchange-facing side of the engine.
//!
//! [`ExchangeAdapter`] is what each venue implements. [`OrderGateway`] wraps
//! one adapter with the order store and the lifecycle engine so callers get
//! placement, rollback on failure, and acknowledgement handling in one call.

mod adapter;
mod client_id;
mod gateway;
mod registry;

pub use adapter::{ExchangeAdapter, OcoRequest, OrderRequest, SharedAdapter, Sizing};
pub use client_id::ClientIdCodec;
pub use gateway::{OcoLeg, OcoPlacement, OrderGateway, Placement};
pub use registry::{AdapterConstructor, AdapterFactory, ConnectionRegistry};

use execution_core::{EngineError, ExchangeEvent};
use model::{ExchangeName, OrderId, OrderStatus};
use order_store::StoreError;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Shutdown requested")]
    Shutdown,

    /// Rejection or transport failure reported by the venue's API.
    #[error("Exchange error{}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
    Exchange {
        code: Option<i64>,
        message: String,
        retryable: bool,
    },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Invalid client id tag '{0}': expected 12 word characters")]
    InvalidClientIdTag(String),

    #[error("No adapter registered for exchange {0}")]
    UnsupportedExchange(ExchangeName),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Order {order} is {status}, expected ACTIVE")]
    OrderNotActive { order: OrderId, status: OrderStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ConnectorError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WebSocket(_) | Self::ConnectionClosed => true,
            Self::Exchange { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type EventSender = mpsc::Sender<ExchangeEvent>;
pub type EventReceiver = mpsc::Receiver<ExchangeEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

use model::{CallbackStatus, OrderId, OrderStatus, PositionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("position {position} already has an order keyed '{key}'")]
    DuplicatePositionKey { position: PositionId, key: String },

    #[error("order {order}: callback status cannot move {from} -> {to}")]
    InvalidCallbackTransition {
        order: OrderId,
        from: CallbackStatus,
        to: CallbackStatus,
    },

    /// Replay needs a settled order whose callback failed or never finished.
    #[error("order {order} is {status} with callback {callback}, not replayable")]
    NotReplayable {
        order: OrderId,
        status: OrderStatus,
        callback: CallbackStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row that no longer decodes.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

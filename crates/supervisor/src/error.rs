use connector_core::ConnectorError;
use order_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("event stream ended without shutdown")]
    StreamEnded,

    #[error("stream task panicked: {0}")]
    StreamPanicked(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("command consumer task failed: {0}")]
    Join(String),
}

impl CommandError {
    /// A bad payload is dropped; anything else means the source is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

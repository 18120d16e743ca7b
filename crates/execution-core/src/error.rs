use order_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure raised by an algorithm callback.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("no algorithm registered as '{0}'")]
    UnknownAlgorithm(String),

    #[error("algorithm '{algorithm}' has no method '{method}'")]
    UnknownMethod { algorithm: String, method: String },

    #[error("invalid callback parameters: {0}")]
    InvalidParams(String),

    #[error("callback failed: {0}")]
    Failed(String),
}

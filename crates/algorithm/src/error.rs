use connector_core::ConnectorError;
use execution_core::InvocationError;
use order_store::StoreError;
use model::{BotId, BotStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("algorithm '{algorithm}' has no method '{method}'")]
    UnknownMethod { algorithm: String, method: String },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bot {bot} is {status}, expected ON")]
    BotNotOn { bot: BotId, status: BotStatus },

    #[error("{0}")]
    Failed(String),
}

impl AlgorithmError {
    pub fn unknown_method(algorithm: &str, method: &str) -> Self {
        Self::UnknownMethod {
            algorithm: algorithm.to_string(),
            method: method.to_string(),
        }
    }
}

impl From<AlgorithmError> for InvocationError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::UnknownMethod { algorithm, method } => {
                InvocationError::UnknownMethod { algorithm, method }
            }
            AlgorithmError::InvalidParams(message) => InvocationError::InvalidParams(message),
            other => InvocationError::Failed(other.to_string()),
        }
    }
}

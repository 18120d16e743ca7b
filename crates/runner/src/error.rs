use algorithm::AlgorithmError;
use common::ConfigError;
use connector_core::ConnectorError;
use execution_core::EngineError;
use order_store::StoreError;
use supervisor::{CommandError, SupervisorError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),
}

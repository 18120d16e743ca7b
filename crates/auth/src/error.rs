use model::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The connection row carries no API key or secret.
    #[error("Connection {0} has no API credentials")]
    MissingCredentials(ConnectionId),
}

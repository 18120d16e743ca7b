//! START/STOP command wire format.

use crate::error::CommandError;
use model::ConnectionId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Start,
    Stop,
    /// Anything else. Handled as a no-op.
    Unknown(String),
}

impl CommandAction {
    fn parse(raw: &str) -> Self {
        match raw {
            "START" => Self::Start,
            "STOP" => Self::Stop,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control message for one connection's stream worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCommand {
    pub connection_id: ConnectionId,
    pub action: CommandAction,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommand {
    exchange_connection_id: i64,
    command: String,
}

impl StreamCommand {
    pub fn start(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            action: CommandAction::Start,
        }
    }

    pub fn stop(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            action: CommandAction::Stop,
        }
    }

    /// Parse `{"exchangeConnectionId": 7, "command": "START"}`. Extra fields
    /// are ignored.
    pub fn from_json(payload: &str) -> Result<Self, CommandError> {
        let wire: WireCommand = serde_json::from_str(payload)?;
        Ok(Self {
            connection_id: ConnectionId(wire.exchange_connection_id),
            action: CommandAction::parse(&wire.command),
        })
    }

    pub fn to_json(&self) -> String {
        let wire = WireCommand {
            exchange_connection_id: self.connection_id.0,
            command: self.action.as_str().to_string(),
        };
        // Cannot fail for an integer and a string.
        serde_json::to_string(&wire).unwrap_or_default()
    }
}

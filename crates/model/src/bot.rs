use crate::ids::{BotId, ConnectionId, PositionId, RoundId};
use crate::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    /// Trading; order callbacks are dispatched.
    On,
    Off,
    Error,
    /// Stopped because its open orders were canceled.
    Canceled,
    Done,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Error => "ERROR",
            Self::Canceled => "CANCELED",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "ERROR" => Ok(Self::Error),
            "CANCELED" => Ok(Self::Canceled),
            "DONE" => Ok(Self::Done),
            _ => Err(ParseEnumError::new("bot status", s)),
        }
    }
}

/// A strategy instance bound to one connection and one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub connection_id: ConnectionId,
    pub symbol: String,
    /// Registration tag of the algorithm that drives this bot, e.g. `DCA1`.
    pub algorithm: String,
    pub status: BotStatus,
    /// Strategy parameters. Opaque to the engine.
    pub params: serde_json::Value,
}

impl Bot {
    pub fn is_on(&self) -> bool {
        self.status == BotStatus::On
    }
}

/// One trading cycle of a bot. The highest id is the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub bot_id: BotId,
}

/// Orders that together express one trading intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub round_id: RoundId,
}

//! JSON messages exchanged with the game server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geometry::Coord;
use crate::grid::OccupancyTransport;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed embedded game state at {path}: {source}")]
    EmbeddedState {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    GameState {
        state: SnapshotPayload,
    },
    Updates {
        updates: Vec<UpdateEntry>,
    },
    Winner {
        #[serde(default)]
        winner: Option<String>,
    },
    Error {
        msg: String,
    },
    #[serde(other)]
    Unknown,
}

/// `gameState.state` arrives either as an inline object or JSON-encoded text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Inline(Box<GameStateDto>),
    Encoded(String),
}

impl SnapshotPayload {
    pub fn into_dto(self) -> Result<GameStateDto, ProtocolError> {
        match self {
            SnapshotPayload::Inline(dto) => Ok(*dto),
            SnapshotPayload::Encoded(text) => {
                let mut deserializer = serde_json::Deserializer::from_str(&text);
                serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                    ProtocolError::EmbeddedState {
                        path: error.path().to_string(),
                        source: error.into_inner(),
                    }
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameStateDto {
    pub dim: usize,
    #[serde(default)]
    pub grid: Option<OccupancyTransport>,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerDto>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerDto {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pos: Option<Coord>,
    #[serde(default)]
    pub hp: i32,
    #[serde(default)]
    pub ap: i32,
    #[serde(default)]
    pub range: i32,
    #[serde(default)]
    pub vote: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateEntry {
    pub player: String,
    pub stat: String,
    #[serde(default)]
    pub val: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Attack { patient: String, amount: u32 },
    Give { patient: String, amount: u32 },
    Upgrade { amount: u32 },
    Move { coord: Coord },
    Vote { patient: Option<String> },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Attack { .. } => "attack",
            ClientMessage::Give { .. } => "give",
            ClientMessage::Upgrade { .. } => "upgrade",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Vote { .. } => "vote",
        }
    }
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| ProtocolError::Decode {
        path: error.path().to_string(),
        source: error.into_inner(),
    })
}

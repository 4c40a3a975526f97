use serde::{Deserialize, Serialize};

use crate::maze::Maze;
use crate::player::{Player, PlayerId};
use crate::treasure::Treasure;

/// Point-in-time copy of a room, served over `GET /rooms/{code}`.
///
/// This is the recovery channel: a (re)connecting or spectating client seeds
/// its local state from one of these before consuming the live stream. A
/// client that finds `game_started=true` derives the start transition locally
/// instead of waiting for the one-shot `game_start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub host: PlayerId,
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maze: Option<Maze>,
    pub treasures: Vec<Treasure>,
    pub game_started: bool,
    /// Set once the room is finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

/// Wrapper matching the `{"room": ...}` response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshotResponse {
    pub room: RoomSnapshot,
}

/// One row of the `GET /rooms` browser listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListEntry {
    pub code: String,
    pub player_count: usize,
    pub max_players: usize,
    pub game_started: bool,
}

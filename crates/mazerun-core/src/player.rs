use serde::{Deserialize, Serialize};

/// Server-allocated player identifier, unique within a room.
pub type PlayerId = u32;

/// A roster entry as every client sees it.
///
/// Positions are maze-grid units; translating them into any rendering space
/// is the embedding layer's concern. `ready` only means something while the
/// room is in the lobby; `treasure_count` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub x: f32,
    pub z: f32,
    pub heading: f32,
    pub ready: bool,
    pub treasure_count: u32,
    pub connected: bool,
}

impl Player {
    pub fn new(id: PlayerId, display_name: String) -> Self {
        Self {
            id,
            display_name,
            x: 0.0,
            z: 0.0,
            heading: 0.0,
            ready: false,
            treasure_count: 0,
            connected: true,
        }
    }
}

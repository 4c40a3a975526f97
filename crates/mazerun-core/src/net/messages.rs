use serde::{Deserialize, Serialize};

use crate::maze::Maze;
use crate::player::{Player, PlayerId};
use crate::room::RoomError;
use crate::treasure::Treasure;

/// Client → server events.
///
/// Wire form is the `{"type": ..., "payload": ...}` envelope: adjacently
/// tagged with snake_case event names, one schema per event type. Anything
/// that does not deserialize into exactly one of these is rejected and
/// logged at the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom(CreateRoomMsg),
    Join(JoinMsg),
    Ready(ReadyMsg),
    Move(MoveMsg),
    CollectTreasure(CollectTreasureMsg),
    LeaveRoom,
}

/// Server → client events, same envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated(RoomCreatedMsg),
    PlayerJoined(PlayerJoinedMsg),
    PlayerLeft(PlayerLeftMsg),
    Ready(ReadyUpdateMsg),
    GameStart(Box<GameStartMsg>),
    PlayerUpdate(PlayerUpdateMsg),
    TreasureCollected(TreasureCollectedMsg),
    GameWon(GameWonMsg),
    Error(ErrorMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomMsg {
    pub player_name: String,
    /// 0 means unversioned (accepted); anything else must match
    /// [`crate::net::protocol::PROTOCOL_VERSION`].
    #[serde(default)]
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMsg {
    pub room_code: String,
    pub player_name: String,
    /// Present when reclaiming a mid-game slot after a disconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default)]
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyMsg {
    pub ready: bool,
}

/// A proposed position. `seq` is the sender's monotonic move counter; the
/// authority drops anything not newer than the last accepted update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMsg {
    pub x: f32,
    pub z: f32,
    pub heading: f32,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectTreasureMsg {
    pub treasure_id: String,
}

/// Acknowledgment to the host; only ever sent to the creating connection,
/// so the private fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedMsg {
    pub room_code: String,
    pub players: Vec<Player>,
    pub self_id: PlayerId,
    pub session_token: String,
}

/// Roster update after a join. The copy delivered to the joiner carries
/// `self_id`/`session_token`; the broadcast copies omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedMsg {
    pub player_id: PlayerId,
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Roster update after a leave or a mid-game disconnect. A disconnected
/// player mid-game stays in `players` with `connected=false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftMsg {
    pub player_id: PlayerId,
    pub players: Vec<Player>,
    pub host: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyUpdateMsg {
    pub player_id: PlayerId,
    pub ready: bool,
}

/// The one-shot start snapshot: every client observes the same maze,
/// treasures, and spawn positions in a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartMsg {
    pub maze: Maze,
    pub treasures: Vec<Treasure>,
    pub players: Vec<Player>,
}

/// Compact movement delta, rebroadcast to everyone except the mover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateMsg {
    pub player_id: PlayerId,
    pub x: f32,
    pub z: f32,
    pub heading: f32,
    pub seq: u64,
}

/// Arbitration result; carries the collector's authoritative new count so
/// clients assign rather than increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasureCollectedMsg {
    pub treasure_id: String,
    pub player_id: PlayerId,
    pub treasure_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCountEntry {
    pub player_id: PlayerId,
    pub treasure_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameWonMsg {
    pub winner: PlayerId,
    pub counts: Vec<PlayerCountEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMsg {
    pub code: RoomError,
    pub message: String,
}

impl ErrorMsg {
    pub fn from_error(err: RoomError) -> Self {
        Self {
            code: err,
            message: err.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::GridPos;
    use crate::test_helpers::{make_players, open_maze};

    #[test]
    fn create_room_json_shape() {
        let msg = ClientMessage::CreateRoom(CreateRoomMsg {
            player_name: "Alice".into(),
            protocol_version: 1,
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "create_room");
        assert_eq!(json["payload"]["playerName"], "Alice");
        assert_eq!(json["payload"]["protocolVersion"], 1);
    }

    #[test]
    fn join_defaults_optional_fields() {
        let json = r#"{"type":"join","payload":{"roomCode":"AB2C","playerName":"Bob"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join(j) => {
                assert_eq!(j.room_code, "AB2C");
                assert_eq!(j.session_token, None);
                assert_eq!(j.protocol_version, 0);
            },
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn leave_room_has_no_payload() {
        let json = serde_json::to_value(&ClientMessage::LeaveRoom).unwrap();
        assert_eq!(json["type"], "leave_room");
        assert!(json.get("payload").is_none());
        let back: ClientMessage = serde_json::from_str(r#"{"type":"leave_room"}"#).unwrap();
        assert_eq!(back, ClientMessage::LeaveRoom);
    }

    #[test]
    fn move_round_trip() {
        let msg = ClientMessage::Move(MoveMsg {
            x: 3.25,
            z: 7.5,
            heading: 270.0,
            seq: 42,
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn collect_treasure_json_shape() {
        let msg = ClientMessage::CollectTreasure(CollectTreasureMsg {
            treasure_id: "t3".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "collect_treasure");
        assert_eq!(json["payload"]["treasureId"], "t3");
    }

    #[test]
    fn room_created_json_shape() {
        let msg = ServerMessage::RoomCreated(RoomCreatedMsg {
            room_code: "AB2C".into(),
            players: make_players(1),
            self_id: 1,
            session_token: "tok".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "room_created");
        assert_eq!(json["payload"]["roomCode"], "AB2C");
        assert_eq!(json["payload"]["selfId"], 1);
        assert_eq!(json["payload"]["players"][0]["displayName"], "Player1");
    }

    #[test]
    fn broadcast_copy_of_player_joined_omits_private_fields() {
        let msg = ServerMessage::PlayerJoined(PlayerJoinedMsg {
            player_id: 2,
            players: make_players(2),
            self_id: None,
            session_token: None,
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert!(json["payload"].get("selfId").is_none());
        assert!(json["payload"].get("sessionToken").is_none());
    }

    #[test]
    fn game_start_round_trip() {
        let msg = ServerMessage::GameStart(Box::new(GameStartMsg {
            maze: open_maze(7, 7),
            treasures: vec![Treasure::new(0, GridPos { x: 2, z: 2 })],
            players: make_players(2),
        }));
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn ready_update_round_trip() {
        let msg = ServerMessage::Ready(ReadyUpdateMsg {
            player_id: 1,
            ready: true,
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(json["payload"]["playerId"], 1);
        let back: ServerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn treasure_collected_round_trip() {
        let msg = ServerMessage::TreasureCollected(TreasureCollectedMsg {
            treasure_id: "t3".into(),
            player_id: 2,
            treasure_count: 4,
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn game_won_round_trip() {
        let msg = ServerMessage::GameWon(GameWonMsg {
            winner: 1,
            counts: vec![
                PlayerCountEntry {
                    player_id: 1,
                    treasure_count: 5,
                },
                PlayerCountEntry {
                    player_id: 2,
                    treasure_count: 3,
                },
            ],
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn error_json_shape() {
        let msg = ServerMessage::Error(ErrorMsg::from_error(RoomError::RoomFull));
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["code"], "room_full");
        assert_eq!(json["payload"]["message"], "room is full");
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let json = r#"{"type":"fly_to_moon","payload":{"speed":9000}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn server_event_is_not_a_client_event() {
        let json = r#"{"type":"game_won","payload":{"winner":1,"counts":[]}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }
}

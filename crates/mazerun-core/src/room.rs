use serde::{Deserialize, Serialize};

/// Lifecycle of a room. The state only ever advances, never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Lobby,
    Active,
    Finished,
}

/// Requester-visible failures. These are sent back on the requesting
/// connection only, never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomError {
    RoomNotFound,
    RoomFull,
    GameAlreadyStarted,
    GameOver,
}

impl RoomError {
    pub fn message(self) -> &'static str {
        match self {
            Self::RoomNotFound => "room not found",
            Self::RoomFull => "room is full",
            Self::GameAlreadyStarted => "game already started",
            Self::GameOver => "game is over",
        }
    }
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RoomError {}

/// Room code length. Codes are case-insensitive; the canonical form is
/// uppercase.
pub const ROOM_CODE_LEN: usize = 4;

/// Alphabet without the easily confused glyphs (I/L/O/0/1).
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a random (not necessarily unique) room code.
pub fn generate_room_code() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical (uppercase, trimmed) form of a user-supplied code.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Check a canonical room code against the expected format.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN
        && code
            .bytes()
            .all(|b| ROOM_CODE_ALPHABET.contains(&b.to_ascii_uppercase()))
}

/// Maze seed for a room, derived from its code (FNV-1a) so the same room
/// always regenerates the same maze and treasure list.
pub fn maze_seed(code: &str) -> u64 {
    code.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

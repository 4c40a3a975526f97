use mazerun_core::maze::{Maze, PLAYER_RADIUS, normalize_heading, position_clear};
use mazerun_core::net::messages::{MoveMsg, PlayerUpdateMsg};
use mazerun_core::player::Player;
use mazerun_core::treasure::Treasure;

/// Result of judging a proposed position.
#[derive(Debug, PartialEq)]
pub enum MoveOutcome {
    /// Committed; carries the delta to rebroadcast to everyone else.
    Accepted(PlayerUpdateMsg),
    /// Not newer than the last accepted update; dropped.
    Stale,
    /// Out of bounds or overlapping a wall; dropped.
    Blocked,
}

/// Validate and commit a proposed move.
///
/// Proposals are accepted only when `seq` is strictly newer than the last
/// accepted update for this player, guarding against reordered delivery.
/// Rejections are silent: a compliant client never sends them, so there is
/// nothing useful to tell the sender.
pub fn apply_move(
    player: &mut Player,
    last_seq: &mut u64,
    maze: &Maze,
    mv: &MoveMsg,
) -> MoveOutcome {
    if mv.seq <= *last_seq {
        return MoveOutcome::Stale;
    }
    if !position_clear(maze, mv.x, mv.z, PLAYER_RADIUS) {
        return MoveOutcome::Blocked;
    }
    *last_seq = mv.seq;
    player.x = mv.x;
    player.z = mv.z;
    player.heading = normalize_heading(mv.heading);
    MoveOutcome::Accepted(PlayerUpdateMsg {
        player_id: player.id,
        x: player.x,
        z: player.z,
        heading: player.heading,
        seq: mv.seq,
    })
}

/// Basic server-side position check for a collection attempt: the collector
/// must stand within `radius` of the treasure's cell center.
pub fn within_reach(player: &Player, treasure: &Treasure, radius: f32) -> bool {
    let (tx, tz) = treasure.center();
    let dx = player.x - tx;
    let dz = player.z - tz;
    dx * dx + dz * dz <= radius * radius
}

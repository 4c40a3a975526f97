use std::time::Duration;

use mazerun_core::room::RoomState;
use mazerun_core::snapshot::RoomSnapshot;

use crate::reconcile::ApplyOutcome;
use crate::view::{ClientView, ViewEvent};

/// How long a client waits for a join acknowledgment before surfacing the
/// attempt as failed. The transport layer owns the actual timer.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

impl ClientView {
    /// Seed the view from a `GET /rooms/{code}` snapshot.
    ///
    /// This is the single reconnection/spectating strategy: fetch the
    /// snapshot over the side channel, seed, then consume the live stream —
    /// only events observed after the snapshot are applied on top. If the
    /// room is already running, the start transition is derived here,
    /// because the one-shot `game_start` event is never resent. Re-seeding
    /// from an identical snapshot is a no-op.
    pub fn seed_from_snapshot(&mut self, snapshot: &RoomSnapshot) -> ApplyOutcome {
        self.room_code = Some(snapshot.code.clone());
        let merge = self.merge_roster(&snapshot.players);
        self.host = Some(snapshot.host);
        if snapshot.maze.is_some() {
            self.maze = snapshot.maze.clone();
        }
        let treasures_changed = self.treasures != snapshot.treasures;
        self.treasures = snapshot.treasures.clone();

        // lifecycle only ever advances, never regresses
        let state_before = self.state;
        if let Some(winner) = snapshot.winner {
            self.winner = Some(winner);
            self.state = RoomState::Finished;
        } else if snapshot.game_started && self.state == RoomState::Lobby {
            self.state = RoomState::Active;
        }
        if state_before == RoomState::Lobby && self.state == RoomState::Active {
            self.push_event(ViewEvent::GameStarted);
        }
        if state_before != RoomState::Finished && self.state == RoomState::Finished
            && let Some(winner) = self.winner
        {
            self.push_event(ViewEvent::GameWon { winner });
        }

        if merge.resync {
            self.push_event(ViewEvent::ResyncNeeded);
            return ApplyOutcome::NeedsResync;
        }
        if merge.changed || treasures_changed || state_before != self.state {
            self.push_event(ViewEvent::RosterChanged);
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Ignored
        }
    }
}

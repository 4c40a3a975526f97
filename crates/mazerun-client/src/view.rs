use std::collections::VecDeque;

use mazerun_core::maze::{Maze, PLAYER_RADIUS, normalize_heading, position_clear};
use mazerun_core::net::messages::{
    ClientMessage, CollectTreasureMsg, CreateRoomMsg, ErrorMsg, JoinMsg, MoveMsg, ReadyMsg,
};
use mazerun_core::net::protocol::PROTOCOL_VERSION;
use mazerun_core::player::{Player, PlayerId};
use mazerun_core::room::{RoomError, RoomState, normalize_room_code};
use mazerun_core::treasure::Treasure;

/// What this connection is allowed to do. An observer is a receive-only
/// subscriber: it shares the same reconciled view but never emits join,
/// ready, move, or collect requests and is not part of the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Participant,
    Observer,
}

/// Notifications for the rendering/UI layer, one per broadcast class.
/// Drained with [`ClientView::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    RosterChanged,
    ReadyChanged {
        player_id: PlayerId,
        ready: bool,
    },
    GameStarted,
    PlayerMoved {
        player_id: PlayerId,
    },
    TreasureCollected {
        treasure_id: String,
        player_id: PlayerId,
        treasure_count: u32,
    },
    GameWon {
        winner: PlayerId,
    },
    ErrorReceived {
        code: RoomError,
        message: String,
    },
    /// Authoritative state diverged from local prediction beyond tolerance;
    /// the owner should re-run the snapshot recovery path.
    ResyncNeeded,
}

/// A roster mirror entry. The wrapper survives every merge, so bookkeeping
/// attached to it (like the delta sequence gate) is never lost when
/// authoritative snapshots arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub player: Player,
    pub(crate) last_update_seq: u64,
}

impl PlayerEntry {
    pub(crate) fn new(player: Player) -> Self {
        Self {
            player,
            last_update_seq: 0,
        }
    }
}

/// Client-held mirror of one room: roster, maze, treasures, lifecycle, plus
/// the locally predicted position of the local player.
///
/// Inbound [`mazerun_core::net::messages::ServerMessage`]s are folded in via
/// [`ClientView::apply`]; local intents are produced by the `*_message` and
/// `try_*` builders, which also apply the optimistic local side effect.
#[derive(Debug)]
pub struct ClientView {
    pub(crate) capability: Capability,
    pub(crate) room_code: Option<String>,
    pub(crate) host: Option<PlayerId>,
    pub(crate) self_id: Option<PlayerId>,
    pub(crate) session_token: Option<String>,
    pub(crate) state: RoomState,
    pub(crate) players: Vec<PlayerEntry>,
    pub(crate) maze: Option<Maze>,
    pub(crate) treasures: Vec<Treasure>,
    pub(crate) winner: Option<PlayerId>,
    pub(crate) last_error: Option<ErrorMsg>,
    pub(crate) move_seq: u64,
    pub(crate) events: VecDeque<ViewEvent>,
}

impl ClientView {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            room_code: None,
            host: None,
            self_id: None,
            session_token: None,
            state: RoomState::Lobby,
            players: Vec::new(),
            maze: None,
            treasures: Vec::new(),
            winner: None,
            last_error: None,
            move_seq: 0,
            events: VecDeque::new(),
        }
    }

    pub fn participant() -> Self {
        Self::new(Capability::Participant)
    }

    pub fn observer() -> Self {
        Self::new(Capability::Observer)
    }

    // -- accessors ---------------------------------------------------------

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    pub fn self_id(&self) -> Option<PlayerId> {
        self.self_id
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn maze(&self) -> Option<&Maze> {
        self.maze.as_ref()
    }

    pub fn treasures(&self) -> &[Treasure] {
        &self.treasures
    }

    /// Roster in join order.
    pub fn players(&self) -> Vec<&Player> {
        self.players.iter().map(|e| &e.player).collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players
            .iter()
            .find(|e| e.player.id == id)
            .map(|e| &e.player)
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.player(self.self_id?)
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn last_error(&self) -> Option<&ErrorMsg> {
        self.last_error.as_ref()
    }

    /// Drain pending notifications for the rendering/UI layer.
    pub fn drain_events(&mut self) -> Vec<ViewEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn push_event(&mut self, event: ViewEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn is_local(&self, id: PlayerId) -> bool {
        self.self_id == Some(id)
    }

    // -- local intents (optimistic side) -----------------------------------

    /// Build a `create_room` request. Observers never emit requests.
    pub fn create_message(&self, player_name: &str) -> Option<ClientMessage> {
        if self.capability != Capability::Participant {
            return None;
        }
        Some(ClientMessage::CreateRoom(CreateRoomMsg {
            player_name: player_name.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }))
    }

    /// Build a `join` request and remember the target room. Passes the held
    /// session token so a rejoin reclaims the old slot.
    pub fn join_message(&mut self, room_code: &str, player_name: &str) -> Option<ClientMessage> {
        if self.capability != Capability::Participant {
            return None;
        }
        let code = normalize_room_code(room_code);
        self.room_code = Some(code.clone());
        Some(ClientMessage::Join(JoinMsg {
            room_code: code,
            player_name: player_name.to_string(),
            session_token: self.session_token.clone(),
            protocol_version: PROTOCOL_VERSION,
        }))
    }

    pub fn ready_message(&self, ready: bool) -> Option<ClientMessage> {
        if self.capability != Capability::Participant
            || self.self_id.is_none()
            || self.state != RoomState::Lobby
        {
            return None;
        }
        Some(ClientMessage::Ready(ReadyMsg { ready }))
    }

    pub fn leave_message(&self) -> Option<ClientMessage> {
        if self.capability != Capability::Participant || self.self_id.is_none() {
            return None;
        }
        Some(ClientMessage::LeaveRoom)
    }

    /// Optimistic local move: validated against the locally-held maze with
    /// the same collision sampling the server uses, applied immediately, and
    /// returned for sending upstream. The server's later confirmation is not
    /// replayed on top (it matches as long as both sides hold the same maze).
    pub fn try_move(&mut self, x: f32, z: f32, heading: f32) -> Option<ClientMessage> {
        if self.capability != Capability::Participant || self.state != RoomState::Active {
            return None;
        }
        let self_id = self.self_id?;
        let maze = self.maze.as_ref()?;
        if !position_clear(maze, x, z, PLAYER_RADIUS) {
            return None;
        }
        let entry = self.players.iter_mut().find(|e| e.player.id == self_id)?;
        entry.player.x = x;
        entry.player.z = z;
        entry.player.heading = normalize_heading(heading);
        self.move_seq += 1;
        Some(ClientMessage::Move(MoveMsg {
            x,
            z,
            heading: entry.player.heading,
            seq: self.move_seq,
        }))
    }

    /// Optimistic local collect: marks the treasure taken (provisionally by
    /// us) but leaves every count alone — counts only ever come from the
    /// authoritative `treasure_collected` broadcast, so losing the race can
    /// never double-increment.
    pub fn try_collect(&mut self, treasure_id: &str) -> Option<ClientMessage> {
        if self.capability != Capability::Participant || self.state != RoomState::Active {
            return None;
        }
        let self_id = self.self_id?;
        let treasure = self.treasures.iter_mut().find(|t| t.id == treasure_id)?;
        if treasure.collected {
            return None;
        }
        treasure.collected = true;
        treasure.collected_by = Some(self_id);
        Some(ClientMessage::CollectTreasure(CollectTreasureMsg {
            treasure_id: treasure_id.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{joined_view, started_view};

    #[test]
    fn observer_emits_no_requests() {
        let mut view = ClientView::observer();
        assert!(view.create_message("Watcher").is_none());
        assert!(view.join_message("AB2C", "Watcher").is_none());
        assert!(view.ready_message(true).is_none());
        assert!(view.leave_message().is_none());
        assert!(view.try_move(1.5, 1.5, 0.0).is_none());
        assert!(view.try_collect("t0").is_none());
    }

    #[test]
    fn join_message_normalizes_and_remembers_code() {
        let mut view = ClientView::participant();
        let msg = view.join_message(" ab2c ", "Bob").unwrap();
        match msg {
            ClientMessage::Join(j) => assert_eq!(j.room_code, "AB2C"),
            other => panic!("expected join, got {other:?}"),
        }
        assert_eq!(view.room_code(), Some("AB2C"));
    }

    #[test]
    fn ready_only_in_lobby() {
        let mut view = joined_view();
        assert!(view.ready_message(true).is_some());
        view = started_view();
        assert!(view.ready_message(true).is_none());
    }

    #[test]
    fn optimistic_move_applies_locally_with_increasing_seq() {
        let mut view = started_view();
        let before = view.local_player().unwrap().clone();
        let msg = view
            .try_move(before.x + 0.2, before.z, 450.0)
            .expect("open cell should accept the move");
        match msg {
            ClientMessage::Move(m) => {
                assert_eq!(m.seq, 1);
                assert_eq!(m.heading, 90.0);
            },
            other => panic!("expected move, got {other:?}"),
        }
        let after = view.local_player().unwrap();
        assert_eq!(after.x, before.x + 0.2);
        assert_eq!(after.heading, 90.0);

        let msg = view.try_move(before.x + 0.3, before.z, 90.0).unwrap();
        match msg {
            ClientMessage::Move(m) => assert_eq!(m.seq, 2),
            other => panic!("expected move, got {other:?}"),
        }
    }

    #[test]
    fn move_into_wall_is_not_sent_or_applied() {
        let mut view = started_view();
        let before = view.local_player().unwrap().clone();
        // (0.5, 0.5) is the enclosing wall ring
        assert!(view.try_move(0.5, 0.5, 0.0).is_none());
        let after = view.local_player().unwrap();
        assert_eq!((after.x, after.z), (before.x, before.z));
    }

    #[test]
    fn moves_require_an_active_game() {
        let mut view = joined_view();
        assert!(view.try_move(1.5, 1.5, 0.0).is_none());
    }

    #[test]
    fn optimistic_collect_marks_but_does_not_count() {
        let mut view = started_view();
        let id = view.treasures()[0].id.clone();
        let msg = view.try_collect(&id).expect("uncollected treasure");
        assert!(matches!(msg, ClientMessage::CollectTreasure(_)));
        let t = view.treasures().iter().find(|t| t.id == id).unwrap();
        assert!(t.collected);
        assert_eq!(t.collected_by, Some(1));
        assert_eq!(view.local_player().unwrap().treasure_count, 0);
        // a compliant client never re-requests a locally collected treasure
        assert!(view.try_collect(&id).is_none());
    }
}

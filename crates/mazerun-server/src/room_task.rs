use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use mazerun_core::maze::{self, Maze};
use mazerun_core::net::messages::{
    ErrorMsg, GameStartMsg, GameWonMsg, MoveMsg, PlayerCountEntry, PlayerJoinedMsg, PlayerLeftMsg,
    ReadyUpdateMsg, RoomCreatedMsg, ServerMessage, TreasureCollectedMsg,
};
use mazerun_core::net::protocol::encode_server_message;
use mazerun_core::player::{Player, PlayerId};
use mazerun_core::room::{RoomError, RoomState, maze_seed};
use mazerun_core::snapshot::{RoomListEntry, RoomSnapshot};
use mazerun_core::treasure::Treasure;

use crate::config::ServerConfig;
use crate::directory::RoomDirectory;
use crate::movement::{MoveOutcome, apply_move, within_reach};

/// Per-connection sender for outbound JSON frames. Cheap to clone when
/// broadcasting to the whole room.
pub type ClientSender = mpsc::Sender<Utf8Bytes>;

/// Handle to a room's actor task. All room mutations travel through `tx`
/// and are applied strictly one at a time by the task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub code: String,
    pub tx: mpsc::Sender<RoomCommand>,
}

/// Granted to a participant connection on a successful join.
#[derive(Debug)]
pub struct JoinGrant {
    pub player_id: PlayerId,
    pub session_token: String,
}

/// Granted to an observer connection on attach.
#[derive(Debug)]
pub struct WatchGrant {
    pub watcher: u64,
}

/// Mutations and queries processed sequentially by the room task.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        name: String,
        session_token: Option<String>,
        sender: ClientSender,
        reply: oneshot::Sender<Result<JoinGrant, RoomError>>,
    },
    Watch {
        sender: ClientSender,
        reply: oneshot::Sender<WatchGrant>,
    },
    Unwatch {
        watcher: u64,
    },
    Ready {
        player_id: PlayerId,
        ready: bool,
    },
    Move {
        player_id: PlayerId,
        mv: MoveMsg,
    },
    Collect {
        player_id: PlayerId,
        treasure_id: String,
    },
    Leave {
        player_id: PlayerId,
    },
    /// Connection closed without an explicit leave. Mid-game this preserves
    /// the roster slot for session-token reconnection.
    Disconnect {
        player_id: PlayerId,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Summary {
        reply: oneshot::Sender<RoomListEntry>,
    },
}

/// Seat the creating host and spawn the actor task for a new room.
///
/// The host is part of the roster before the room is ever visible, so the
/// roster is non-empty for as long as the room exists.
pub(crate) fn spawn_room(
    code: String,
    config: Arc<ServerConfig>,
    directory: Arc<RoomDirectory>,
    host_name: String,
    host_sender: ClientSender,
) -> (RoomHandle, JoinGrant) {
    let (tx, rx) = mpsc::channel(config.limits.room_command_buffer);
    let mut room = RoomTask::new(code.clone(), Arc::clone(&config));
    let grant = room.seat_host(host_name, host_sender);
    let handle = RoomHandle { code, tx };
    tokio::spawn(run_room(room, config, directory, rx));
    (handle, grant)
}

// Stand-in deadline for a timer that is not currently armed.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

async fn run_room(
    mut room: RoomTask,
    config: Arc<ServerConfig>,
    directory: Arc<RoomDirectory>,
    mut rx: mpsc::Receiver<RoomCommand>,
) {
    let code = room.code.clone();
    let idle_timeout = config.idle_timeout();

    let time_limit = tokio::time::sleep(FAR_FUTURE);
    tokio::pin!(time_limit);
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                idle.as_mut().reset(Instant::now() + idle_timeout);
                match room.handle(cmd) {
                    Flow::Continue => {},
                    Flow::Started => {
                        time_limit.as_mut().reset(Instant::now() + config.time_limit());
                    },
                    Flow::Teardown => break,
                }
            }
            _ = &mut time_limit, if room.state == RoomState::Active => {
                tracing::info!(room = %room.code, "time limit reached");
                room.force_finish();
            }
            _ = &mut idle => {
                if room.no_connected_members() {
                    tracing::info!(room = %room.code, "idle with no connected members");
                    break;
                }
                idle.as_mut().reset(Instant::now() + idle_timeout);
            }
        }
    }

    directory.remove(&code).await;
    tracing::info!(room = %code, "room closed");
}

enum Flow {
    Continue,
    Started,
    Teardown,
}

struct Member {
    player: Player,
    sender: Option<ClientSender>,
    session_token: String,
    spawn_slot: usize,
    last_move_seq: u64,
    /// Value of the room's collection counter when this player last
    /// collected; breaks leader ties in favor of whoever got there first.
    last_collect_order: u64,
}

struct RoomTask {
    code: String,
    config: Arc<ServerConfig>,
    state: RoomState,
    host: PlayerId,
    members: Vec<Member>,
    observers: Vec<(u64, ClientSender)>,
    next_player_id: PlayerId,
    next_watcher_id: u64,
    maze: Option<Maze>,
    treasures: Vec<Treasure>,
    collect_counter: u64,
    winner: Option<PlayerId>,
}

impl RoomTask {
    fn new(code: String, config: Arc<ServerConfig>) -> Self {
        Self {
            code,
            config,
            state: RoomState::Lobby,
            host: 0,
            members: Vec::new(),
            observers: Vec::new(),
            next_player_id: 1,
            next_watcher_id: 1,
            maze: None,
            treasures: Vec::new(),
            collect_counter: 0,
            winner: None,
        }
    }

    fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                name,
                session_token,
                sender,
                reply,
            } => self.handle_join(name, session_token, sender, reply),
            RoomCommand::Watch { sender, reply } => {
                let watcher = self.next_watcher_id;
                self.next_watcher_id += 1;
                self.observers.push((watcher, sender));
                let _ = reply.send(WatchGrant { watcher });
                Flow::Continue
            },
            RoomCommand::Unwatch { watcher } => {
                self.observers.retain(|(id, _)| *id != watcher);
                Flow::Continue
            },
            RoomCommand::Ready { player_id, ready } => self.handle_ready(player_id, ready),
            RoomCommand::Move { player_id, mv } => self.handle_move(player_id, &mv),
            RoomCommand::Collect {
                player_id,
                treasure_id,
            } => self.handle_collect(player_id, &treasure_id),
            RoomCommand::Leave { player_id } => self.handle_leave(player_id),
            RoomCommand::Disconnect { player_id } => self.handle_disconnect(player_id),
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                Flow::Continue
            },
            RoomCommand::Summary { reply } => {
                let _ = reply.send(RoomListEntry {
                    code: self.code.clone(),
                    player_count: self.members.len(),
                    max_players: self.config.rooms.max_players,
                    game_started: self.state != RoomState::Lobby,
                });
                Flow::Continue
            },
        }
    }

    // -- join / leave ------------------------------------------------------

    /// Seat the creating host before the command loop starts and hand them
    /// the `room_created` acknowledgment.
    fn seat_host(&mut self, name: String, sender: ClientSender) -> JoinGrant {
        let player_id = self.next_player_id;
        self.next_player_id += 1;
        let token = Uuid::new_v4().to_string();
        self.host = player_id;
        self.members.push(Member {
            player: Player::new(player_id, name),
            sender: Some(sender),
            session_token: token.clone(),
            spawn_slot: 0,
            last_move_seq: 0,
            last_collect_order: 0,
        });
        tracing::info!(room = %self.code, player_id, "room created by host");
        self.send_to(
            player_id,
            &ServerMessage::RoomCreated(RoomCreatedMsg {
                room_code: self.code.clone(),
                players: self.roster(),
                self_id: player_id,
                session_token: token.clone(),
            }),
        );
        JoinGrant {
            player_id,
            session_token: token,
        }
    }

    fn handle_join(
        &mut self,
        name: String,
        session_token: Option<String>,
        sender: ClientSender,
        reply: oneshot::Sender<Result<JoinGrant, RoomError>>,
    ) -> Flow {
        // Session reconnection reclaims an existing slot regardless of state.
        if let Some(token) = session_token
            && let Some(idx) = self.members.iter().position(|m| m.session_token == token)
        {
            let new_token = Uuid::new_v4().to_string();
            let member = &mut self.members[idx];
            member.sender = Some(sender);
            member.player.connected = true;
            member.session_token = new_token.clone();
            let player_id = member.player.id;
            let _ = reply.send(Ok(JoinGrant {
                player_id,
                session_token: new_token,
            }));
            tracing::info!(room = %self.code, player_id, "player reconnected via session token");
            self.announce_join(player_id);
            return Flow::Continue;
        }

        match self.state {
            RoomState::Lobby => {},
            RoomState::Active => {
                let _ = reply.send(Err(RoomError::GameAlreadyStarted));
                return Flow::Continue;
            },
            RoomState::Finished => {
                let _ = reply.send(Err(RoomError::GameOver));
                return Flow::Continue;
            },
        }
        if self.members.len() >= self.config.rooms.max_players {
            let _ = reply.send(Err(RoomError::RoomFull));
            return Flow::Continue;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;
        let token = Uuid::new_v4().to_string();
        let spawn_slot = self.free_spawn_slot();
        self.members.push(Member {
            player: Player::new(player_id, name),
            sender: Some(sender),
            session_token: token.clone(),
            spawn_slot,
            last_move_seq: 0,
            last_collect_order: 0,
        });
        let _ = reply.send(Ok(JoinGrant {
            player_id,
            session_token: token,
        }));
        tracing::info!(room = %self.code, player_id, "player joined");
        self.announce_join(player_id);
        Flow::Continue
    }

    /// Personalized copy to the subject, plain copy to everyone else.
    fn announce_join(&self, player_id: PlayerId) {
        let token = self
            .members
            .iter()
            .find(|m| m.player.id == player_id)
            .map(|m| m.session_token.clone());
        self.send_to(
            player_id,
            &ServerMessage::PlayerJoined(PlayerJoinedMsg {
                player_id,
                players: self.roster(),
                self_id: Some(player_id),
                session_token: token,
            }),
        );
        self.broadcast_except(
            player_id,
            &ServerMessage::PlayerJoined(PlayerJoinedMsg {
                player_id,
                players: self.roster(),
                self_id: None,
                session_token: None,
            }),
        );
    }

    fn handle_leave(&mut self, player_id: PlayerId) -> Flow {
        let Some(idx) = self.members.iter().position(|m| m.player.id == player_id) else {
            return Flow::Continue;
        };
        self.members.remove(idx);
        tracing::info!(room = %self.code, player_id, "player left");
        if self.members.is_empty() {
            return Flow::Teardown;
        }
        if self.host == player_id {
            // earliest remaining member becomes host
            self.host = self.members[0].player.id;
            tracing::info!(room = %self.code, new_host = self.host, "host reassigned");
        }
        self.broadcast(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id,
            players: self.roster(),
            host: self.host,
        }));
        Flow::Continue
    }

    fn handle_disconnect(&mut self, player_id: PlayerId) -> Flow {
        if self.state != RoomState::Active {
            return self.handle_leave(player_id);
        }
        let Some(member) = self.members.iter_mut().find(|m| m.player.id == player_id) else {
            return Flow::Continue;
        };
        member.sender = None;
        member.player.connected = false;
        tracing::info!(room = %self.code, player_id, "player disconnected mid-game, slot preserved");
        self.broadcast(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id,
            players: self.roster(),
            host: self.host,
        }));
        Flow::Continue
    }

    // -- lobby -------------------------------------------------------------

    fn handle_ready(&mut self, player_id: PlayerId, ready: bool) -> Flow {
        match self.state {
            RoomState::Finished => {
                self.send_error(player_id, RoomError::GameOver);
                return Flow::Continue;
            },
            RoomState::Active => {
                self.send_error(player_id, RoomError::GameAlreadyStarted);
                return Flow::Continue;
            },
            RoomState::Lobby => {},
        }
        let Some(member) = self.members.iter_mut().find(|m| m.player.id == player_id) else {
            return Flow::Continue;
        };
        member.player.ready = ready;
        self.broadcast(&ServerMessage::Ready(ReadyUpdateMsg { player_id, ready }));

        let enough = self.members.len() >= self.config.rooms.min_players_to_start;
        if enough && self.members.iter().all(|m| m.player.ready) {
            self.start_game();
            return Flow::Started;
        }
        Flow::Continue
    }

    /// The atomic Lobby→Active transition: generate the maze and treasures,
    /// place everyone on their spawn, and emit a single `game_start` so no
    /// client ever observes partial state.
    fn start_game(&mut self) {
        let layout = maze::generate(
            maze_seed(&self.code),
            self.config.maze.width,
            self.config.maze.height,
            self.config.maze.treasure_count,
        );
        for member in &mut self.members {
            let spawn = layout.spawns[member.spawn_slot % layout.spawns.len()];
            member.player.x = spawn.x as f32 + 0.5;
            member.player.z = spawn.z as f32 + 0.5;
            member.player.heading = 0.0;
        }
        self.treasures = layout
            .treasure_cells
            .iter()
            .enumerate()
            .map(|(i, cell)| Treasure::new(i, *cell))
            .collect();
        self.state = RoomState::Active;
        tracing::info!(
            room = %self.code,
            players = self.members.len(),
            treasures = self.treasures.len(),
            "game started"
        );
        let start = GameStartMsg {
            maze: layout.maze,
            treasures: self.treasures.clone(),
            players: self.roster(),
        };
        self.maze = Some(start.maze.clone());
        self.broadcast(&ServerMessage::GameStart(Box::new(start)));
    }

    // -- movement ----------------------------------------------------------

    fn handle_move(&mut self, player_id: PlayerId, mv: &MoveMsg) -> Flow {
        match self.state {
            RoomState::Finished => {
                self.send_error(player_id, RoomError::GameOver);
                return Flow::Continue;
            },
            RoomState::Lobby => {
                tracing::debug!(room = %self.code, player_id, "move before game start dropped");
                return Flow::Continue;
            },
            RoomState::Active => {},
        }
        let Some(maze) = self.maze.as_ref() else {
            return Flow::Continue;
        };
        let Some(member) = self.members.iter_mut().find(|m| m.player.id == player_id) else {
            return Flow::Continue;
        };
        match apply_move(&mut member.player, &mut member.last_move_seq, maze, mv) {
            MoveOutcome::Accepted(delta) => {
                // the mover already applied this optimistically; no echo
                self.broadcast_except(player_id, &ServerMessage::PlayerUpdate(delta));
            },
            MoveOutcome::Stale => {
                tracing::debug!(room = %self.code, player_id, seq = mv.seq, "stale move dropped");
            },
            MoveOutcome::Blocked => {
                // a compliant client never proposes these; stale maze or
                // non-compliant sender, nothing to answer
                tracing::debug!(room = %self.code, player_id, "blocked move dropped");
            },
        }
        Flow::Continue
    }

    // -- treasure arbitration ----------------------------------------------

    /// Check-then-set; atomic because every mutation for this room runs on
    /// this task.
    fn handle_collect(&mut self, player_id: PlayerId, treasure_id: &str) -> Flow {
        match self.state {
            RoomState::Finished => {
                self.send_error(player_id, RoomError::GameOver);
                return Flow::Continue;
            },
            RoomState::Lobby => return Flow::Continue,
            RoomState::Active => {},
        }
        let Some(member_idx) = self.members.iter().position(|m| m.player.id == player_id) else {
            return Flow::Continue;
        };
        let Some(treasure_idx) = self.treasures.iter().position(|t| t.id == treasure_id) else {
            tracing::debug!(room = %self.code, player_id, treasure_id, "unknown treasure");
            return Flow::Continue;
        };
        if self.treasures[treasure_idx].collected {
            // expected race outcome: the loser's client converges from the
            // winner's broadcast
            tracing::debug!(room = %self.code, player_id, treasure_id, "already collected");
            return Flow::Continue;
        }
        if !within_reach(
            &self.members[member_idx].player,
            &self.treasures[treasure_idx],
            self.config.maze.collect_radius,
        ) {
            tracing::debug!(room = %self.code, player_id, treasure_id, "collect out of reach");
            return Flow::Continue;
        }

        self.collect_counter += 1;
        let treasure = &mut self.treasures[treasure_idx];
        treasure.collected = true;
        treasure.collected_by = Some(player_id);
        let member = &mut self.members[member_idx];
        member.player.treasure_count += 1;
        member.last_collect_order = self.collect_counter;
        let new_count = member.player.treasure_count;
        tracing::info!(room = %self.code, player_id, treasure_id, count = new_count, "treasure collected");

        self.broadcast(&ServerMessage::TreasureCollected(TreasureCollectedMsg {
            treasure_id: treasure_id.to_string(),
            player_id,
            treasure_count: new_count,
        }));

        let total = self.treasures.len() as u32;
        if new_count == total {
            self.finish(player_id);
        } else if self.treasures.iter().all(|t| t.collected) {
            // no further progress is possible; the leader takes it
            if let Some(winner) = self.leader() {
                self.finish(winner);
            }
        }
        Flow::Continue
    }

    // -- finishing ---------------------------------------------------------

    fn force_finish(&mut self) {
        if self.state != RoomState::Active {
            return;
        }
        if let Some(winner) = self.leader() {
            self.finish(winner);
        }
    }

    fn finish(&mut self, winner: PlayerId) {
        self.state = RoomState::Finished;
        self.winner = Some(winner);
        let counts = self
            .members
            .iter()
            .map(|m| PlayerCountEntry {
                player_id: m.player.id,
                treasure_count: m.player.treasure_count,
            })
            .collect();
        tracing::info!(room = %self.code, winner, "game won");
        self.broadcast(&ServerMessage::GameWon(GameWonMsg { winner, counts }));
    }

    /// Highest count wins; ties go to whoever reached that count first
    /// (lower collection order), then to join order.
    fn leader(&self) -> Option<PlayerId> {
        let mut best: Option<&Member> = None;
        for member in &self.members {
            let better = match best {
                None => true,
                Some(b) => {
                    member.player.treasure_count > b.player.treasure_count
                        || (member.player.treasure_count == b.player.treasure_count
                            && member.last_collect_order < b.last_collect_order)
                },
            };
            if better {
                best = Some(member);
            }
        }
        best.map(|m| m.player.id)
    }

    // -- helpers -----------------------------------------------------------

    fn free_spawn_slot(&self) -> usize {
        let mut slot = 0;
        while self.members.iter().any(|m| m.spawn_slot == slot) {
            slot += 1;
        }
        slot
    }

    fn roster(&self) -> Vec<Player> {
        self.members.iter().map(|m| m.player.clone()).collect()
    }

    fn no_connected_members(&self) -> bool {
        self.members.iter().all(|m| m.sender.is_none())
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            host: self.host,
            players: self.roster(),
            maze: self.maze.clone(),
            treasures: self.treasures.clone(),
            game_started: self.state != RoomState::Lobby,
            winner: self.winner,
        }
    }

    fn send_error(&self, player_id: PlayerId, err: RoomError) {
        // requester-only; RoomErrors are never broadcast
        self.send_to(player_id, &ServerMessage::Error(ErrorMsg::from_error(err)));
    }

    fn send_to(&self, player_id: PlayerId, msg: &ServerMessage) {
        let Some(text) = self.encode(msg) else { return };
        if let Some(member) = self.members.iter().find(|m| m.player.id == player_id)
            && let Some(sender) = &member.sender
            && let Err(e) = sender.try_send(text)
        {
            tracing::debug!(room = %self.code, player_id, error = %e, "send to player failed");
        }
    }

    /// Fire-and-forget fan-out: a slow or dead peer is skipped, never
    /// awaited, so it cannot stall delivery to the rest of the room.
    fn broadcast(&self, msg: &ServerMessage) {
        self.broadcast_inner(None, msg);
    }

    fn broadcast_except(&self, exclude: PlayerId, msg: &ServerMessage) {
        self.broadcast_inner(Some(exclude), msg);
    }

    fn broadcast_inner(&self, exclude: Option<PlayerId>, msg: &ServerMessage) {
        let Some(text) = self.encode(msg) else { return };
        for member in &self.members {
            if Some(member.player.id) == exclude {
                continue;
            }
            if let Some(sender) = &member.sender
                && let Err(e) = sender.try_send(text.clone())
            {
                tracing::debug!(
                    room = %self.code,
                    player_id = member.player.id,
                    error = %e,
                    "skipping broadcast to slow client"
                );
            }
        }
        for (watcher, sender) in &self.observers {
            if let Err(e) = sender.try_send(text.clone()) {
                tracing::debug!(room = %self.code, watcher, error = %e, "skipping broadcast to slow observer");
            }
        }
    }

    fn encode(&self, msg: &ServerMessage) -> Option<Utf8Bytes> {
        match encode_server_message(msg) {
            Ok(text) => Some(Utf8Bytes::from(text)),
            Err(e) => {
                tracing::error!(room = %self.code, error = %e, "failed to encode server message");
                None
            },
        }
    }
}

use mazerun_core::net::messages::ServerMessage;
use mazerun_core::player::Player;
use mazerun_core::room::RoomState;

use crate::view::{ClientView, PlayerEntry, ViewEvent};

/// How far (in grid units) the authoritative copy of the local player may
/// drift from the prediction before the view demands recovery.
pub(crate) const RESYNC_EPSILON: f32 = 1.0;

/// Result of folding one authoritative message into the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The view changed.
    Applied,
    /// Idempotent re-delivery, a stale delta, or a delta for the local
    /// player; nothing changed.
    Ignored,
    /// Server and prediction disagree about the local player beyond
    /// tolerance. The view snapped to the authoritative value; the owner
    /// should re-run the snapshot recovery path.
    NeedsResync,
}

pub(crate) struct MergeOutcome {
    pub changed: bool,
    pub resync: bool,
}

impl ClientView {
    /// Fold one authoritative message into the view.
    ///
    /// Three merge classes, applied uniformly to every event type:
    /// roster snapshots merge field-by-field into existing entries (entry
    /// identity survives, so local bookkeeping does too); per-player deltas
    /// apply only to non-local players so prediction is never fought; and
    /// single-field events apply unconditionally. Every arm is idempotent —
    /// delivery across reconnects is not exactly-once.
    pub fn apply(&mut self, msg: &ServerMessage) -> ApplyOutcome {
        match msg {
            ServerMessage::RoomCreated(m) => {
                self.room_code = Some(m.room_code.clone());
                self.self_id = Some(m.self_id);
                self.session_token = Some(m.session_token.clone());
                let merge = self.merge_roster(&m.players);
                self.host = self.players.first().map(|e| e.player.id);
                self.roster_outcome(merge)
            },
            ServerMessage::PlayerJoined(m) => {
                if let Some(id) = m.self_id {
                    self.self_id = Some(id);
                }
                if let Some(token) = &m.session_token {
                    self.session_token = Some(token.clone());
                }
                let merge = self.merge_roster(&m.players);
                if self.host.is_none() {
                    self.host = self.players.first().map(|e| e.player.id);
                }
                self.roster_outcome(merge)
            },
            ServerMessage::PlayerLeft(m) => {
                let merge = self.merge_roster(&m.players);
                let host_changed = self.host != Some(m.host);
                self.host = Some(m.host);
                self.roster_outcome(MergeOutcome {
                    changed: merge.changed || host_changed,
                    resync: merge.resync,
                })
            },
            ServerMessage::Ready(m) => {
                let Some(entry) = self.players.iter_mut().find(|e| e.player.id == m.player_id)
                else {
                    return ApplyOutcome::Ignored;
                };
                if entry.player.ready == m.ready {
                    return ApplyOutcome::Ignored;
                }
                entry.player.ready = m.ready;
                self.push_event(ViewEvent::ReadyChanged {
                    player_id: m.player_id,
                    ready: m.ready,
                });
                ApplyOutcome::Applied
            },
            ServerMessage::GameStart(m) => {
                if self.state != RoomState::Lobby {
                    // re-delivery, or the transition was already derived
                    // from a recovery snapshot
                    return ApplyOutcome::Ignored;
                }
                self.maze = Some(m.maze.clone());
                self.treasures = m.treasures.clone();
                // state is still Lobby here, so spawn positions land on the
                // local player too; prediction starts from the spawn
                let _ = self.merge_roster(&m.players);
                self.state = RoomState::Active;
                self.push_event(ViewEvent::GameStarted);
                ApplyOutcome::Applied
            },
            ServerMessage::PlayerUpdate(m) => {
                if self.is_local(m.player_id) {
                    // the server never echoes the sender; anything that
                    // still arrives here must not fight prediction
                    return ApplyOutcome::Ignored;
                }
                let Some(entry) = self.players.iter_mut().find(|e| e.player.id == m.player_id)
                else {
                    return ApplyOutcome::Ignored;
                };
                if m.seq <= entry.last_update_seq {
                    tracing::debug!(player_id = m.player_id, seq = m.seq, "stale delta dropped");
                    return ApplyOutcome::Ignored;
                }
                entry.player.x = m.x;
                entry.player.z = m.z;
                entry.player.heading = m.heading;
                entry.last_update_seq = m.seq;
                self.push_event(ViewEvent::PlayerMoved {
                    player_id: m.player_id,
                });
                ApplyOutcome::Applied
            },
            ServerMessage::TreasureCollected(m) => {
                let Some(treasure) = self.treasures.iter_mut().find(|t| t.id == m.treasure_id)
                else {
                    return ApplyOutcome::Ignored;
                };
                let mut changed = false;
                if !treasure.collected {
                    treasure.collected = true;
                    changed = true;
                }
                // corrects a lost optimistic claim to the real winner
                if treasure.collected_by != Some(m.player_id) {
                    treasure.collected_by = Some(m.player_id);
                    changed = true;
                }
                // counts are assigned from the authoritative value, never
                // incremented, so re-delivery cannot double-count
                if let Some(entry) = self.players.iter_mut().find(|e| e.player.id == m.player_id)
                    && entry.player.treasure_count != m.treasure_count
                {
                    entry.player.treasure_count = m.treasure_count;
                    changed = true;
                }
                if !changed {
                    return ApplyOutcome::Ignored;
                }
                self.push_event(ViewEvent::TreasureCollected {
                    treasure_id: m.treasure_id.clone(),
                    player_id: m.player_id,
                    treasure_count: m.treasure_count,
                });
                ApplyOutcome::Applied
            },
            ServerMessage::GameWon(m) => {
                if self.state == RoomState::Finished {
                    return ApplyOutcome::Ignored;
                }
                self.state = RoomState::Finished;
                self.winner = Some(m.winner);
                for count in &m.counts {
                    if let Some(entry) =
                        self.players.iter_mut().find(|e| e.player.id == count.player_id)
                    {
                        entry.player.treasure_count = count.treasure_count;
                    }
                }
                self.push_event(ViewEvent::GameWon { winner: m.winner });
                ApplyOutcome::Applied
            },
            ServerMessage::Error(m) => {
                self.last_error = Some(m.clone());
                self.push_event(ViewEvent::ErrorReceived {
                    code: m.code,
                    message: m.message.clone(),
                });
                ApplyOutcome::Applied
            },
        }
    }

    fn roster_outcome(&mut self, merge: MergeOutcome) -> ApplyOutcome {
        if merge.resync {
            self.push_event(ViewEvent::ResyncNeeded);
            return ApplyOutcome::NeedsResync;
        }
        if merge.changed {
            self.push_event(ViewEvent::RosterChanged);
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Ignored
        }
    }

    /// Merge an authoritative roster field-by-field.
    ///
    /// Entries are updated in place, never recreated, so per-entry local
    /// bookkeeping survives. The local player's predicted position is left
    /// alone mid-game unless the authoritative copy disagrees by more than
    /// [`RESYNC_EPSILON`], in which case the view snaps to the server and
    /// reports the divergence.
    pub(crate) fn merge_roster(&mut self, incoming: &[Player]) -> MergeOutcome {
        let before: Vec<Player> = self.players.iter().map(|e| e.player.clone()).collect();
        self.players
            .retain(|e| incoming.iter().any(|p| p.id == e.player.id));

        let mut resync = false;
        for p in incoming {
            if let Some(entry) = self.players.iter_mut().find(|e| e.player.id == p.id) {
                let predicted = self.self_id == Some(p.id) && self.state == RoomState::Active;
                if predicted {
                    let drift = (entry.player.x - p.x)
                        .abs()
                        .max((entry.player.z - p.z).abs());
                    if drift > RESYNC_EPSILON {
                        tracing::warn!(drift, "local prediction diverged from server");
                        entry.player.x = p.x;
                        entry.player.z = p.z;
                        entry.player.heading = p.heading;
                        resync = true;
                    }
                    entry.player.display_name = p.display_name.clone();
                    entry.player.ready = p.ready;
                    entry.player.treasure_count = p.treasure_count;
                    entry.player.connected = p.connected;
                } else {
                    entry.player = p.clone();
                }
            } else {
                self.players.push(PlayerEntry::new(p.clone()));
            }
        }

        let after: Vec<&Player> = self.players.iter().map(|e| &e.player).collect();
        let changed =
            before.len() != after.len() || before.iter().zip(&after).any(|(a, b)| a != *b);
        MergeOutcome { changed, resync }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{joined_view, started_view};
    use mazerun_core::net::messages::{
        ErrorMsg, GameWonMsg, PlayerCountEntry, PlayerJoinedMsg, PlayerLeftMsg, PlayerUpdateMsg,
        ReadyUpdateMsg, ServerMessage, TreasureCollectedMsg,
    };
    use mazerun_core::room::RoomError;
    use mazerun_core::test_helpers::make_players;

    #[test]
    fn roster_reapplication_is_idempotent() {
        let mut view = joined_view();
        let msg = ServerMessage::PlayerJoined(PlayerJoinedMsg {
            player_id: 2,
            players: make_players(2),
            self_id: None,
            session_token: None,
        });
        assert_eq!(view.apply(&msg), ApplyOutcome::Ignored);
        let players: Vec<_> = view.players().into_iter().cloned().collect();
        assert_eq!(view.apply(&msg), ApplyOutcome::Ignored);
        let players_again: Vec<_> = view.players().into_iter().cloned().collect();
        assert_eq!(players, players_again);
    }

    #[test]
    fn merge_updates_entries_in_place() {
        let mut view = started_view();
        // remote delta raises the entry's sequence gate
        assert_eq!(
            view.apply(&ServerMessage::PlayerUpdate(PlayerUpdateMsg {
                player_id: 2,
                x: 3.5,
                z: 3.5,
                heading: 0.0,
                seq: 7,
            })),
            ApplyOutcome::Applied
        );
        // a roster broadcast must not reset that gate
        let mut players: Vec<_> = view.players().into_iter().cloned().collect();
        players[1].ready = true;
        let _ = view.apply(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id: 99,
            players,
            host: 1,
        }));
        assert_eq!(
            view.apply(&ServerMessage::PlayerUpdate(PlayerUpdateMsg {
                player_id: 2,
                x: 9.0,
                z: 9.0,
                heading: 0.0,
                seq: 6,
            })),
            ApplyOutcome::Ignored,
            "stale delta must stay dropped after a roster merge"
        );
    }

    #[test]
    fn deltas_never_touch_the_local_player() {
        let mut view = started_view();
        let before = view.local_player().unwrap().clone();
        let outcome = view.apply(&ServerMessage::PlayerUpdate(PlayerUpdateMsg {
            player_id: 1,
            x: before.x + 3.0,
            z: before.z + 3.0,
            heading: 180.0,
            seq: 50,
        }));
        assert_eq!(outcome, ApplyOutcome::Ignored);
        let after = view.local_player().unwrap();
        assert_eq!((after.x, after.z), (before.x, before.z));
    }

    #[test]
    fn stale_deltas_are_dropped() {
        let mut view = started_view();
        let fresh = PlayerUpdateMsg {
            player_id: 2,
            x: 4.5,
            z: 4.5,
            heading: 0.0,
            seq: 10,
        };
        assert_eq!(
            view.apply(&ServerMessage::PlayerUpdate(fresh.clone())),
            ApplyOutcome::Applied
        );
        let reordered = PlayerUpdateMsg {
            x: 2.0,
            z: 2.0,
            seq: 9,
            ..fresh
        };
        assert_eq!(
            view.apply(&ServerMessage::PlayerUpdate(reordered)),
            ApplyOutcome::Ignored
        );
        assert_eq!(view.player(2).unwrap().x, 4.5);
    }

    #[test]
    fn losing_a_collect_race_corrects_without_double_count() {
        let mut view = started_view();
        let target = view.treasures()[0].id.clone();

        // we optimistically claim it...
        let _ = view.try_collect(&target).unwrap();
        // ...but player 2 won the arbitration
        let broadcast = ServerMessage::TreasureCollected(TreasureCollectedMsg {
            treasure_id: target.clone(),
            player_id: 2,
            treasure_count: 1,
        });
        assert_eq!(view.apply(&broadcast), ApplyOutcome::Applied);

        let t = view.treasures().iter().find(|t| t.id == target).unwrap();
        assert!(t.collected);
        assert_eq!(t.collected_by, Some(2));
        assert_eq!(view.local_player().unwrap().treasure_count, 0);
        assert_eq!(view.player(2).unwrap().treasure_count, 1);

        // re-delivery is a no-op: the count is assigned, not incremented
        assert_eq!(view.apply(&broadcast), ApplyOutcome::Ignored);
        assert_eq!(view.player(2).unwrap().treasure_count, 1);
    }

    #[test]
    fn ready_events_apply_unconditionally_and_idempotently() {
        let mut view = joined_view();
        let msg = ServerMessage::Ready(ReadyUpdateMsg {
            player_id: 2,
            ready: true,
        });
        assert_eq!(view.apply(&msg), ApplyOutcome::Applied);
        assert!(view.player(2).unwrap().ready);
        assert_eq!(view.apply(&msg), ApplyOutcome::Ignored);
    }

    #[test]
    fn game_start_is_one_shot() {
        let mut view = started_view();
        assert_eq!(view.state(), RoomState::Active);
        assert!(view.maze().is_some());
        let maze = view.maze().unwrap().clone();

        // a re-delivered start changes nothing
        let replay = ServerMessage::GameStart(Box::new(
            mazerun_core::net::messages::GameStartMsg {
                maze: maze.clone(),
                treasures: view.treasures().to_vec(),
                players: view.players().into_iter().cloned().collect(),
            },
        ));
        assert_eq!(view.apply(&replay), ApplyOutcome::Ignored);
        assert_eq!(view.maze(), Some(&maze));
    }

    #[test]
    fn game_won_fires_once_and_assigns_counts() {
        let mut view = started_view();
        let msg = ServerMessage::GameWon(GameWonMsg {
            winner: 2,
            counts: vec![
                PlayerCountEntry {
                    player_id: 1,
                    treasure_count: 1,
                },
                PlayerCountEntry {
                    player_id: 2,
                    treasure_count: 3,
                },
            ],
        });
        assert_eq!(view.apply(&msg), ApplyOutcome::Applied);
        assert_eq!(view.state(), RoomState::Finished);
        assert_eq!(view.winner(), Some(2));
        assert_eq!(view.player(2).unwrap().treasure_count, 3);
        assert_eq!(view.apply(&msg), ApplyOutcome::Ignored);
    }

    #[test]
    fn divergent_local_position_demands_resync() {
        let mut view = started_view();
        let mut players: Vec<_> = view.players().into_iter().cloned().collect();
        // the server disagrees about where we are
        players[0].x += 5.0;
        let outcome = view.apply(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id: 99,
            players: players.clone(),
            host: 1,
        }));
        assert_eq!(outcome, ApplyOutcome::NeedsResync);
        // the view snapped to the authoritative position
        assert_eq!(view.local_player().unwrap().x, players[0].x);
        assert!(
            view.drain_events()
                .contains(&crate::view::ViewEvent::ResyncNeeded)
        );
    }

    #[test]
    fn small_drift_keeps_the_prediction() {
        let mut view = started_view();
        let local = view.local_player().unwrap().clone();
        let mut players: Vec<_> = view.players().into_iter().cloned().collect();
        players[0].x += 0.4;
        let outcome = view.apply(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id: 99,
            players,
            host: 1,
        }));
        assert_ne!(outcome, ApplyOutcome::NeedsResync);
        assert_eq!(view.local_player().unwrap().x, local.x);
    }

    #[test]
    fn errors_are_requester_visible_state() {
        let mut view = joined_view();
        let outcome = view.apply(&ServerMessage::Error(ErrorMsg::from_error(
            RoomError::RoomFull,
        )));
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(view.last_error().unwrap().code, RoomError::RoomFull);
    }

    #[test]
    fn disconnect_roster_update_marks_connected_false() {
        let mut view = started_view();
        let mut players: Vec<_> = view.players().into_iter().cloned().collect();
        players[1].connected = false;
        let outcome = view.apply(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id: 2,
            players,
            host: 1,
        }));
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(view.players().len(), 2, "mid-game slot survives");
        assert!(!view.player(2).unwrap().connected);
    }
}

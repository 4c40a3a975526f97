use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};

use mazerun_core::room::{generate_room_code, normalize_room_code};
use mazerun_core::snapshot::{RoomListEntry, RoomSnapshot};

use crate::config::ServerConfig;
use crate::room_task::{ClientSender, JoinGrant, RoomCommand, RoomHandle, spawn_room};

/// The Session Directory: an in-memory table of live rooms keyed by code.
///
/// The lock guards only the key space (create, lookup, teardown). Every room
/// mutation goes through that room's own task, so rooms never contend with
/// each other and no lock is ever held across a room operation.
pub struct RoomDirectory {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    config: Arc<ServerConfig>,
}

impl RoomDirectory {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a room with its host under a fresh unique code and spawn its
    /// task.
    ///
    /// Code generation retries against the table under the write lock, so
    /// two concurrent creates can never share a code.
    pub async fn create_room(
        self: Arc<Self>,
        host_name: String,
        host_sender: ClientSender,
    ) -> (RoomHandle, JoinGrant) {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                break code;
            }
        };
        let (handle, grant) = spawn_room(
            code.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self),
            host_name,
            host_sender,
        );
        rooms.insert(code.clone(), handle.clone());
        tracing::info!(room = %code, "room created");
        (handle, grant)
    }

    /// Look up a live room. Codes are case-insensitive.
    pub async fn get(&self, code: &str) -> Option<RoomHandle> {
        let code = normalize_room_code(code);
        self.rooms.read().await.get(&code).cloned()
    }

    /// Drop a room from the table. Called by the room task as it exits.
    pub async fn remove(&self, code: &str) {
        if self.rooms.write().await.remove(code).is_some() {
            tracing::debug!(room = %code, "room removed from directory");
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Fetch a room's point-in-time snapshot for the recovery channel.
    pub async fn snapshot(&self, code: &str) -> Option<RoomSnapshot> {
        let handle = self.get(code).await?;
        let (tx, rx) = oneshot::channel();
        handle
            .tx
            .send(RoomCommand::Snapshot { reply: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Summaries of every live room for the browser listing, sorted by code.
    pub async fn list(&self) -> Vec<RoomListEntry> {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            let (tx, rx) = oneshot::channel();
            // a room torn down between the read and the query is skipped
            if handle
                .tx
                .send(RoomCommand::Summary { reply: tx })
                .await
                .is_ok()
                && let Ok(entry) = rx.await
            {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }
}

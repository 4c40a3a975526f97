use std::time::Duration;

use serde::Deserialize;

/// Top-level server configuration, loaded from `mazerun.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub maze: MazeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            maze: MazeConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Outbound message buffer per connection. Full buffer = slow client;
    /// broadcasts to it are skipped, never awaited.
    pub player_message_buffer: usize,
    /// Pending mutation buffer per room; senders await a slot.
    pub room_command_buffer: usize,
    pub ws_rate_limit_per_sec: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            player_message_buffer: 256,
            room_command_buffer: 64,
            ws_rate_limit_per_sec: 60.0,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub max_players: usize,
    pub min_players_to_start: usize,
    /// Active-game time limit; the leader wins when it expires.
    pub time_limit_secs: u64,
    /// A room with no connected members for this long is torn down.
    pub idle_timeout_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            min_players_to_start: 2,
            time_limit_secs: 300,
            idle_timeout_secs: 300,
        }
    }
}

/// Parameters handed to the maze/treasure generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MazeConfig {
    pub width: u32,
    pub height: u32,
    pub treasure_count: usize,
    /// How close a player must stand to a treasure cell to collect it.
    pub collect_radius: f32,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            width: 21,
            height: 21,
            treasure_count: 12,
            collect_radius: 1.5,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, falling back to defaults (with a warning) when
    /// the file is missing or malformed.
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path, error = %e, "invalid config file, using defaults");
                    Self::default()
                },
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "config file not readable, using defaults");
                Self::default()
            },
        }
    }

    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::warn!(addr = %self.listen_addr, "listen_addr is not a valid socket address");
        }
        if self.rooms.max_players == 0 {
            tracing::warn!("rooms.max_players is 0; nobody can join");
        }
        if self.rooms.min_players_to_start > self.rooms.max_players {
            tracing::warn!(
                min = self.rooms.min_players_to_start,
                max = self.rooms.max_players,
                "min_players_to_start exceeds max_players; games can never start"
            );
        }
        if self.maze.treasure_count == 0 {
            tracing::warn!("maze.treasure_count is 0; games can only end on the time limit");
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.rooms.time_limit_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.rooms.idle_timeout_secs)
    }
}

use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use mazerun_core::room::{is_valid_room_code, normalize_room_code};
use mazerun_core::snapshot::{RoomListEntry, RoomSnapshotResponse};

use crate::error::AppError;
use crate::state::AppState;

/// GET /rooms — room browser listing.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomListEntry>> {
    Json(state.directory.list().await)
}

/// GET /rooms/{code} — the recovery channel.
///
/// A (re)connecting or spectating client seeds its local state from this
/// snapshot before consuming the live stream.
pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshotResponse>, AppError> {
    let code = normalize_room_code(&code);
    if !is_valid_room_code(&code) {
        return Err(AppError::BadRequest(format!("Invalid room code: {code}")));
    }
    match state.directory.snapshot(&code).await {
        Some(room) => Ok(Json(RoomSnapshotResponse { room })),
        None => Err(AppError::NotFound(format!("Room {code} not found"))),
    }
}

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub rooms: RoomInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
}

#[derive(Serialize)]
pub struct RoomInfo {
    pub active: usize,
}

/// GET /healthz — server status, connection count, and room count.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);
    let active = state.directory.room_count().await;
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { websocket: ws },
        rooms: RoomInfo { active },
    })
}

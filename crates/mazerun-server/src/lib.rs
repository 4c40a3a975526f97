pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod movement;
pub mod room_task;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    // The recovery/browser endpoints are fetched cross-origin by browser
    // clients, so they get a permissive CORS layer; the WS endpoint and
    // health check do not need one.
    let room_routes = Router::new()
        .route("/rooms", get(api::list_rooms))
        .route("/rooms/{code}", get(api::get_room))
        .layer(CorsLayer::permissive());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(api::health_check))
        .merge(room_routes)
        .with_state(state.clone());

    (app, state)
}

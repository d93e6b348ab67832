use axum::{
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::handlers::{credentials, health, recording};
use super::state::AppState;
use super::websocket::ws_handler;

const ALLOWED_ORIGINS: [&str; 6] = [
    "http://localhost:1420",
    "http://localhost:5173",
    "http://127.0.0.1:1420",
    "http://127.0.0.1:5173",
    "tauri://localhost",
    "https://tauri.localhost",
];

pub fn create_router(state: Arc<AppState>) -> Router {
    // The sidecar is only reachable from local frontends
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            ALLOWED_ORIGINS.into_iter().map(HeaderValue::from_static),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/recorder/script", get(recording::recorder_script))
        // Recording session
        .route("/recording/start", post(recording::start_recording))
        .route("/recording/stop", post(recording::stop_recording))
        .route("/recording/clear", post(recording::clear_recording))
        .route("/recording/status", get(recording::get_recording_status))
        .route(
            "/recording/actions",
            get(recording::list_actions).post(recording::record_action),
        )
        .route("/recording/events", post(recording::ingest_event))
        .route("/recording/export", get(recording::export_script))
        // Credential store
        .route("/credentials/resolve", post(credentials::resolve_credentials))
        .route(
            "/credentials/:key",
            put(credentials::update_credential).delete(credentials::delete_credential),
        )
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

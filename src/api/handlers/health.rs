use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::models::HealthResponse;

use super::super::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        recording: state.log().is_recording().await,
        credential_store: state.credentials.name().to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

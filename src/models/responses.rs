use serde::Serialize;

use super::session::SessionSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub recording: bool,
    pub credential_store: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub status: String,
    pub browser_launched: bool,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub session_id: Option<String>,
    pub action_count: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordingStatusResponse {
    pub session: SessionSnapshot,
    pub frames: Vec<String>,
    pub connected_clients: usize,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}

impl GenericResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

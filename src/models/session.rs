use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }
}

/// Point-in-time view of the recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub state: RecordingState,
    pub action_count: usize,
    pub gap_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

/// State transitions broadcast to observers (UI panels, WebSocket clients)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SessionEvent {
    RecordingStateChanged(bool),
    ActionRecorded(Action),
    ActionsUpdated(Vec<Action>),
    ActionsCleared,
    #[serde(rename_all = "camelCase")]
    GapDetected {
        frame_id: String,
        expected: u64,
        received: u64,
    },
}

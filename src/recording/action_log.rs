use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::models::{
    consolidate_typing, Action, ExportedScript, RecordingState, SessionEvent, SessionSnapshot,
};

/// Rejected state transitions. The session is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub consolidate_typing: bool,
    pub name: Option<String>,
}

/// Missing sequence numbers observed for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGap {
    pub frame_id: String,
    pub expected: u64,
    pub received: u64,
}

/// Host-side detector for messages lost between page and host.
///
/// Each page document numbers every message it emits from 1, whether or not
/// the host keeps it, so counters are tracked per (frame, document).
#[derive(Debug, Default)]
struct GapDetector {
    last_seq: HashMap<(String, String), u64>,
}

impl GapDetector {
    fn observe(&mut self, frame_id: &str, document_id: &str, seq: u64) -> Option<SequenceGap> {
        let key = (frame_id.to_string(), document_id.to_string());
        let last = match self.last_seq.get(&key).copied() {
            Some(last) if seq <= last => {
                tracing::debug!("Out-of-order seq {} after {} in frame {}", seq, last, frame_id);
                return None;
            }
            Some(last) => last,
            None => {
                self.last_seq.insert(key, seq);
                return None;
            }
        };

        self.last_seq.insert(key, seq);
        (seq > last + 1).then(|| SequenceGap {
            frame_id: frame_id.to_string(),
            expected: last + 1,
            received: seq,
        })
    }

    fn reset(&mut self) {
        self.last_seq.clear();
    }
}

#[derive(Debug)]
struct LogInner {
    session_id: Option<String>,
    state: RecordingState,
    actions: Vec<Action>,
    gaps: Vec<SequenceGap>,
    gap_detector: GapDetector,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

/// Authoritative, append-only action list for the current recording session.
///
/// Cheap to clone; clones share the same session. Every state change is
/// broadcast to subscribers.
#[derive(Clone)]
pub struct ActionLog {
    inner: Arc<Mutex<LogInner>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ActionLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                session_id: None,
                state: RecordingState::Idle,
                actions: Vec::new(),
                gaps: Vec::new(),
                gap_detector: GapDetector::default(),
                started_at: None,
                stopped_at: None,
            })),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Idle -> Recording. Clears the previous session's actions.
    pub async fn start(&self) -> Result<SessionSnapshot, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_recording() {
            tracing::warn!("Ignoring start: already recording");
            return Err(SessionError::AlreadyRecording);
        }

        let session_id = Uuid::new_v4().to_string();
        inner.session_id = Some(session_id.clone());
        inner.state = RecordingState::Recording;
        inner.actions.clear();
        inner.gaps.clear();
        inner.gap_detector.reset();
        inner.started_at = Some(Utc::now());
        inner.stopped_at = None;
        let snapshot = snapshot_of(&inner);
        drop(inner);

        self.broadcast(SessionEvent::ActionsCleared);
        self.broadcast(SessionEvent::RecordingStateChanged(true));
        tracing::info!("Recording session {} started", session_id);
        Ok(snapshot)
    }

    /// Recording -> Idle. The collected actions stay available until the next start.
    pub async fn stop(&self) -> Result<SessionSnapshot, SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_recording() {
            tracing::warn!("Ignoring stop: not recording");
            return Err(SessionError::NotRecording);
        }

        inner.state = RecordingState::Idle;
        inner.stopped_at = Some(Utc::now());
        let snapshot = snapshot_of(&inner);
        drop(inner);

        self.broadcast(SessionEvent::RecordingStateChanged(false));
        tracing::info!(
            "Recording session {} stopped with {} actions",
            snapshot.session_id.as_deref().unwrap_or("-"),
            snapshot.action_count
        );
        Ok(snapshot)
    }

    /// Append an action. Rejected while Idle.
    pub async fn record_action(&self, action: Action) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_recording() {
            tracing::debug!("Dropping {} action: not recording", action.type_name());
            return Err(SessionError::NotRecording);
        }

        inner.actions.push(action.clone());
        let count = inner.actions.len();
        let all = inner.actions.clone();
        drop(inner);

        tracing::debug!("Recorded {} action #{}", action.type_name(), count);
        self.broadcast(SessionEvent::ActionRecorded(action));
        self.broadcast(SessionEvent::ActionsUpdated(all));
        Ok(count)
    }

    /// Feed one page message's sequence number to the gap detector.
    ///
    /// Called for every message, including ones that never become actions.
    pub async fn observe_seq(&self, frame_id: &str, document_id: &str, seq: u64) -> Option<SequenceGap> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_recording() {
            return None;
        }
        let gap = inner.gap_detector.observe(frame_id, document_id, seq)?;
        inner.gaps.push(gap.clone());
        drop(inner);

        tracing::warn!(
            "Lost messages in frame {}: expected seq {}, received {}",
            gap.frame_id,
            gap.expected,
            gap.received
        );
        self.broadcast(SessionEvent::GapDetected {
            frame_id: gap.frame_id.clone(),
            expected: gap.expected,
            received: gap.received,
        });
        Some(gap)
    }

    /// Empty the log in any state
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.actions.clear();
        inner.gaps.clear();
        inner.gap_detector.reset();
        drop(inner);

        self.broadcast(SessionEvent::ActionsCleared);
        self.broadcast(SessionEvent::ActionsUpdated(Vec::new()));
        tracing::info!("Action log cleared");
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.state.is_recording()
    }

    pub async fn actions(&self) -> Vec<Action> {
        self.inner.lock().await.actions.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.actions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn gaps(&self) -> Vec<SequenceGap> {
        self.inner.lock().await.gaps.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        snapshot_of(&*self.inner.lock().await)
    }

    /// Build the replay document. Works on a copy; the log is untouched.
    pub async fn export(&self, options: &ExportOptions) -> ExportedScript {
        let actions = self.actions().await;
        let actions = if options.consolidate_typing {
            consolidate_typing(&actions)
        } else {
            actions
        };

        let mut script = ExportedScript::new(actions);
        script.name = options.name.clone();
        script
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(inner: &LogInner) -> SessionSnapshot {
    SessionSnapshot {
        session_id: inner.session_id.clone(),
        state: inner.state,
        action_count: inner.actions.len(),
        gap_count: inner.gaps.len(),
        started_at: inner.started_at,
        stopped_at: inner.stopped_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, Locator, MAIN_FRAME_ID};
    use tokio_test::{assert_err, assert_ok};

    fn click(id: &str) -> Action {
        Action::new(
            ActionKind::Click {
                locators: vec![Locator::id(id)],
                tag_name: "button".to_string(),
                text: String::new(),
                absolute_x: None,
                absolute_y: None,
                x: None,
                y: None,
            },
            "https://a.example/",
            MAIN_FRAME_ID,
            1,
        )
    }

    #[tokio::test]
    async fn test_state_machine() {
        let log = ActionLog::new();
        assert_eq!(log.stop().await.unwrap_err(), SessionError::NotRecording);
        assert_eq!(log.record_action(click("a")).await, Err(SessionError::NotRecording));
        assert!(log.is_empty().await);

        assert_ok!(log.start().await);
        assert_eq!(log.start().await.unwrap_err(), SessionError::AlreadyRecording);
        assert_eq!(log.record_action(click("a")).await, Ok(1));

        // failed start must not clear
        assert_err!(log.start().await);
        assert_eq!(log.len().await, 1);

        assert_ok!(log.stop().await);
        assert_eq!(log.len().await, 1, "stop keeps the log for export");
        assert_eq!(log.stop().await.unwrap_err(), SessionError::NotRecording);
        assert_eq!(log.len().await, 1);

        assert_ok!(log.start().await);
        assert_eq!(log.len().await, 0, "start clears the previous session");
    }

    #[tokio::test]
    async fn test_clear_in_any_state() {
        let log = ActionLog::new();
        log.start().await.unwrap();
        log.record_action(click("a")).await.unwrap();
        log.clear().await;
        assert!(log.is_empty().await);
        assert!(log.is_recording().await);

        log.record_action(click("b")).await.unwrap();
        log.stop().await.unwrap();
        log.clear().await;
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_observers_see_transitions() {
        let log = ActionLog::new();
        let mut rx = log.subscribe();

        log.start().await.unwrap();
        log.record_action(click("submit")).await.unwrap();
        log.stop().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                SessionEvent::RecordingStateChanged(on) => format!("state:{}", on),
                SessionEvent::ActionRecorded(a) => format!("recorded:{}", a.locators()[0].value),
                SessionEvent::ActionsUpdated(all) => format!("updated:{}", all.len()),
                SessionEvent::ActionsCleared => "cleared".to_string(),
                SessionEvent::GapDetected { .. } => "gap".to_string(),
            });
        }
        assert_eq!(
            kinds,
            vec!["cleared", "state:true", "recorded:submit", "updated:1", "state:false"]
        );
    }

    #[tokio::test]
    async fn test_gap_detection() {
        let log = ActionLog::new();
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-1", 5).await, None, "ignored while idle");

        log.start().await.unwrap();
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-1", 1).await, None);
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-1", 2).await, None);
        let gap = log.observe_seq(MAIN_FRAME_ID, "doc-1", 5).await;
        assert_eq!(
            gap,
            Some(SequenceGap {
                frame_id: MAIN_FRAME_ID.to_string(),
                expected: 3,
                received: 5
            })
        );

        // navigation: the new document numbers from 1 again
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-2", 1).await, None);
        // duplicate delivery from the old document is not a gap
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-1", 4).await, None);
        // child frames count on their own
        assert_eq!(log.observe_seq("frame[id=ads]", "doc-3", 1).await, None);
        assert_eq!(log.observe_seq(MAIN_FRAME_ID, "doc-2", 2).await, None);

        assert_eq!(log.gaps().await.len(), 1);
        assert_eq!(log.snapshot().await.gap_count, 1);
    }

    #[tokio::test]
    async fn test_appending_does_not_feed_gap_detector() {
        let log = ActionLog::new();
        log.start().await.unwrap();
        log.record_action(click("a").with_seq(1)).await.unwrap();
        log.record_action(click("b").with_seq(4)).await.unwrap();
        assert!(log.gaps().await.is_empty());
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_export_does_not_mutate() {
        let log = ActionLog::new();
        log.start().await.unwrap();
        log.record_action(click("a")).await.unwrap();
        let script = log
            .export(&ExportOptions {
                consolidate_typing: true,
                name: Some("Login".to_string()),
            })
            .await;
        assert_eq!(script.version, "1.0");
        assert_eq!(script.name.as_deref(), Some("Login"));
        assert_eq!(script.actions.len(), 1);
        assert_eq!(log.len().await, 1);
    }
}

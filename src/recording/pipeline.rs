use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::action_log::{ActionLog, SessionError};
use super::detector::detect_credential_field;
use super::frame::{frame_id, FrameRegistry};
use super::locator::{generate_locators, LocatorOptions};
use super::throttle::ScrollDebouncer;
use crate::credentials::{CredentialEntry, CredentialStore};
use crate::models::{
    Action, ActionKind, CapturedEnvelope, CapturedEvent, CredentialInput, ElementSnapshot, Rect,
    ScrollOffset, ViewportSize,
};

/// Keys recorded even without modifiers
const SPECIAL_KEYS: [&str; 13] = [
    "Enter", "Tab", "Escape", "Backspace", "Delete", "ArrowUp", "ArrowDown", "ArrowLeft",
    "ArrowRight", "Home", "End", "PageUp", "PageDown",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub locators: LocatorOptions,
    /// Max chars of element text kept on click actions
    pub click_text_max_chars: usize,
    pub scroll_debounce: Duration,
    /// Record plain printable keystrokes as keypress actions too
    pub record_all_keys: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            locators: LocatorOptions::default(),
            click_text_max_chars: 100,
            scroll_debounce: super::throttle::DEFAULT_SCROLL_DEBOUNCE,
            record_all_keys: false,
        }
    }
}

/// What happened to one envelope
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    Recorded(Action),
    /// Held back by the scroll debounce; emitted later
    Deferred,
    Skipped(&'static str),
    Rejected(SessionError),
}

/// Turns page envelopes into actions and appends them to the log.
///
/// Owns everything the event-capture layer needs; nothing here is global.
pub struct RecordingPipeline {
    log: ActionLog,
    credentials: Arc<dyn CredentialStore>,
    frames: FrameRegistry,
    scrolls: Mutex<ScrollDebouncer>,
    config: PipelineConfig,
}

impl RecordingPipeline {
    pub fn new(log: ActionLog, credentials: Arc<dyn CredentialStore>, config: PipelineConfig) -> Self {
        Self {
            log,
            credentials,
            frames: FrameRegistry::new(),
            scrolls: Mutex::new(ScrollDebouncer::new(config.scroll_debounce)),
            config,
        }
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn frames(&self) -> &FrameRegistry {
        &self.frames
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Parse and handle a raw JSON payload from the page binding
    pub async fn handle_payload(self: &Arc<Self>, payload: &str) -> HandleOutcome {
        match serde_json::from_str::<CapturedEnvelope>(payload) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => {
                tracing::warn!("Dropping unparsable recorder payload: {}", e);
                HandleOutcome::Skipped("unparsable payload")
            }
        }
    }

    pub async fn handle(self: &Arc<Self>, envelope: CapturedEnvelope) -> HandleOutcome {
        if !self.log.is_recording().await {
            tracing::debug!("Dropping {} event: not recording", envelope.event.kind());
            return HandleOutcome::Rejected(SessionError::NotRecording);
        }

        let frame = frame_id(&envelope.frame, &envelope.url);
        if self.frames.attach(&frame, &envelope.document_id) {
            tracing::info!("Recorder active in frame {} ({})", frame, envelope.url);
        }
        // Every message counts, including the ones skipped or collapsed below
        if let Some(seq) = envelope.seq {
            self.log.observe_seq(&frame, &envelope.document_id, seq).await;
        }

        let timestamp = envelope
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let url = envelope.url.clone();
        let mut credential = None;

        let kind = match envelope.event {
            CapturedEvent::Click {
                target,
                rect,
                viewport,
                scroll,
            } => self.click(&target, rect, viewport, scroll),

            CapturedEvent::Input { target, value, event_name } => {
                tracing::trace!("{} event on <{}>", event_name, target.tag);
                let (kind, entry) = self.input(&target, value, &url);
                credential = entry;
                kind
            }

            CapturedEvent::Keydown {
                key,
                code,
                ctrl_key,
                alt_key,
                shift_key,
                meta_key,
                focused,
                focus_error,
            } => {
                if focus_error {
                    return HandleOutcome::Skipped("focused element could not be checked");
                }
                if focused
                    .as_ref()
                    .is_some_and(|el| detect_credential_field(el, &url).is_credential)
                {
                    return HandleOutcome::Skipped("keystroke inside credential field");
                }
                if !self.should_record_key(&key, ctrl_key, meta_key) {
                    return HandleOutcome::Skipped("printable keystroke");
                }
                ActionKind::Keypress {
                    key,
                    code,
                    ctrl_key,
                    alt_key,
                    shift_key,
                    meta_key,
                }
            }

            CapturedEvent::Scroll { x, y } => {
                let mut action = Action::new(ActionKind::Scroll { x, y }, url, frame, timestamp);
                action.seq = envelope.seq;
                self.defer_scroll(action).await;
                return HandleOutcome::Deferred;
            }

            CapturedEvent::Navigate { from_url, title, phase } => {
                tracing::debug!("Navigation {:?} in frame {}: {}", phase, frame, url);
                ActionKind::Navigate { from_url, title }
            }
        };

        // A scroll still inside its debounce window happened first
        let pending_scroll = self.scrolls.lock().await.take_frame(&frame);
        if let Some(scroll) = pending_scroll {
            self.append(scroll).await;
        }

        let mut action = Action::new(kind, url, frame, timestamp);
        action.seq = envelope.seq;
        let outcome = self.append(action).await;

        // Only secrets referenced by a logged action are kept
        if let (HandleOutcome::Recorded(_), Some(entry)) = (&outcome, credential) {
            self.store_credential(entry).await;
        }
        outcome
    }

    fn click(
        &self,
        target: &ElementSnapshot,
        rect: Option<Rect>,
        viewport: Option<ViewportSize>,
        scroll: Option<ScrollOffset>,
    ) -> ActionKind {
        let locators = generate_locators(target, &self.config.locators);
        let text: String = target
            .trimmed_text()
            .chars()
            .take(self.config.click_text_max_chars)
            .collect();

        let center = rect.map(|r| r.center());
        let scroll = scroll.unwrap_or_default();
        let fraction = |pos: f64, extent: f64| (extent > 0.0).then(|| pos / extent);

        ActionKind::Click {
            locators,
            tag_name: target.tag.clone(),
            text,
            absolute_x: center.map(|(cx, _)| cx + scroll.x),
            absolute_y: center.map(|(_, cy)| cy + scroll.y),
            x: center.zip(viewport).and_then(|((cx, _), v)| fraction(cx, v.width)),
            y: center.zip(viewport).and_then(|((_, cy), v)| fraction(cy, v.height)),
        }
    }

    fn input(
        &self,
        target: &ElementSnapshot,
        value: String,
        url: &str,
    ) -> (ActionKind, Option<CredentialEntry>) {
        let locators = generate_locators(target, &self.config.locators);
        let detection = detect_credential_field(target, url);

        let (Some(credential_type), Some(key)) = (detection.credential_type, detection.key) else {
            let kind = ActionKind::Type {
                locators,
                value,
                tag_name: target.tag.clone(),
            };
            return (kind, None);
        };

        let entry = CredentialEntry::new(&key, &value, credential_type, url);
        let kind = ActionKind::credential(
            credential_type,
            CredentialInput {
                locators,
                credential_key: key,
                tag_name: target.tag.clone(),
            },
        );
        (kind, Some(entry))
    }

    async fn store_credential(&self, entry: CredentialEntry) {
        let (key, credential_type) = (entry.key.clone(), entry.credential_type);
        if let Err(e) = self.credentials.store_credential(entry).await {
            // The value is still withheld from the log
            tracing::error!(
                "Failed to store {} credential {} in {} store: {}",
                credential_type,
                key,
                self.credentials.name(),
                e
            );
        }
    }

    fn should_record_key(&self, key: &str, ctrl_key: bool, meta_key: bool) -> bool {
        if self.config.record_all_keys || ctrl_key || meta_key {
            return true;
        }
        SPECIAL_KEYS.contains(&key) || is_function_key(key)
    }

    async fn append(&self, action: Action) -> HandleOutcome {
        match self.log.record_action(action.clone()).await {
            Ok(_) => HandleOutcome::Recorded(action),
            Err(e) => HandleOutcome::Rejected(e),
        }
    }

    async fn defer_scroll(self: &Arc<Self>, action: Action) {
        let deadline = self.scrolls.lock().await.push(action, Instant::now());

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            pipeline.flush_due_scrolls().await;
        });
    }

    /// Emit scrolls whose debounce window has passed
    pub async fn flush_due_scrolls(&self) -> usize {
        let due = self.scrolls.lock().await.take_due(Instant::now());
        self.append_all(due).await
    }

    /// Emit every pending scroll now, e.g. right before recording stops
    pub async fn flush_scrolls(&self) -> usize {
        let pending = self.scrolls.lock().await.flush();
        self.append_all(pending).await
    }

    async fn append_all(&self, actions: Vec<Action>) -> usize {
        let mut recorded = 0;
        for action in actions {
            if let HandleOutcome::Recorded(_) = self.append(action).await {
                recorded += 1;
            }
        }
        recorded
    }

    /// Forget per-session capture state (frames, pending scrolls)
    pub async fn reset(&self) {
        self.frames.clear();
        self.scrolls.lock().await.clear();
    }
}

fn is_function_key(key: &str) -> bool {
    key.strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=12).contains(&n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::models::{FrameDescriptor, Locator};

    async fn recording_pipeline() -> (Arc<RecordingPipeline>, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let pipeline = Arc::new(RecordingPipeline::new(
            ActionLog::new(),
            store.clone(),
            PipelineConfig::default(),
        ));
        pipeline.log().start().await.unwrap();
        (pipeline, store)
    }

    fn keydown(key: &str, focused: Option<ElementSnapshot>) -> CapturedEvent {
        CapturedEvent::Keydown {
            key: key.to_string(),
            code: key.to_string(),
            ctrl_key: false,
            alt_key: false,
            shift_key: false,
            meta_key: false,
            focused,
            focus_error: false,
        }
    }

    #[tokio::test]
    async fn test_click_coordinates() {
        let (pipeline, _) = recording_pipeline().await;
        let envelope = CapturedEnvelope::new(
            "https://a.example/",
            CapturedEvent::Click {
                target: ElementSnapshot::new("button").with_id("go").with_text(&"w".repeat(150)),
                rect: Some(Rect { x: 100.0, y: 50.0, width: 40.0, height: 20.0 }),
                viewport: Some(ViewportSize { width: 1000.0, height: 500.0 }),
                scroll: Some(ScrollOffset { x: 0.0, y: 300.0 }),
            },
        );

        let HandleOutcome::Recorded(action) = pipeline.handle(envelope).await else {
            panic!("click should be recorded");
        };
        match action.kind {
            ActionKind::Click { absolute_x, absolute_y, x, y, text, locators, .. } => {
                assert_eq!(absolute_x, Some(120.0));
                assert_eq!(absolute_y, Some(360.0));
                assert_eq!(x, Some(0.12));
                assert_eq!(y, Some(0.12));
                assert_eq!(text.chars().count(), 100);
                assert_eq!(locators[0], Locator::id("go"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keydown_filtering() {
        let (pipeline, _) = recording_pipeline().await;
        let url = "https://a.example/login";
        let password = ElementSnapshot::new("input").with_type("password");
        let search = ElementSnapshot::new("input").with_name("q");

        let outcome = pipeline
            .handle(CapturedEnvelope::new(url, keydown("Enter", Some(password))))
            .await;
        assert_eq!(outcome, HandleOutcome::Skipped("keystroke inside credential field"));

        let outcome = pipeline.handle(CapturedEnvelope::new(url, keydown("a", Some(search.clone())))).await;
        assert_eq!(outcome, HandleOutcome::Skipped("printable keystroke"));

        let mut failed = keydown("Enter", None);
        if let CapturedEvent::Keydown { focus_error, .. } = &mut failed {
            *focus_error = true;
        }
        let outcome = pipeline.handle(CapturedEnvelope::new(url, failed)).await;
        assert_eq!(outcome, HandleOutcome::Skipped("focused element could not be checked"));

        let outcome = pipeline.handle(CapturedEnvelope::new(url, keydown("F5", Some(search)))).await;
        assert!(matches!(outcome, HandleOutcome::Recorded(_)));
        assert_eq!(pipeline.log().len().await, 1);
    }

    #[tokio::test]
    async fn test_idle_drops_before_credential_store() {
        let store = Arc::new(MemoryCredentialStore::new());
        let pipeline = Arc::new(RecordingPipeline::new(ActionLog::new(), store.clone(), PipelineConfig::default()));

        let envelope = CapturedEnvelope::new(
            "https://a.example/",
            CapturedEvent::Input {
                event_name: "change".to_string(),
                target: ElementSnapshot::new("input").with_type("password"),
                value: "hunter2".to_string(),
            },
        );
        assert_eq!(pipeline.handle(envelope).await, HandleOutcome::Rejected(SessionError::NotRecording));
        assert!(store.is_empty());
    }

    /// Remembers, for each secret it receives, whether the log already held
    /// an action referencing it
    struct LogCheckingStore {
        log: ActionLog,
        seen: std::sync::Mutex<Vec<(String, bool)>>,
    }

    #[async_trait::async_trait]
    impl CredentialStore for LogCheckingStore {
        fn name(&self) -> &'static str {
            "log-checking"
        }

        async fn store_credential(&self, entry: CredentialEntry) -> anyhow::Result<()> {
            let referenced = self.log.actions().await.iter().any(|a| match &a.kind {
                ActionKind::EnterCredentialPassword(input) => input.credential_key == entry.key,
                _ => false,
            });
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((entry.key, referenced));
            }
            Ok(())
        }

        async fn get_credential(&self, _key: &str) -> anyhow::Result<Option<CredentialEntry>> {
            Ok(None)
        }

        async fn update_credential(&self, _update: crate::credentials::CredentialUpdate) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn delete_credential(&self, _key: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_secret_stored_only_after_action_is_logged() {
        let log = ActionLog::new();
        let store = Arc::new(LogCheckingStore {
            log: log.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let pipeline = Arc::new(RecordingPipeline::new(log.clone(), store.clone(), PipelineConfig::default()));
        log.start().await.unwrap();

        let envelope = CapturedEnvelope::new(
            "https://a.example/login",
            CapturedEvent::Input {
                event_name: "change".to_string(),
                target: ElementSnapshot::new("input").with_id("pw").with_type("password"),
                value: "hunter2".to_string(),
            },
        );
        assert!(matches!(pipeline.handle(envelope).await, HandleOutcome::Recorded(_)));

        let seen = store.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("a.example:password:pw".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_frame_id_attached_to_actions() {
        let (pipeline, _) = recording_pipeline().await;
        let frame = FrameDescriptor {
            is_main: false,
            element_name: Some("editor".to_string()),
            ..Default::default()
        };
        let envelope = CapturedEnvelope::new(
            "https://a.example/editor",
            CapturedEvent::Navigate {
                phase: crate::models::NavigationPhase::Load,
                from_url: Some("https://a.example/".to_string()),
                title: "Editor".to_string(),
            },
        )
        .in_frame(frame)
        .with_seq(1);

        let HandleOutcome::Recorded(action) = pipeline.handle(envelope).await else {
            panic!("navigation should be recorded");
        };
        assert_eq!(action.frame_id, "frame[name=editor]");
        assert!(!action.is_main_frame);
        assert_eq!(action.seq, Some(1));
        assert_eq!(pipeline.frames().frame_ids(), vec!["frame[name=editor]".to_string()]);
    }

    #[test]
    fn test_function_keys() {
        assert!(is_function_key("F1"));
        assert!(is_function_key("F12"));
        assert!(!is_function_key("F13"));
        assert!(!is_function_key("f"));
    }
}

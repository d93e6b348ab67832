use chromiumoxide::cdp::browser_protocol::page::EventFrameAttached;
use chromiumoxide::cdp::js_protocol::runtime::EventBindingCalled;
use chromiumoxide::listeners::EventStream;
use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use super::action_log::SessionError;
use super::pipeline::{HandleOutcome, RecordingPipeline};
use crate::browser::{BrowserManager, Viewport};
use crate::models::SessionSnapshot;

/// Runtime binding the page recorder reports through
pub const RECORDER_BINDING: &str = "__recorderEmit";

/// In-page recorder bundle.
///
/// Attaches once per document, snapshots event targets and posts
/// `CapturedEnvelope` JSON through the `__recorderEmit` binding. Hosts without
/// CDP can define `window.__recorderSink(json)` instead.
pub const RECORDER_SCRIPT: &str = r#"
(() => {
    if (window.__recorderActive) return true;
    window.__recorderActive = true;

    const DATA_ATTRS = ['data-testid', 'data-test', 'data-id', 'data-cy', 'data-qa'];
    const BUTTON_TYPES = ['button', 'submit', 'reset'];
    const MAX_TEXT = 500;
    const documentId = Math.random().toString(36).slice(2) + Date.now().toString(36);
    let seq = 0;

    function describeFrame() {
        if (window.top === window) return { isMain: true };
        try {
            const host = window.frameElement;
            if (!host) return { isMain: false, crossOrigin: true };
            return {
                isMain: false,
                elementId: host.id || null,
                elementName: host.getAttribute('name') || null,
                elementSrc: host.getAttribute('src') || null,
                crossOrigin: false
            };
        } catch (e) {
            return { isMain: false, crossOrigin: true };
        }
    }
    const frame = describeFrame();

    function emit(event) {
        const payload = JSON.stringify({
            seq: ++seq,
            documentId,
            timestamp: Date.now(),
            url: location.href,
            frame,
            event
        });
        try {
            if (typeof window.__recorderEmit === 'function') {
                window.__recorderEmit(payload);
            } else if (typeof window.__recorderSink === 'function') {
                window.__recorderSink(payload);
            }
        } catch (e) {
            console.warn('[recorder] emit failed', e);
        }
    }

    function segment(el) {
        let index = 1;
        let same = 0;
        const parent = el.parentElement;
        if (parent) {
            for (const sibling of parent.children) {
                if (sibling.tagName === el.tagName) {
                    same += 1;
                    if (sibling === el) index = same;
                }
            }
        } else {
            same = 1;
        }
        return { tag: el.tagName.toLowerCase(), id: el.id || null, index, sameTagSiblings: same };
    }

    function snapshot(el) {
        const ancestry = [];
        for (let node = el; node && node.nodeType === 1; node = node.parentElement) {
            ancestry.push(segment(node));
        }
        const dataAttributes = {};
        for (const attr of DATA_ATTRS) {
            const value = el.getAttribute(attr);
            if (value) dataAttributes[attr] = value;
        }
        // Field values never go into the snapshot; only button labels do
        const label = el.tagName === 'INPUT' && BUTTON_TYPES.includes(el.type) ? el.value : '';
        const text = (el.textContent || label || el.alt || '').toString();
        return {
            tag: el.tagName.toLowerCase(),
            id: el.id || null,
            name: el.getAttribute('name'),
            inputType: el.getAttribute('type'),
            placeholder: el.getAttribute('placeholder'),
            autocomplete: el.getAttribute('autocomplete'),
            ariaLabel: el.getAttribute('aria-label'),
            role: el.getAttribute('role'),
            className: el.className,
            dataAttributes,
            text: text.slice(0, MAX_TEXT),
            connected: el.isConnected,
            ancestry
        };
    }

    function elementOf(target) {
        if (!target) return null;
        if (target.nodeType === 1) return target;
        return target.parentElement || null;
    }

    document.addEventListener('click', (e) => {
        const el = elementOf(e.target);
        if (!el) return;
        try {
            const r = el.getBoundingClientRect();
            emit({
                kind: 'click',
                target: snapshot(el),
                rect: { x: r.left, y: r.top, width: r.width, height: r.height },
                viewport: { width: window.innerWidth, height: window.innerHeight },
                scroll: { x: window.scrollX, y: window.scrollY }
            });
        } catch (err) {
            console.warn('[recorder] click capture failed', err);
        }
    }, true);

    const lastValue = new WeakMap();
    const pendingInput = new WeakMap();

    function sendInput(el, eventName) {
        const value = el.value == null ? '' : String(el.value);
        if (lastValue.get(el) === value) return;
        lastValue.set(el, value);
        try {
            emit({ kind: 'input', eventName, target: snapshot(el), value });
        } catch (err) {
            console.warn('[recorder] input capture failed', err);
        }
    }

    document.addEventListener('input', (e) => {
        const el = elementOf(e.target);
        if (!el || !('value' in el)) return;
        clearTimeout(pendingInput.get(el));
        pendingInput.set(el, setTimeout(() => sendInput(el, 'input'), 300));
    }, true);

    document.addEventListener('change', (e) => {
        const el = elementOf(e.target);
        if (!el || !('value' in el)) return;
        clearTimeout(pendingInput.get(el));
        sendInput(el, 'change');
    }, true);

    document.addEventListener('keydown', (e) => {
        let focused = null;
        let focusError = false;
        try {
            const active = document.activeElement;
            if (active && active !== document.body) focused = snapshot(active);
        } catch (err) {
            focusError = true;
        }
        emit({
            kind: 'keydown',
            key: e.key,
            code: e.code,
            ctrlKey: e.ctrlKey,
            altKey: e.altKey,
            shiftKey: e.shiftKey,
            metaKey: e.metaKey,
            focused,
            focusError
        });
    }, true);

    let scrollFrame = 0;
    window.addEventListener('scroll', () => {
        if (scrollFrame) return;
        scrollFrame = requestAnimationFrame(() => {
            scrollFrame = 0;
            emit({ kind: 'scroll', x: window.scrollX, y: window.scrollY });
        });
    }, true);

    function navigated(phase, fromUrl) {
        emit({ kind: 'navigate', phase, fromUrl: fromUrl || null, title: document.title || '' });
    }
    if (document.readyState === 'complete') {
        navigated('load', document.referrer);
    } else {
        window.addEventListener('load', () => navigated('load', document.referrer));
    }
    window.addEventListener('beforeunload', () => navigated('beforeunload', location.href));

    return true;
})()
"#;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("browser error: {0}")]
    Browser(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Page to open; `about:blank` when absent
    pub start_url: Option<String>,
    pub headless: bool,
    pub viewport: Viewport,
    /// When false only the session starts; envelopes come in over HTTP
    pub launch_browser: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            start_url: None,
            headless: false,
            viewport: Viewport::default(),
            launch_browser: true,
        }
    }
}

/// Drives one Chrome page and feeds its recorder messages into the pipeline
pub struct BrowserRecorder {
    /// The browser manager - public for integration tests
    pub browser: Arc<BrowserManager>,
    pipeline: Arc<RecordingPipeline>,
    cancel_sender: broadcast::Sender<()>,
}

impl BrowserRecorder {
    pub fn new(pipeline: Arc<RecordingPipeline>) -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            browser: Arc::new(BrowserManager::new()),
            pipeline,
            cancel_sender: cancel_tx,
        }
    }

    pub fn pipeline(&self) -> &Arc<RecordingPipeline> {
        &self.pipeline
    }

    /// Start a session and, if requested, a browser recording into it.
    ///
    /// The session is rolled back when the browser cannot be set up.
    pub async fn start(&self, options: &StartOptions) -> Result<SessionSnapshot, RecorderError> {
        let snapshot = self.pipeline.log().start().await?;
        self.pipeline.reset().await;

        if options.launch_browser {
            if let Err(e) = self.attach_browser(options).await {
                tracing::error!("Recording browser setup failed: {}", e);
                let _ = self.cancel_sender.send(());
                let _ = self.pipeline.log().stop().await;
                self.browser.close().await.ok();
                return Err(RecorderError::Browser(e));
            }
        }

        Ok(snapshot)
    }

    async fn attach_browser(&self, options: &StartOptions) -> anyhow::Result<()> {
        let url = options.start_url.as_deref().unwrap_or("about:blank");
        self.browser.launch(url, options.headless, options.viewport).await?;

        let bindings = self.browser.setup_event_binding(RECORDER_BINDING).await?;
        let frames = self.browser.frame_attached_listener().await?;

        // Covers every later document, iframes included
        self.browser.add_script_on_new_document(RECORDER_SCRIPT).await?;
        self.browser.evaluate(RECORDER_SCRIPT).await?;

        self.spawn_event_listener(bindings);
        self.spawn_frame_watcher(frames);
        tracing::info!("Recorder attached to {}", url);
        Ok(())
    }

    fn spawn_event_listener(&self, mut events: EventStream<EventBindingCalled>) {
        let pipeline = Arc::clone(&self.pipeline);
        let mut cancel_rx = self.cancel_sender.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => break,
                    maybe_event = events.next() => {
                        let Some(event) = maybe_event else {
                            tracing::debug!("CDP binding stream ended");
                            break;
                        };
                        if event.name != RECORDER_BINDING {
                            continue;
                        }
                        match pipeline.handle_payload(&event.payload).await {
                            HandleOutcome::Recorded(action) => {
                                tracing::trace!("Captured {} in {}", action.type_name(), action.frame_id)
                            }
                            HandleOutcome::Skipped(reason) => tracing::trace!("Skipped event: {}", reason),
                            HandleOutcome::Deferred => {}
                            HandleOutcome::Rejected(e) => tracing::debug!("Event rejected: {}", e),
                        }
                    }
                }
            }
            tracing::info!("Recording event listener stopped");
        });
    }

    fn spawn_frame_watcher(&self, mut frames: EventStream<EventFrameAttached>) {
        let pipeline = Arc::clone(&self.pipeline);
        let mut cancel_rx = self.cancel_sender.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => break,
                    maybe_frame = frames.next() => {
                        let Some(frame) = maybe_frame else { break };
                        tracing::debug!(
                            "Frame {} attached under {}",
                            frame.frame_id.inner(),
                            frame.parent_frame_id.inner()
                        );
                        pipeline.frames().observe(frame.frame_id.inner());
                    }
                }
            }
        });
    }

    /// Stop the session. Pending scrolls are emitted first; the browser is
    /// closed in the background.
    pub async fn stop(&self) -> Result<SessionSnapshot, RecorderError> {
        if !self.pipeline.log().is_recording().await {
            return Err(SessionError::NotRecording.into());
        }

        let flushed = self.pipeline.flush_scrolls().await;
        if flushed > 0 {
            tracing::debug!("Flushed {} pending scroll action(s)", flushed);
        }
        let snapshot = self.pipeline.log().stop().await?;
        let _ = self.cancel_sender.send(());

        let silent = self.pipeline.frames().silent_frames();
        if silent > 0 {
            tracing::warn!(
                "{} frame(s) attached during the session never reported from a recorder; \
                 actions inside them were not captured",
                silent
            );
        }

        let browser = Arc::clone(&self.browser);
        tokio::spawn(async move {
            if let Err(e) = browser.close().await {
                tracing::warn!("Background browser close failed: {}", e);
            }
        });

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::recording::{ActionLog, PipelineConfig};

    fn recorder() -> BrowserRecorder {
        let pipeline = RecordingPipeline::new(
            ActionLog::new(),
            Arc::new(MemoryCredentialStore::new()),
            PipelineConfig::default(),
        );
        BrowserRecorder::new(Arc::new(pipeline))
    }

    fn without_browser() -> StartOptions {
        StartOptions {
            launch_browser: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_without_browser() {
        let recorder = recorder();
        let snapshot = recorder.start(&without_browser()).await.unwrap();
        assert!(snapshot.state.is_recording());
        assert!(!recorder.browser.is_open().await);

        assert!(matches!(
            recorder.start(&without_browser()).await,
            Err(RecorderError::Session(SessionError::AlreadyRecording))
        ));

        let stopped = recorder.stop().await.unwrap();
        assert!(!stopped.state.is_recording());
        assert!(matches!(
            recorder.stop().await,
            Err(RecorderError::Session(SessionError::NotRecording))
        ));
    }

    #[test]
    fn test_script_uses_binding_and_guard() {
        assert!(RECORDER_SCRIPT.contains(RECORDER_BINDING));
        assert!(RECORDER_SCRIPT.contains("window.__recorderActive"));
        for kind in ["'click'", "'input'", "'keydown'", "'scroll'", "'navigate'"] {
            assert!(RECORDER_SCRIPT.contains(kind), "missing {}", kind);
        }
    }
}

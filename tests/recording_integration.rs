//! Integration tests for the browser recorder.
//!
//! These launch a real headless Chrome and drive the fixture page through CDP.
//!
//! Run with: cargo test --test recording_integration -- --ignored --test-threads=1

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use recorder_sidecar::credentials::{CredentialStore, MemoryCredentialStore};
use recorder_sidecar::models::{Action, Locator};
use recorder_sidecar::recording::{
    ActionLog, BrowserRecorder, PipelineConfig, RecordingPipeline, StartOptions,
};

/// Get file:// URL for the test page
fn test_page_url() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    format!("file://{}/tests/fixtures/test_page.html", manifest_dir)
}

/// Give the page time to deliver binding calls (input is debounced 300ms in the page)
async fn wait_for_events(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

fn recorder() -> (BrowserRecorder, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let pipeline = RecordingPipeline::new(ActionLog::new(), store.clone(), PipelineConfig::default());
    (BrowserRecorder::new(Arc::new(pipeline)), store)
}

async fn start(recorder: &BrowserRecorder) {
    let options = StartOptions {
        start_url: Some(test_page_url()),
        headless: true,
        ..Default::default()
    };
    recorder.start(&options).await.unwrap();
    wait_for_events(1500).await;
}

async fn stop(recorder: &BrowserRecorder) -> Vec<Action> {
    recorder.stop().await.unwrap();
    recorder.pipeline().log().actions().await
}

fn of_type<'a>(actions: &'a [Action], type_name: &str) -> Vec<&'a Action> {
    actions.iter().filter(|a| a.type_name() == type_name).collect()
}

// ============================================================================
// Click
// ============================================================================

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn test_click_capture() {
    let (recorder, _) = recorder();
    start(&recorder).await;

    recorder.browser.click("#submit-btn").await.unwrap();
    wait_for_events(500).await;

    let actions = stop(&recorder).await;
    let clicks = of_type(&actions, "click");
    assert_eq!(clicks.len(), 1, "actions: {:?}", actions);
    assert_eq!(clicks[0].locators()[0], Locator::id("submit-btn"));
    assert!(clicks[0].is_main_frame);
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn test_password_capture_is_redacted() {
    let (recorder, store) = recorder();
    start(&recorder).await;

    recorder.browser.type_text("#password", "secret123").await.unwrap();
    recorder.browser.click("#submit-btn").await.unwrap();
    wait_for_events(800).await;

    let actions = stop(&recorder).await;
    let json = serde_json::to_string(&actions).unwrap();
    assert!(!json.contains("secret123"), "secret leaked: {}", json);
    assert!(!of_type(&actions, "enter-credential-password").is_empty());

    // file:// URLs have no host
    let entry = store
        .get_credential("unknown-host:password:password")
        .await
        .unwrap()
        .expect("password stored");
    assert_eq!(entry.value, "secret123");
}

// ============================================================================
// Keys
// ============================================================================

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn test_special_key_capture() {
    let (recorder, _) = recorder();
    start(&recorder).await;

    recorder.browser.press_key("#search", "Enter").await.unwrap();
    wait_for_events(500).await;

    let actions = stop(&recorder).await;
    assert_eq!(of_type(&actions, "keypress").len(), 1, "actions: {:?}", actions);
}

// ============================================================================
// Frames
// ============================================================================

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn test_iframe_actions_carry_frame_id() {
    let (recorder, _) = recorder();
    start(&recorder).await;

    recorder
        .browser
        .evaluate("document.getElementById('child').contentDocument.getElementById('inner-btn').click(); true")
        .await
        .unwrap();
    wait_for_events(500).await;

    let actions = stop(&recorder).await;
    let inner: Vec<_> = of_type(&actions, "click")
        .into_iter()
        .filter(|a| !a.is_main_frame)
        .collect();
    assert_eq!(inner.len(), 1, "actions: {:?}", actions);
    assert!(inner[0].frame_id.starts_with("frame["), "frame id {}", inner[0].frame_id);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
#[ignore = "requires a local Chrome"]
async fn test_restart_clears_previous_session() {
    let (recorder, _) = recorder();
    start(&recorder).await;
    recorder.browser.click("#submit-btn").await.unwrap();
    wait_for_events(500).await;
    assert!(!stop(&recorder).await.is_empty());

    // browser close runs in the background
    wait_for_events(1000).await;
    start(&recorder).await;
    let actions = recorder.pipeline().log().actions().await;
    assert!(of_type(&actions, "click").is_empty());
    stop(&recorder).await;
}

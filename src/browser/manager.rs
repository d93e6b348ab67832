use anyhow::{anyhow, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventFrameAttached,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Owns the recording browser and its single page
pub struct BrowserManager {
    browser: Arc<Mutex<Option<Browser>>>,
    page: Arc<Mutex<Option<Page>>>,
    /// Serializes launches so two starts never spawn two Chromes
    launch_lock: Mutex<()>,
}

impl BrowserManager {
    pub fn new() -> Self {
        Self {
            browser: Arc::new(Mutex::new(None)),
            page: Arc::new(Mutex::new(None)),
            launch_lock: Mutex::new(()),
        }
    }

    /// Launch Chrome in a fresh incognito context and open `url`
    pub async fn launch(&self, url: &str, headless: bool, viewport: Viewport) -> Result<()> {
        let _launch_guard = self.launch_lock.lock().await;
        self.close().await.ok();

        let mut config = BrowserConfig::builder().window_size(viewport.width, viewport.height);
        if !headless {
            config = config.with_head();
        }
        // --incognito opens a second window; the CDP context below is used instead
        let config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (mut browser, mut handler) = timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| anyhow!("Browser launch timed out after {}s; is Chrome installed?", LAUNCH_TIMEOUT.as_secs()))?
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });

        let default_pages = browser
            .pages()
            .await
            .map_err(|e| anyhow!("Failed to list pages: {}", e))?;

        browser
            .start_incognito_context()
            .await
            .map_err(|e| anyhow!("Failed to start incognito context: {}", e))?;

        let page = browser
            .new_page(url)
            .await
            .map_err(|e| anyhow!("Failed to open {}: {}", url, e))?;

        for default_page in default_pages {
            if let Err(e) = default_page.close().await {
                tracing::warn!("Failed to close default page: {}", e);
            }
        }

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!("Failed to build viewport params: {}", e))?;
        page.execute(metrics)
            .await
            .map_err(|e| anyhow!("Failed to set viewport: {}", e))?;

        *self.browser.lock().await = Some(browser);
        *self.page.lock().await = Some(page);

        tracing::info!(
            "Browser launched ({}x{}, headless={}) at {}",
            viewport.width,
            viewport.height,
            headless,
            url
        );
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.page.lock().await.is_some()
    }

    async fn require_page(&self) -> Result<Page> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("No page available"))
    }

    pub async fn current_url(&self) -> Result<String> {
        self.require_page()
            .await?
            .url()
            .await
            .map_err(|e| anyhow!("Failed to get URL: {}", e))?
            .ok_or_else(|| anyhow!("Page has no URL"))
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.require_page()
            .await?
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        Ok(())
    }

    /// Click the first element matching a CSS selector
    pub async fn click(&self, selector: &str) -> Result<()> {
        let page = self.require_page().await?;
        page.find_element(selector)
            .await
            .map_err(|e| anyhow!("Failed to find element '{}': {}", selector, e))?
            .click()
            .await
            .map_err(|e| anyhow!("Failed to click element '{}': {}", selector, e))?;
        Ok(())
    }

    /// Focus an element by clicking it, then type `text` key by key
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let page = self.require_page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("Failed to find element '{}': {}", selector, e))?;
        element
            .click()
            .await
            .map_err(|e| anyhow!("Failed to focus element '{}': {}", selector, e))?
            .type_str(text)
            .await
            .map_err(|e| anyhow!("Failed to type into element '{}': {}", selector, e))?;
        Ok(())
    }

    pub async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let page = self.require_page().await?;
        page.find_element(selector)
            .await
            .map_err(|e| anyhow!("Failed to find element '{}': {}", selector, e))?
            .press_key(key)
            .await
            .map_err(|e| anyhow!("Failed to press {} on '{}': {}", key, selector, e))?;
        Ok(())
    }

    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.require_page()
            .await?
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("Failed to evaluate script: {}", e))?
            .into_value()
            .map_err(|e| anyhow!("Failed to parse script result: {}", e))
    }

    /// Expose `binding_name` to every frame of the page and stream its calls
    pub async fn setup_event_binding(&self, binding_name: &str) -> Result<EventStream<EventBindingCalled>> {
        let page = self.require_page().await?;
        page.execute(AddBindingParams::new(binding_name))
            .await
            .map_err(|e| anyhow!("Failed to add binding '{}': {}", binding_name, e))?;

        let events = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| anyhow!("Failed to listen for binding calls: {}", e))?;

        tracing::debug!("CDP binding '{}' installed", binding_name);
        Ok(events)
    }

    /// Run `source` in every new document, including child frames and reloads
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        self.require_page()
            .await?
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(|e| anyhow!("Failed to register new-document script: {}", e))?;
        Ok(())
    }

    pub async fn frame_attached_listener(&self) -> Result<EventStream<EventFrameAttached>> {
        self.require_page()
            .await?
            .event_listener::<EventFrameAttached>()
            .await
            .map_err(|e| anyhow!("Failed to listen for frame attach: {}", e))
    }

    pub async fn close(&self) -> Result<()> {
        let mut page_guard = self.page.lock().await;
        let mut browser_guard = self.browser.lock().await;

        if let Some(page) = page_guard.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = browser_guard.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            tracing::info!("Browser closed");
        }
        Ok(())
    }
}

impl Default for BrowserManager {
    fn default() -> Self {
        Self::new()
    }
}

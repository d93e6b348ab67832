use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Optional start URL - if not provided, opens a blank tab
    pub start_url: Option<String>,
    /// Falls back to the configured default when absent
    pub headless: Option<bool>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// When false only the action log is started; events are expected from
    /// an external page recorder posting to `/recording/events`
    #[serde(default = "default_launch_browser")]
    pub launch_browser: bool,
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    720
}

fn default_launch_browser() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct ExportQuery {
    #[serde(default)]
    pub consolidate: bool,
    pub name: Option<String>,
}

/// Partial update of a stored credential. No `Debug`: carries a secret.
#[derive(Deserialize)]
pub struct UpdateCredentialRequest {
    pub value: Option<String>,
    pub url: Option<String>,
}

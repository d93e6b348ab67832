use serde::{Deserialize, Serialize};

use super::element::ElementSnapshot;

/// Where an envelope came from, as seen from inside the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescriptor {
    pub is_main: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_src: Option<String>,
    /// The parent document refused access to `frameElement`
    #[serde(default)]
    pub cross_origin: bool,
}

impl FrameDescriptor {
    pub fn main() -> Self {
        Self {
            is_main: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationPhase {
    Load,
    BeforeUnload,
}

/// Event body sent by the in-page recorder, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CapturedEvent {
    Click {
        target: ElementSnapshot,
        #[serde(default)]
        rect: Option<Rect>,
        #[serde(default)]
        viewport: Option<ViewportSize>,
        #[serde(default)]
        scroll: Option<ScrollOffset>,
    },
    Input {
        #[serde(default = "default_input_event")]
        event_name: String,
        target: ElementSnapshot,
        #[serde(default)]
        value: String,
    },
    Keydown {
        key: String,
        #[serde(default)]
        code: String,
        #[serde(default)]
        ctrl_key: bool,
        #[serde(default)]
        alt_key: bool,
        #[serde(default)]
        shift_key: bool,
        #[serde(default)]
        meta_key: bool,
        /// Snapshot of `document.activeElement` taken in the same event
        #[serde(default)]
        focused: Option<ElementSnapshot>,
        /// The page could not snapshot the focused element
        #[serde(default)]
        focus_error: bool,
    },
    Scroll {
        x: f64,
        y: f64,
    },
    Navigate {
        phase: NavigationPhase,
        #[serde(default)]
        from_url: Option<String>,
        #[serde(default)]
        title: String,
    },
}

fn default_input_event() -> String {
    "input".to_string()
}

impl CapturedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CapturedEvent::Click { .. } => "click",
            CapturedEvent::Input { .. } => "input",
            CapturedEvent::Keydown { .. } => "keydown",
            CapturedEvent::Scroll { .. } => "scroll",
            CapturedEvent::Navigate { .. } => "navigate",
        }
    }
}

/// One message from a page-side recorder instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedEnvelope {
    #[serde(default)]
    pub seq: Option<u64>,
    /// Random token created when the recorder attached to the document
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub url: String,
    #[serde(default = "FrameDescriptor::main")]
    pub frame: FrameDescriptor,
    pub event: CapturedEvent,
}

impl CapturedEnvelope {
    pub fn new(url: &str, event: CapturedEvent) -> Self {
        Self {
            seq: None,
            document_id: String::new(),
            timestamp: None,
            url: url.to_string(),
            frame: FrameDescriptor::main(),
            event,
        }
    }

    pub fn in_frame(mut self, frame: FrameDescriptor) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_payload() {
        let payload = r#"{
            "seq": 4,
            "documentId": "d-1",
            "timestamp": 1700000000000,
            "url": "https://shop.example/cart",
            "frame": { "isMain": false, "elementId": "checkout", "crossOrigin": false },
            "event": {
                "kind": "keydown",
                "key": "Enter",
                "code": "Enter",
                "ctrlKey": false,
                "focused": { "tag": "input", "id": "coupon", "ancestry": [] }
            }
        }"#;

        let envelope: CapturedEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.seq, Some(4));
        assert_eq!(envelope.frame.element_id.as_deref(), Some("checkout"));
        match envelope.event {
            CapturedEvent::Keydown { key, focused, focus_error, .. } => {
                assert_eq!(key, "Enter");
                assert_eq!(focused.unwrap().id.as_deref(), Some("coupon"));
                assert!(!focus_error);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_navigation_phase_names() {
        let event: CapturedEvent =
            serde_json::from_str(r#"{"kind":"navigate","phase":"beforeunload","title":"Home"}"#).unwrap();
        assert_eq!(
            event,
            CapturedEvent::Navigate {
                phase: NavigationPhase::BeforeUnload,
                from_url: None,
                title: "Home".to_string()
            }
        );
    }
}

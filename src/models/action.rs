use serde::{Deserialize, Serialize};
use std::fmt;

use super::locator::Locator;

/// Format version written into exported scripts
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Frame id used for the top-level browsing context
pub const MAIN_FRAME_ID: &str = "main";

/// Semantic role of a secret-bearing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Username,
    Password,
    Phone,
    Card,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Username => "username",
            CredentialType::Password => "password",
            CredentialType::Phone => "phone",
            CredentialType::Card => "card",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of every `enter-credential-*` action. Carries the key, never the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInput {
    pub locators: Vec<Locator>,
    pub credential_key: String,
    pub tag_name: String,
}

/// Type-specific part of an action, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ActionKind {
    Click {
        locators: Vec<Locator>,
        tag_name: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        absolute_x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        absolute_y: Option<f64>,
        /// Viewport-relative fraction
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    Type {
        locators: Vec<Locator>,
        value: String,
        tag_name: String,
    },
    EnterCredentialUsername(CredentialInput),
    EnterCredentialPassword(CredentialInput),
    EnterCredentialPhone(CredentialInput),
    EnterCredentialCard(CredentialInput),
    Keypress {
        key: String,
        code: String,
        ctrl_key: bool,
        alt_key: bool,
        shift_key: bool,
        meta_key: bool,
    },
    Navigate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_url: Option<String>,
        #[serde(default)]
        title: String,
    },
    Scroll {
        x: f64,
        y: f64,
    },
}

impl ActionKind {
    pub fn credential(credential_type: CredentialType, input: CredentialInput) -> Self {
        match credential_type {
            CredentialType::Username => ActionKind::EnterCredentialUsername(input),
            CredentialType::Password => ActionKind::EnterCredentialPassword(input),
            CredentialType::Phone => ActionKind::EnterCredentialPhone(input),
            CredentialType::Card => ActionKind::EnterCredentialCard(input),
        }
    }

    /// Wire name of this action type
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "click",
            ActionKind::Type { .. } => "type",
            ActionKind::EnterCredentialUsername(_) => "enter-credential-username",
            ActionKind::EnterCredentialPassword(_) => "enter-credential-password",
            ActionKind::EnterCredentialPhone(_) => "enter-credential-phone",
            ActionKind::EnterCredentialCard(_) => "enter-credential-card",
            ActionKind::Keypress { .. } => "keypress",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Scroll { .. } => "scroll",
        }
    }

    pub fn credential_input(&self) -> Option<(CredentialType, &CredentialInput)> {
        match self {
            ActionKind::EnterCredentialUsername(input) => Some((CredentialType::Username, input)),
            ActionKind::EnterCredentialPassword(input) => Some((CredentialType::Password, input)),
            ActionKind::EnterCredentialPhone(input) => Some((CredentialType::Phone, input)),
            ActionKind::EnterCredentialCard(input) => Some((CredentialType::Card, input)),
            _ => None,
        }
    }

    pub fn locators(&self) -> &[Locator] {
        match self {
            ActionKind::Click { locators, .. } | ActionKind::Type { locators, .. } => locators,
            other => other
                .credential_input()
                .map(|(_, input)| input.locators.as_slice())
                .unwrap_or(&[]),
        }
    }
}

/// One captured interaction. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Page URL at capture time
    pub url: String,
    pub frame_id: String,
    pub is_main_frame: bool,
    /// Per-document sequence number assigned by the in-page recorder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Action {
    pub fn new(kind: ActionKind, url: impl Into<String>, frame_id: impl Into<String>, timestamp: i64) -> Self {
        let frame_id = frame_id.into();
        Self {
            kind,
            timestamp,
            url: url.into(),
            is_main_frame: frame_id == MAIN_FRAME_ID,
            frame_id,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn locators(&self) -> &[Locator] {
        self.kind.locators()
    }
}

/// JSON document handed to the replay backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedScript {
    pub version: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub actions: Vec<Action>,
}

impl ExportedScript {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            name: None,
            actions,
        }
    }

    /// Credential keys referenced by the script, in first-use order
    pub fn credential_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for action in &self.actions {
            if let Some((_, input)) = action.kind.credential_input() {
                if !keys.contains(&input.credential_key.as_str()) {
                    keys.push(&input.credential_key);
                }
            }
        }
        keys
    }
}

/// Collapse consecutive text entries aimed at the same element into the last one.
///
/// Typing fires both `input` and `change`, and a field edited in bursts
/// produces several entries; replay only needs the final state.
pub fn consolidate_typing(actions: &[Action]) -> Vec<Action> {
    let mut consolidated: Vec<Action> = Vec::with_capacity(actions.len());

    for action in actions {
        if let Some(last) = consolidated.last_mut() {
            if same_text_target(last, action) {
                tracing::debug!(
                    "Consolidated {} action in frame {}",
                    action.type_name(),
                    action.frame_id
                );
                *last = action.clone();
                continue;
            }
        }
        consolidated.push(action.clone());
    }

    consolidated
}

fn same_text_target(a: &Action, b: &Action) -> bool {
    if a.frame_id != b.frame_id {
        return false;
    }
    match (&a.kind, &b.kind) {
        (ActionKind::Type { locators: la, .. }, ActionKind::Type { locators: lb, .. }) => {
            la.first() == lb.first()
        }
        (ka, kb) => match (ka.credential_input(), kb.credential_input()) {
            (Some((ta, ia)), Some((tb, ib))) => ta == tb && ia.credential_key == ib.credential_key,
            _ => false,
        },
    }
}

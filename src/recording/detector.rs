//! Credential field classification.
//!
//! Runs before a field's value is recorded so that secrets never reach the
//! action log. Classification is a pure function over [`ElementSignature`];
//! the regex tables live in a versioned [`PatternTable`].

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::models::{CredentialType, ElementSnapshot};

/// Input types that can never carry a typed secret
const NON_TEXT_INPUT_TYPES: [&str; 10] = [
    "checkbox", "radio", "submit", "button", "reset", "file", "image", "range", "color", "hidden",
];

const UNKNOWN_HOST: &str = "unknown-host";

/// The attributes classification looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSignature {
    pub tag: String,
    pub input_type: String,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub autocomplete: String,
    pub aria_label: String,
    pub class_name: String,
}

impl ElementSignature {
    pub fn from_snapshot(element: &ElementSnapshot) -> Self {
        let lower = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_lowercase();
        Self {
            tag: element.tag.to_lowercase(),
            input_type: lower(&element.input_type),
            name: lower(&element.name),
            id: lower(&element.id),
            placeholder: lower(&element.placeholder),
            autocomplete: lower(&element.autocomplete),
            aria_label: lower(&element.aria_label),
            class_name: lower(&element.class_name),
        }
    }

    /// Free-text attributes matched against the role patterns
    fn descriptors(&self) -> [&str; 5] {
        [&self.name, &self.id, &self.placeholder, &self.aria_label, &self.class_name]
    }

    fn is_candidate(&self) -> bool {
        match self.tag.as_str() {
            "input" => !NON_TEXT_INPUT_TYPES.contains(&self.input_type.as_str()),
            "textarea" => true,
            _ => false,
        }
    }
}

/// Semantic role of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    None,
    Password,
    Username,
    Phone,
    Card,
}

impl FieldRole {
    pub fn credential_type(&self) -> Option<CredentialType> {
        match self {
            FieldRole::None => None,
            FieldRole::Password => Some(CredentialType::Password),
            FieldRole::Username => Some(CredentialType::Username),
            FieldRole::Phone => Some(CredentialType::Phone),
            FieldRole::Card => Some(CredentialType::Card),
        }
    }
}

/// Versioned regex tables for role detection
#[derive(Debug)]
pub struct PatternTable {
    pub version: u32,
    pub password: Regex,
    pub username: Regex,
    pub phone: Regex,
    pub card: Regex,
}

impl PatternTable {
    pub fn v1() -> Result<Self, regex::Error> {
        Ok(Self {
            version: 1,
            password: Regex::new(
                r"(?i)(passw(or)?d|passwort|contrase(ñ|n)a|mot.?de.?passe|pwd|passcode|pass([^a-z]|$)|secret|(^|[^a-z])pin([^a-z]|$)|auth|token|密码|パスワード|비밀번호|пароль)",
            )?,
            username: Regex::new(
                r"(?i)(user(name|id|_?name)?|e-?mail|login|account|acct|sign.?in|usuario|correo|utilisateur|identifiant|courriel|benutzer(name)?|anmelden|nome.?utente|用户|邮箱|账号|帳號|ユーザー|メール|아이디|이메일|логин|почта)",
            )?,
            phone: Regex::new(r"(?i)(phone|mobile|cell|contact|(^|[^a-z])tel([^a-z]|$)|telefon|tel[eé]fono|手机|電話|전화)")?,
            card: Regex::new(
                r"(?i)(card.?(number|num|no)|cc.?(num|number|exp|csc)|credit.?card|cvv|cvc|csc|security.?code|expir(y|ation))",
            )?,
        })
    }

    /// Shared default table, compiled once
    pub fn current() -> &'static PatternTable {
        static TABLE: OnceLock<PatternTable> = OnceLock::new();
        TABLE.get_or_init(|| PatternTable::v1().expect("built-in credential patterns must compile"))
    }

    fn matches(&self, pattern: &Regex, signature: &ElementSignature) -> bool {
        signature
            .descriptors()
            .iter()
            .any(|value| !value.is_empty() && pattern.is_match(value))
    }
}

/// Classify a field. First match wins: password, username, phone, card.
pub fn classify_field(signature: &ElementSignature, table: &PatternTable) -> FieldRole {
    if !signature.is_candidate() {
        return FieldRole::None;
    }

    let input_type = signature.input_type.as_str();
    let autocomplete = signature.autocomplete.as_str();

    if input_type == "password"
        || autocomplete.contains("password")
        || table.matches(&table.password, signature)
    {
        return FieldRole::Password;
    }

    if input_type == "email"
        || autocomplete.contains("username")
        || autocomplete.contains("email")
        || table.matches(&table.username, signature)
    {
        return FieldRole::Username;
    }

    if input_type == "tel" || autocomplete.contains("tel") || table.matches(&table.phone, signature) {
        return FieldRole::Phone;
    }

    if autocomplete.starts_with("cc-") || table.matches(&table.card, signature) {
        return FieldRole::Card;
    }

    FieldRole::None
}

/// Result of checking one element
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDetection {
    pub is_credential: bool,
    /// The element's `type` attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<CredentialType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl CredentialDetection {
    fn none() -> Self {
        Self {
            is_credential: false,
            field_type: None,
            credential_type: None,
            key: None,
        }
    }
}

/// Classify `element` and derive its credential key on `page_url`
pub fn detect_credential_field(element: &ElementSnapshot, page_url: &str) -> CredentialDetection {
    detect_with_table(element, page_url, PatternTable::current())
}

pub fn detect_with_table(element: &ElementSnapshot, page_url: &str, table: &PatternTable) -> CredentialDetection {
    let signature = ElementSignature::from_snapshot(element);
    let Some(credential_type) = classify_field(&signature, table).credential_type() else {
        return CredentialDetection::none();
    };

    CredentialDetection {
        is_credential: true,
        field_type: Some(if signature.input_type.is_empty() {
            signature.tag.clone()
        } else {
            signature.input_type.clone()
        }),
        credential_type: Some(credential_type),
        key: Some(credential_key(page_url, credential_type, element)),
    }
}

/// `{hostname}:{credentialType}:{id|name|field}`, stable across sessions
pub fn credential_key(page_url: &str, credential_type: CredentialType, element: &ElementSnapshot) -> String {
    format!("{}:{}:{}", hostname(page_url), credential_type, element.identifier())
}

fn hostname(page_url: &str) -> String {
    url::Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

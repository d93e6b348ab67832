use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::DEFAULT_KEYRING_SERVICE;
use crate::recording::{LocatorOptions, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackend {
    Keyring,
    Memory,
}

impl FromStr for CredentialBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyring" | "keychain" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown credential store '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub scroll_debounce_ms: u64,
    pub text_locator_max_chars: usize,
    pub click_text_max_chars: usize,
    pub record_all_keys: bool,
    pub credential_backend: CredentialBackend,
    pub keyring_service: String,
    /// Default for start requests that don't say
    pub headless: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        Self {
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            host: lookup("HOST").unwrap_or(defaults.host),
            scroll_debounce_ms: parsed(&lookup, "RECORDER_SCROLL_DEBOUNCE_MS").unwrap_or(defaults.scroll_debounce_ms),
            text_locator_max_chars: parsed(&lookup, "RECORDER_TEXT_LOCATOR_MAX").unwrap_or(defaults.text_locator_max_chars),
            click_text_max_chars: parsed(&lookup, "RECORDER_CLICK_TEXT_MAX").unwrap_or(defaults.click_text_max_chars),
            record_all_keys: lookup("RECORDER_RECORD_ALL_KEYS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.record_all_keys),
            credential_backend: match lookup("RECORDER_CREDENTIAL_STORE").map(|v| v.parse()) {
                Some(Ok(backend)) => backend,
                Some(Err(e)) => {
                    tracing::warn!("{}; using {:?}", e, defaults.credential_backend);
                    defaults.credential_backend
                }
                None => defaults.credential_backend,
            },
            keyring_service: lookup("RECORDER_KEYRING_SERVICE").unwrap_or(defaults.keyring_service),
            headless: lookup("RECORDER_HEADLESS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.headless),
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            locators: LocatorOptions {
                text_max_chars: self.text_locator_max_chars,
            },
            click_text_max_chars: self.click_text_max_chars,
            scroll_debounce: Duration::from_millis(self.scroll_debounce_ms),
            record_all_keys: self.record_all_keys,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8765,
            host: "127.0.0.1".to_string(),
            scroll_debounce_ms: 250,
            text_locator_max_chars: crate::recording::locator::DEFAULT_TEXT_MAX_CHARS,
            click_text_max_chars: 100,
            record_all_keys: false,
            credential_backend: CredentialBackend::Keyring,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            headless: false,
        }
    }
}

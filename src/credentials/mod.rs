//! Secure credential store collaborator.
//!
//! Secrets detected while recording are handed to a [`CredentialStore`] keyed
//! by their derived credential key; the action log only ever sees the key.

mod keyring_store;
mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::{CredentialType, ExportedScript};

pub use keyring_store::{KeyringCredentialStore, DEFAULT_KEYRING_SERVICE};
pub use memory::MemoryCredentialStore;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl CredentialEntry {
    pub fn new(key: &str, value: &str, credential_type: CredentialType, url: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            credential_type,
            url: url.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .field("credential_type", &self.credential_type)
            .field("url", &self.url)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Partial update; `None` keeps the stored field
#[derive(Clone, Default)]
pub struct CredentialUpdate {
    pub key: String,
    pub value: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn store_credential(&self, entry: CredentialEntry) -> Result<()>;

    async fn get_credential(&self, key: &str) -> Result<Option<CredentialEntry>>;

    /// Returns false when no entry exists for the key
    async fn update_credential(&self, update: CredentialUpdate) -> Result<bool>;

    /// Returns false when no entry exists for the key
    async fn delete_credential(&self, key: &str) -> Result<bool>;
}

/// Look up every credential a script references, keyed by credential key.
///
/// Keys without a stored entry are left out so the replay backend can prompt.
pub async fn resolve_script_credentials(
    store: &dyn CredentialStore,
    script: &ExportedScript,
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();
    for key in script.credential_keys() {
        match store.get_credential(key).await? {
            Some(entry) => {
                resolved.insert(key.to_string(), entry.value);
            }
            None => tracing::info!("No stored credential for {}", key),
        }
    }
    Ok(resolved)
}

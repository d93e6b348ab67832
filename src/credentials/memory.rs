use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::{CredentialEntry, CredentialStore, CredentialUpdate};

/// Process-local store, used in tests and when no OS keychain is available
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, CredentialEntry>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store_credential(&self, entry: CredentialEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn get_credential(&self, key: &str) -> Result<Option<CredentialEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn update_credential(&self, update: CredentialUpdate) -> Result<bool> {
        let Some(mut entry) = self.entries.get_mut(&update.key) else {
            return Ok(false);
        };
        if let Some(value) = update.value {
            entry.value = value;
        }
        if let Some(url) = update.url {
            entry.url = url;
        }
        entry.timestamp = chrono::Utc::now().timestamp_millis();
        Ok(true)
    }

    async fn delete_credential(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{CredentialEntry, CredentialStore, CredentialUpdate};
use crate::models::CredentialType;

pub const DEFAULT_KEYRING_SERVICE: &str = "recorder-sidecar";

const AVAILABILITY_KEY: &str = "recorder-sidecar:availability-check";

/// OS keychain backed store. One keychain item per credential key; the item's
/// secret is the JSON-encoded [`CredentialEntry`].
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Write, read back and delete a throwaway item.
    ///
    /// Fails when no platform keychain is reachable; keyring's mock backend
    /// accepts writes but never returns them, which also fails here.
    pub fn check_available(&self) -> Result<()> {
        let canary = CredentialEntry::new(
            AVAILABILITY_KEY,
            &uuid::Uuid::new_v4().to_string(),
            CredentialType::Password,
            "",
        );
        self.write(&canary)?;
        let read_back = self.read(AVAILABILITY_KEY)?;
        if let Err(e) = self.entry(AVAILABILITY_KEY)?.delete_credential() {
            tracing::debug!("Could not remove keychain availability item: {}", e);
        }

        match read_back {
            Some(entry) if entry.value == canary.value => Ok(()),
            _ => Err(anyhow!("keychain accepted a write but did not return it")),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| anyhow!("Failed to open keychain entry for {}: {}", key, e))
    }

    fn read(&self, key: &str) -> Result<Option<CredentialEntry>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => {
                let entry = serde_json::from_str(&secret)
                    .map_err(|e| anyhow!("Corrupt keychain entry for {}: {}", key, e))?;
                Ok(Some(entry))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!("Failed to read keychain entry for {}: {}", key, e)),
        }
    }

    fn write(&self, entry: &CredentialEntry) -> Result<()> {
        let secret = serde_json::to_string(entry)?;
        self.entry(&entry.key)?
            .set_password(&secret)
            .map_err(|e| anyhow!("Failed to write keychain entry for {}: {}", entry.key, e))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn store_credential(&self, entry: CredentialEntry) -> Result<()> {
        self.write(&entry)?;
        tracing::info!("Stored {} credential {} in keychain", entry.credential_type, entry.key);
        Ok(())
    }

    async fn get_credential(&self, key: &str) -> Result<Option<CredentialEntry>> {
        self.read(key)
    }

    async fn update_credential(&self, update: CredentialUpdate) -> Result<bool> {
        let Some(mut entry) = self.read(&update.key)? else {
            return Ok(false);
        };
        if let Some(value) = update.value {
            entry.value = value;
        }
        if let Some(url) = update.url {
            entry.url = url;
        }
        entry.timestamp = chrono::Utc::now().timestamp_millis();
        self.write(&entry)?;
        Ok(true)
    }

    async fn delete_credential(&self, key: &str) -> Result<bool> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(anyhow!("Failed to delete keychain entry for {}: {}", key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KeyringCredentialStore {
        KeyringCredentialStore::new(format!("recorder-sidecar-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    #[ignore = "requires an OS keychain"]
    async fn test_store_then_get_round_trip() {
        let store = store();
        store.check_available().unwrap();

        let entry = CredentialEntry::new(
            "app.example.com:password:pw",
            "secret123",
            CredentialType::Password,
            "https://app.example.com/login",
        );
        store.store_credential(entry).await.unwrap();

        let read = store.get_credential("app.example.com:password:pw").await.unwrap();
        assert_eq!(read.map(|e| e.value).as_deref(), Some("secret123"));
        assert!(store.delete_credential("app.example.com:password:pw").await.unwrap());
        assert!(store.get_credential("app.example.com:password:pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_available_keychain_returns_what_it_stores() {
        let store = store();
        // Either the check fails, or a stored secret can be read back
        if store.check_available().is_err() {
            return;
        }
        let entry = CredentialEntry::new("a.example:username:user", "me", CredentialType::Username, "");
        store.store_credential(entry).await.unwrap();
        let read = store.get_credential("a.example:username:user").await.unwrap();
        assert_eq!(read.map(|e| e.value).as_deref(), Some("me"));
        store.delete_credential("a.example:username:user").await.unwrap();
    }
}

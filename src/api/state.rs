use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};

use crate::config::{Config, CredentialBackend};
use crate::credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
use crate::models::SessionEvent;
use crate::recording::{ActionLog, BrowserRecorder, RecordingPipeline};

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state
pub struct AppState {
    pub config: Config,

    pub recorder: BrowserRecorder,

    pub credentials: Arc<dyn CredentialStore>,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    /// Total connection count (for metrics)
    connection_count: AtomicUsize,

    /// Serializes start/stop so two requests never launch two browsers
    pub recording_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let credentials = credential_store(&config);
        Self::with_store(config, credentials)
    }

    pub fn with_store(config: Config, credentials: Arc<dyn CredentialStore>) -> Self {
        tracing::info!("Using {} credential store", credentials.name());
        let pipeline = RecordingPipeline::new(ActionLog::new(), Arc::clone(&credentials), config.pipeline());

        Self {
            recorder: BrowserRecorder::new(Arc::new(pipeline)),
            credentials,
            config,
            connected_clients: DashMap::new(),
            connection_count: AtomicUsize::new(0),
            recording_lock: Mutex::new(()),
        }
    }

    pub fn pipeline(&self) -> &Arc<RecordingPipeline> {
        self.recorder.pipeline()
    }

    pub fn log(&self) -> &ActionLog {
        self.pipeline().log()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.log().subscribe()
    }

    /// Register a WebSocket client connection
    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        let count = self.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Client {} connected (total: {}, active: {})",
            client_id,
            count,
            self.connected_clients.len()
        );
    }

    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                client.connected_at.elapsed(),
                self.connected_clients.len()
            );
        }
    }

    pub fn active_connection_count(&self) -> usize {
        self.connected_clients.len()
    }
}

/// Pick the configured store. A keychain that cannot hand back what it was
/// given would drop every secret, so it is replaced by the memory store.
fn credential_store(config: &Config) -> Arc<dyn CredentialStore> {
    match config.credential_backend {
        CredentialBackend::Keyring => {
            let store = KeyringCredentialStore::new(&config.keyring_service);
            match store.check_available() {
                Ok(()) => Arc::new(store),
                Err(e) => {
                    tracing::error!(
                        "OS keychain unavailable ({}); falling back to the in-memory credential store. \
                         Recorded secrets will not outlive this process",
                        e
                    );
                    Arc::new(MemoryCredentialStore::new())
                }
            }
        }
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

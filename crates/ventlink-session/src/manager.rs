use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use ventlink_transport::Transport;

use crate::config::SessionConfig;
use crate::session::Session;

/// Owns at most one session per device address.
///
/// Hand the manager (or the `Arc<Session>` it returns) to whatever needs a
/// session; there is no process-wide registry.
pub struct SessionManager<T: Transport> {
    config: SessionConfig,
    sessions: Mutex<BTreeMap<String, Arc<Session<T>>>>,
}

impl<T: Transport> SessionManager<T> {
    /// `config` is used for sessions opened with [`SessionManager::open`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Session<T>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session for the transport's address, created with the default config.
    pub fn open(&self, transport: T) -> Arc<Session<T>> {
        let config = self.config.clone();
        self.open_with(transport, config)
    }

    /// Session for the transport's address.
    ///
    /// An existing live session wins and `transport` is dropped unused. A
    /// stopped session under the same address is replaced.
    pub fn open_with(&self, transport: T, config: SessionConfig) -> Arc<Session<T>> {
        let address = transport.address().to_string();
        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(&address) {
            if !existing.is_stopped() {
                debug!(address = %address, "reusing session");
                return Arc::clone(existing);
            }
        }

        info!(address = %address, "opening session");
        let session = Arc::new(Session::new(transport, config));
        sessions.insert(address, Arc::clone(&session));
        session
    }

    pub fn get(&self, address: &str) -> Option<Arc<Session<T>>> {
        self.sessions().get(address).cloned()
    }

    /// Managed addresses in sorted order.
    pub fn addresses(&self) -> Vec<String> {
        self.sessions().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Stop and forget one session. Returns whether it was managed.
    pub async fn remove(&self, address: &str) -> bool {
        let session = self.sessions().remove(address);
        match session {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = std::mem::take(&mut *self.sessions()).into_values().collect();
        for session in sessions {
            session.stop().await;
        }
    }
}

//! Transport Session Manager — C9. Per-session streaming transports backed
//! by an isolated [`ToolRegistry`] instance, idle expiry, and orderly
//! teardown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;
use vaultgate_core::tool::ToolRegistry;
use vaultgate_vcs::DebouncedCommitCoordinator;

use crate::tools::{BacklinksTool, GrepTool, ReadTool, TagsTool, WriteTool};

pub const SESSION_HEADER: &str = "Mcp-Session-Id";
const IDLE_TTL: Duration = Duration::from_secs(30 * 60);

pub struct TransportSession {
    pub id: String,
    pub tools: ToolRegistry,
    last_activity: Mutex<Instant>,
}

impl TransportSession {
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn is_idle(&self) -> bool {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            > IDLE_TTL
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session capacity reached")]
    CapacityReached,

    #[error("unknown or expired session")]
    NotFound,
}

/// Singleton. Constructed once at startup with the vault root and the
/// shared commit coordinator every session's write tool schedules against.
pub struct TransportSessionManager {
    sessions: Mutex<HashMap<String, Arc<TransportSession>>>,
    max_sessions: usize,
    vault_root: PathBuf,
    coordinator: Arc<DebouncedCommitCoordinator>,
}

impl TransportSessionManager {
    pub fn new(vault_root: PathBuf, coordinator: Arc<DebouncedCommitCoordinator>, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            vault_root,
            coordinator,
        }
    }

    /// Instantiate an isolated tool handler and a fresh session id.
    pub fn create(&self) -> Result<Arc<TransportSession>, SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityReached);
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ReadTool::new(self.vault_root.clone())));
        registry.register(Box::new(WriteTool::new(self.vault_root.clone(), self.coordinator.clone())));
        registry.register(Box::new(GrepTool::new(self.vault_root.clone())));
        registry.register(Box::new(TagsTool::new(self.vault_root.clone())));
        registry.register(Box::new(BacklinksTool::new(self.vault_root.clone())));

        let id = random_session_id();
        let session = Arc::new(TransportSession {
            id: id.clone(),
            tools: registry,
            last_activity: Mutex::new(Instant::now()),
        });
        sessions.insert(id, session.clone());
        tracing::info!(session_id = %session.id, "session created");
        vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::SessionCreated {
            session_id: &session.id,
        });
        Ok(session)
    }

    /// Last-writer-wins on `lastActivity`: the returned session is touched
    /// here, not by the caller, so an acceptor can never race the sweeper's
    /// deletion for the same id (the sweeper holds the same lock to remove).
    pub fn get(&self, session_id: &str) -> Option<Arc<TransportSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get(session_id)?.clone();
        session.touch();
        Some(session)
    }

    pub fn terminate(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let removed = sessions.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "session terminated");
            vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::SessionTerminated {
                session_id,
            });
        }
        removed
    }

    /// Called every minute by the sweeper: closes idle transports.
    pub fn sweep_idle(&self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.is_idle())
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "session expired (idle)");
            vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::SessionExpired {
                session_id: &id,
            });
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

fn random_session_id() -> String {
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

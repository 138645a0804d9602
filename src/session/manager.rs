//! Session lookup and lifecycle.

use super::{SessionActor, SessionDefaults, SessionHandle};
use crate::llm::InferenceClient;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maps session identifiers to their running actors.
///
/// Unknown identifiers create a session on demand; callers mint their own
/// ids, the server never 404s a conversation.
pub struct SessionManager {
    client: Arc<dyn InferenceClient>,
    defaults: SessionDefaults,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

/// Per-session digest for the sessions listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub model: String,
    pub message_count: usize,
    pub is_processing: bool,
}

impl SessionManager {
    pub fn new(client: Arc<dyn InferenceClient>, defaults: SessionDefaults) -> Self {
        Self {
            client,
            defaults,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for the session, starting its actor if needed.
    pub async fn handle(&self, session_id: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                if !handle.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        // Double-checked: another caller may have won the write race.
        if let Some(handle) = sessions.get(session_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        tracing::info!(session_id = %session_id, "starting session");
        let handle = SessionActor::spawn(session_id, Arc::clone(&self.client), &self.defaults);
        sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Digest of every live session.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(state) = handle.state().await {
                summaries.push(SessionSummary {
                    session_id: state.session_id,
                    model: state.model,
                    message_count: state.messages.len(),
                    is_processing: state.is_processing,
                });
            }
        }
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }
}

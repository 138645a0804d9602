//! HTTP API.

mod handlers;
mod stream;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::llm::InferenceClient;
use crate::session::{SessionDefaults, SessionManager};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(client: Arc<dyn InferenceClient>, defaults: SessionDefaults) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(client, defaults)),
        }
    }
}

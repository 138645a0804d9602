//! LLM backend integration
//!
//! Two seams live here. `ChatBackend` is the wire-level adapter implemented
//! by the gateway client; `InferenceClient` is what the session actor
//! consumes, implemented by `InferenceEngine` (which adds the tool loop).

mod engine;
mod error;
mod gateway;
mod models;
mod sse;
pub mod testing;

pub use engine::InferenceEngine;
pub use error::EngineError;
pub use gateway::{GatewayClient, GatewayConfig};
pub use models::{catalog, ModelDef, DEFAULT_MODEL};

use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;

/// Callback invoked with each generated text fragment, in order, strictly
/// before the call resolves.
pub type FragmentFn = Box<dyn Fn(String) + Send + Sync>;

// ============================================================
// Wire-level types
// ============================================================

/// Message role on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One piece of a chat message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// The model asked for a capability to be invoked
    ToolRequest {
        id: String,
        name: String,
        arguments: Value,
    },
    /// Result of a capability invocation, fed back to the model
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

/// Message in a backend conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }
}

/// Request handed to a `ChatBackend`
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Normalized backend reply
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub parts: Vec<ContentPart>,
    pub usage: TokenUsage,
}

impl BackendReply {
    /// Generated text, with tool metadata stripped
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Capability invocations requested by this reply
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolRequest {
                    id,
                    name,
                    arguments,
                } => Some(ToolRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// A capability invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Wire-level model adapter
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Block until the model produces a complete reply.
    async fn complete(&self, request: &BackendRequest) -> Result<BackendReply, EngineError>;

    /// Stream the reply, invoking `on_fragment` with each non-empty text
    /// chunk. The concatenation of all chunks equals the reply's text.
    async fn complete_streaming(
        &self,
        request: &BackendRequest,
        on_fragment: FragmentFn,
    ) -> Result<BackendReply, EngineError>;
}

// ============================================================
// Actor-facing types
// ============================================================

/// One prior conversation turn, as replayed to the backend
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Everything the inference layer needs for one exchange
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<HistoryMessage>,
    pub enabled_tools: Vec<String>,
}

/// Completed exchange: final text plus any capability invocations made
/// along the way
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<crate::tools::ToolCall>,
    pub usage: TokenUsage,
}

/// What the session actor drives. Stateless; history travels in the request.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<Completion, EngineError>;

    async fn complete_streaming(
        &self,
        request: &InferenceRequest,
        on_fragment: FragmentFn,
    ) -> Result<Completion, EngineError>;
}

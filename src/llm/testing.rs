//! Scripted mock implementations of the inference seams.
//!
//! Used by the actor, engine and router tests; no real I/O. Kept out of
//! `#[cfg(test)]` so integration tests can drive the full router with a
//! scripted backend.

use super::{
    BackendReply, BackendRequest, ChatBackend, Completion, EngineError, FragmentFn,
    InferenceClient, InferenceRequest, TokenUsage,
};
use crate::tools::{ToolCall, ToolDefinition, ToolResult, ToolRuntime};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================
// Mock inference client (actor seam)
// ============================================================

/// One scripted exchange
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    /// Fragments emitted before resolving, streaming mode only
    pub fragments: Vec<String>,
    pub result: Result<Completion, EngineError>,
}

impl ScriptedReply {
    /// Successful reply; streams as a single fragment.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            fragments: vec![content.clone()],
            result: Ok(Completion {
                content,
                tool_calls: Vec::new(),
                usage: TokenUsage::default(),
            }),
        }
    }

    /// Successful reply streamed as the given fragments; the final content
    /// is their concatenation.
    pub fn streamed<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        Self {
            result: Ok(Completion {
                content: fragments.concat(),
                tool_calls: Vec::new(),
                usage: TokenUsage::default(),
            }),
            fragments,
        }
    }

    /// Failure after emitting the given fragments.
    pub fn fail_after<I, S>(fragments: I, error: EngineError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            result: Err(error),
        }
    }

    /// Immediate failure.
    pub fn fail(error: EngineError) -> Self {
        Self::fail_after(Vec::<String>::new(), error)
    }

    /// Attach tool calls to a successful reply.
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        if let Ok(completion) = &mut self.result {
            completion.tool_calls = tool_calls;
        }
        self
    }
}

/// Mock `InferenceClient` that plays back queued replies
pub struct MockInferenceClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<InferenceRequest>>,
    /// Notified when a call begins (for test synchronization)
    pub started: Arc<Notify>,
    gate: Option<Arc<Notify>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            started: Arc::new(Notify::new()),
            gate: None,
        }
    }

    /// Calls block until the returned handle is notified, so tests can
    /// observe the in-flight state deterministically.
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut mock = Self::new();
        mock.gate = Some(gate.clone());
        (mock, gate)
    }

    pub fn queue(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn recorded_requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn next_reply(&self, request: &InferenceRequest) -> ScriptedReply {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_waiters();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            ScriptedReply::fail(EngineError::unavailable("no scripted reply queued"))
        })
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<Completion, EngineError> {
        self.next_reply(request).await.result
    }

    async fn complete_streaming(
        &self,
        request: &InferenceRequest,
        on_fragment: FragmentFn,
    ) -> Result<Completion, EngineError> {
        let reply = self.next_reply(request).await;
        for fragment in reply.fragments {
            on_fragment(fragment);
        }
        reply.result
    }
}

// ============================================================
// Mock chat backend (engine seam)
// ============================================================

/// Mock `ChatBackend` that plays back queued wire replies
pub struct MockChatBackend {
    replies: Mutex<VecDeque<Result<BackendReply, EngineError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<BackendRequest>>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, reply: Result<BackendReply, EngineError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn recorded_requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &BackendRequest) -> Result<BackendReply, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::unavailable("no scripted reply queued")))
    }
}

impl Default for MockChatBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(&self, request: &BackendRequest) -> Result<BackendReply, EngineError> {
        self.next(request)
    }

    async fn complete_streaming(
        &self,
        request: &BackendRequest,
        on_fragment: FragmentFn,
    ) -> Result<BackendReply, EngineError> {
        let reply = self.next(request)?;
        for part in &reply.parts {
            if let super::ContentPart::Text { text } = part {
                on_fragment(text.clone());
            }
        }
        Ok(reply)
    }
}

// ============================================================
// Mock tool runtime
// ============================================================

/// Mock `ToolRuntime` with predefined results
pub struct MockToolRuntime {
    results: HashMap<String, ToolResult>,
    /// Record of invocations
    pub invocations: Mutex<Vec<(String, Value)>>,
}

impl MockToolRuntime {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(mut self, name: impl Into<String>, result: ToolResult) -> Self {
        self.results.insert(name.into(), result);
        self
    }
}

impl Default for MockToolRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRuntime for MockToolRuntime {
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition> {
        enabled
            .iter()
            .filter(|name| self.results.contains_key(*name))
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Mock {name}"),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            })
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        self.results
            .get(name)
            .cloned()
            .unwrap_or_else(|| ToolResult::error(format!("unknown capability: {name}")))
    }
}

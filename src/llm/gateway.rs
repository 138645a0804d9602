//! Chat-completions client for the AI gateway.
//!
//! The gateway speaks the OpenAI chat-completions dialect and routes to the
//! provider named by the model id (for example
//! `google-ai-studio/gemini-2.5-flash`). This client is stateless; the
//! model id travels in every request.

use super::sse::read_sse_stream;
use super::{
    BackendReply, BackendRequest, ChatBackend, ChatMessage, ChatRole, ContentPart, EngineError,
    FragmentFn, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway connection settings
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Base URL of the gateway's OpenAI-compatible endpoint
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Default model id override
    pub default_model: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AI_GATEWAY_URL").ok(),
            api_key: std::env::var("AI_GATEWAY_API_KEY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// OpenAI-compatible gateway client
pub struct GatewayClient {
    http: Client,
    endpoint: Option<String>,
    api_key: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");

        let endpoint = config
            .base_url
            .as_ref()
            .map(|base| format!("{}/chat/completions", base.trim_end_matches('/')));

        Self {
            http,
            endpoint,
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }

    fn endpoint(&self) -> Result<&str, EngineError> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| EngineError::unavailable("AI_GATEWAY_URL is not configured"))
    }

    async fn post(
        &self,
        request: &BackendRequest,
        stream: bool,
    ) -> Result<reqwest::Response, EngineError> {
        let body = translate_request(request, stream);

        let response = self
            .http
            .post(self.endpoint()?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::unavailable(format!("request timed out: {e}"))
                } else {
                    EngineError::unavailable(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(400).collect();
            return Err(EngineError::rejected(format!("HTTP {status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for GatewayClient {
    async fn complete(&self, request: &BackendRequest) -> Result<BackendReply, EngineError> {
        let response = self.post(request, false).await?;

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::unavailable(format!("failed to read response: {e}")))?;
        let parsed: WireResponse = serde_json::from_str(&body)
            .map_err(|e| EngineError::rejected(format!("unparseable response: {e}")))?;

        normalize_response(parsed)
    }

    async fn complete_streaming(
        &self,
        request: &BackendRequest,
        on_fragment: FragmentFn,
    ) -> Result<BackendReply, EngineError> {
        let response = self.post(request, true).await?;

        let mut acc = StreamAccumulator::default();
        read_sse_stream(response, |event| {
            acc.push(&event.data, &on_fragment);
        })
        .await?;

        Ok(acc.finish())
    }
}

// ============================================================
// Request translation
// ============================================================

fn translate_request(request: &BackendRequest, stream: bool) -> WireRequest {
    let mut messages = Vec::new();

    if !request.system_prompt.is_empty() {
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(request.system_prompt.clone()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in &request.messages {
        messages.extend(translate_message(msg));
    }

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function".to_string(),
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        )
    };

    WireRequest {
        model: request.model.clone(),
        messages,
        tools,
        stream,
    }
}

/// Returns a Vec because tool results become separate `tool`-role messages.
fn translate_message(msg: &ChatMessage) -> Vec<WireMessage> {
    let role = match msg.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for part in &msg.parts {
        match part {
            ContentPart::Text { text } => text_parts.push(text.clone()),
            ContentPart::ToolRequest {
                id,
                name,
                arguments,
            } => tool_calls.push(WireToolCall {
                id: id.clone(),
                r#type: "function".to_string(),
                function: WireFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(arguments)
                        .unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            ContentPart::ToolResult {
                call_id,
                content,
                is_error,
            } => tool_results.push((call_id.clone(), content.clone(), *is_error)),
        }
    }

    let mut messages = Vec::new();

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        messages.push(WireMessage {
            role: role.to_string(),
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        });
    }

    for (call_id, content, is_error) in tool_results {
        messages.push(WireMessage {
            role: "tool".to_string(),
            content: Some(if is_error {
                format!("Error: {content}")
            } else {
                content
            }),
            tool_calls: None,
            tool_call_id: Some(call_id),
        });
    }

    if messages.is_empty() {
        messages.push(WireMessage {
            role: role.to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    messages
}

// ============================================================
// Response normalization
// ============================================================

fn normalize_response(resp: WireResponse) -> Result<BackendReply, EngineError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::rejected("no choices in response"))?;

    let mut parts = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            parts.push(ContentPart::Text { text });
        }
    }

    for tc in choice.message.tool_calls.unwrap_or_default() {
        if tc.function.name.is_empty() {
            continue;
        }
        let arguments = serde_json::from_str(&tc.function.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));
        parts.push(ContentPart::ToolRequest {
            id: tc.id,
            name: tc.function.name,
            arguments,
        });
    }

    Ok(BackendReply {
        parts,
        usage: resp.usage.map(TokenUsage::from).unwrap_or_default(),
    })
}

// ============================================================
// Streaming assembly
// ============================================================

/// Folds streamed chunks into a final reply. Text deltas are forwarded to
/// the fragment callback as they arrive; tool-call deltas are assembled by
/// index until the stream ends.
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    tool_builders: Vec<ToolCallBuilder>,
    usage: TokenUsage,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    fn push(&mut self, data: &str, on_fragment: &FragmentFn) {
        if data == "[DONE]" {
            return;
        }
        // Providers interleave keepalives and vendor extras; skip anything
        // that is not a chunk.
        let Ok(chunk) = serde_json::from_str::<WireChunk>(data) else {
            return;
        };

        if let Some(usage) = chunk.usage {
            self.usage = usage.into();
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                self.text.push_str(&text);
                on_fragment(text);
            }
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            while self.tool_builders.len() <= delta.index {
                self.tool_builders.push(ToolCallBuilder::default());
            }
            let builder = &mut self.tool_builders[delta.index];
            if let Some(id) = delta.id {
                builder.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    builder.name = name;
                }
                if let Some(arguments) = function.arguments {
                    builder.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn finish(self) -> BackendReply {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(ContentPart::Text { text: self.text });
        }
        for builder in self.tool_builders {
            if builder.name.is_empty() {
                continue;
            }
            let arguments = serde_json::from_str(&builder.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            parts.push(ContentPart::ToolRequest {
                id: builder.id,
                name: builder.name,
                arguments,
            });
        }
        BackendReply {
            parts,
            usage: self.usage,
        }
    }
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

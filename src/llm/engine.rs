//! Inference driver: backend exchange plus the capability loop.

use super::{
    BackendReply, BackendRequest, ChatBackend, ChatMessage, ChatRole, Completion, ContentPart,
    EngineError, FragmentFn, InferenceClient, InferenceRequest, TokenUsage,
};
use crate::tools::{ToolCall, ToolRuntime};
use async_trait::async_trait;
use std::sync::Arc;

/// Upper bound on model-requests-tools-model round trips in one exchange.
/// When reached, whatever text has been produced is returned as-is.
const MAX_TOOL_ROUNDS: u32 = 4;

/// Stateless driver behind the actor's `InferenceClient` seam.
///
/// Runs the backend call, and when the model requests capabilities, invokes
/// them through the tool runtime, feeds the typed results back, and
/// re-prompts until the model answers with plain text.
pub struct InferenceEngine {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<dyn ToolRuntime>,
}

impl InferenceEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, tools: Arc<dyn ToolRuntime>) -> Self {
        Self { backend, tools }
    }

    async fn run(
        &self,
        request: &InferenceRequest,
        on_fragment: Option<Arc<FragmentFn>>,
    ) -> Result<Completion, EngineError> {
        let tools = self.tools.definitions(&request.enabled_tools);

        let mut messages: Vec<ChatMessage> = request
            .history
            .iter()
            .map(|m| ChatMessage::text(m.role, m.content.clone()))
            .collect();

        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = TokenUsage::default();

        for round in 0..=MAX_TOOL_ROUNDS {
            let backend_request = BackendRequest {
                model: request.model.clone(),
                system_prompt: request.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
            };

            let reply = self.exchange(&backend_request, on_fragment.as_ref()).await?;
            usage.add(reply.usage);
            content.push_str(&reply.text());

            let requests = reply.tool_requests();
            if requests.is_empty() {
                break;
            }
            if round == MAX_TOOL_ROUNDS {
                tracing::warn!(
                    rounds = MAX_TOOL_ROUNDS,
                    "capability round limit reached, returning partial reply"
                );
                break;
            }

            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                parts: reply.parts.clone(),
            });

            let mut result_parts = Vec::new();
            for req in requests {
                let result = self.tools.invoke(&req.name, req.arguments.clone()).await;
                tracing::debug!(tool = %req.name, error = result.is_error(), "capability invoked");

                result_parts.push(ContentPart::ToolResult {
                    call_id: req.id.clone(),
                    content: serde_json::to_string(&result)
                        .unwrap_or_else(|_| "{}".to_string()),
                    is_error: result.is_error(),
                });
                tool_calls.push(ToolCall {
                    id: req.id,
                    name: req.name,
                    arguments: req.arguments,
                    result,
                });
            }
            messages.push(ChatMessage {
                role: ChatRole::User,
                parts: result_parts,
            });
        }

        Ok(Completion {
            content,
            tool_calls,
            usage,
        })
    }

    async fn exchange(
        &self,
        request: &BackendRequest,
        on_fragment: Option<&Arc<FragmentFn>>,
    ) -> Result<BackendReply, EngineError> {
        match on_fragment {
            Some(callback) => {
                let callback = Arc::clone(callback);
                self.backend
                    .complete_streaming(request, Box::new(move |fragment| (*callback)(fragment)))
                    .await
            }
            None => self.backend.complete(request).await,
        }
    }
}

#[async_trait]
impl InferenceClient for InferenceEngine {
    async fn complete(&self, request: &InferenceRequest) -> Result<Completion, EngineError> {
        self.run(request, None).await
    }

    async fn complete_streaming(
        &self,
        request: &InferenceRequest,
        on_fragment: FragmentFn,
    ) -> Result<Completion, EngineError> {
        self.run(request, Some(Arc::new(on_fragment))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{MockChatBackend, MockToolRuntime};
    use crate::llm::HistoryMessage;
    use crate::tools::{ToolOutcome, ToolResult};
    use serde_json::json;

    fn request() -> InferenceRequest {
        InferenceRequest {
            model: "google-ai-studio/gemini-2.5-flash".to_string(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
            history: vec![HistoryMessage {
                role: ChatRole::User,
                content: "what's the weather in Rome?".to_string(),
            }],
            enabled_tools: vec!["get_weather".to_string()],
        }
    }

    fn tool_reply() -> BackendReply {
        BackendReply {
            parts: vec![ContentPart::ToolRequest {
                id: "call-1".into(),
                name: "get_weather".into(),
                arguments: json!({"location": "Rome"}),
            }],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
            },
        }
    }

    fn text_reply(text: &str) -> BackendReply {
        BackendReply {
            parts: vec![ContentPart::Text { text: text.into() }],
            usage: TokenUsage {
                input_tokens: 20,
                output_tokens: 5,
            },
        }
    }

    #[tokio::test]
    async fn plain_exchange_returns_text() {
        let backend = Arc::new(MockChatBackend::new());
        backend.queue(Ok(text_reply("Sunny.")));
        let engine = InferenceEngine::new(backend, Arc::new(MockToolRuntime::new()));

        let completion = engine.complete(&request()).await.unwrap();
        assert_eq!(completion.content, "Sunny.");
        assert!(completion.tool_calls.is_empty());
        assert_eq!(completion.usage.total_tokens(), 25);
    }

    #[tokio::test]
    async fn capability_round_feeds_result_back() {
        let backend = Arc::new(MockChatBackend::new());
        backend.queue(Ok(tool_reply()));
        backend.queue(Ok(text_reply("It is 18C in Rome.")));

        let tools = Arc::new(MockToolRuntime::new().with_result(
            "get_weather",
            ToolResult::Success(ToolOutcome::Generic {
                data: json!({"temperature_c": 18.0}),
            }),
        ));
        let engine = InferenceEngine::new(backend.clone(), tools.clone());

        let completion = engine.complete(&request()).await.unwrap();
        assert_eq!(completion.content, "It is 18C in Rome.");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "get_weather");
        assert!(!completion.tool_calls[0].result.is_error());
        // usage accumulates across both rounds
        assert_eq!(completion.usage.total_tokens(), 37);

        // the second backend request must contain the tool result message
        let recorded = backend.recorded_requests();
        assert_eq!(recorded.len(), 2);
        let last = recorded[1].messages.last().unwrap().clone();
        assert!(matches!(last.parts[0], ContentPart::ToolResult { .. }));
    }

    #[tokio::test]
    async fn failed_capability_is_surfaced_not_fatal() {
        let backend = Arc::new(MockChatBackend::new());
        backend.queue(Ok(tool_reply()));
        backend.queue(Ok(text_reply("I could not check the weather.")));

        // runtime knows no tools, so the invocation errors
        let engine = InferenceEngine::new(backend, Arc::new(MockToolRuntime::new()));

        let completion = engine.complete(&request()).await.unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert!(completion.tool_calls[0].result.is_error());
        assert_eq!(completion.content, "I could not check the weather.");
    }

    #[tokio::test]
    async fn round_limit_stops_the_loop() {
        let backend = Arc::new(MockChatBackend::new());
        for _ in 0..=MAX_TOOL_ROUNDS {
            backend.queue(Ok(tool_reply()));
        }
        let tools = Arc::new(MockToolRuntime::new().with_result(
            "get_weather",
            ToolResult::Success(ToolOutcome::Generic { data: json!({}) }),
        ));
        let engine = InferenceEngine::new(backend.clone(), tools);

        let completion = engine.complete(&request()).await.unwrap();
        // the final round's requests are not invoked
        assert_eq!(completion.tool_calls.len() as u32, MAX_TOOL_ROUNDS);
        assert_eq!(backend.recorded_requests().len() as u32, MAX_TOOL_ROUNDS + 1);
    }

    #[tokio::test]
    async fn backend_error_propagates() {
        let backend = Arc::new(MockChatBackend::new());
        backend.queue(Err(EngineError::unavailable("connection refused")));
        let engine = InferenceEngine::new(backend, Arc::new(MockToolRuntime::new()));

        let err = engine.complete(&request()).await.unwrap_err();
        assert!(matches!(err, EngineError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn streaming_forwards_fragments_across_rounds() {
        use std::sync::Mutex;

        let backend = Arc::new(MockChatBackend::new());
        backend.queue(Ok(tool_reply()));
        backend.queue(Ok(text_reply("All done.")));
        let tools = Arc::new(MockToolRuntime::new().with_result(
            "get_weather",
            ToolResult::Success(ToolOutcome::Generic { data: json!({}) }),
        ));
        let engine = InferenceEngine::new(backend, tools);

        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let completion = engine
            .complete_streaming(
                &request(),
                Box::new(move |f| sink.lock().unwrap().push_str(&f)),
            )
            .await
            .unwrap();

        assert_eq!(completion.content, "All done.");
        assert_eq!(*seen.lock().unwrap(), "All done.");
    }
}

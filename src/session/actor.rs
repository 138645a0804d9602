//! The session actor.
//!
//! One tokio task owns each session's state. Callers and the in-flight
//! inference task talk to it through a single channel, so every state
//! transition is serialized: a reader can never observe a half-applied
//! mutation, and fragment arrivals interleave with reads at event
//! granularity. The backend call itself runs in a spawned task that holds
//! no reference into actor state; its terminal event always comes back
//! through the same channel, success or failure, so a failed call can
//! never leave the session stuck busy.

use super::{Role, SessionDefaults, SessionError, SessionState};
use crate::llm::{
    ChatRole, Completion, EngineError, HistoryMessage, InferenceClient, InferenceRequest,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Reply = oneshot::Sender<Result<SessionState, SessionError>>;
type StreamReply = oneshot::Sender<Result<mpsc::UnboundedReceiver<String>, SessionError>>;

/// Caller-issued operations
enum Command {
    Chat {
        text: String,
        model_override: Option<String>,
        mode: ChatMode,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    SetModel {
        model: String,
        reply: Reply,
    },
    SetSystemPrompt {
        prompt: String,
        reply: Reply,
    },
    SetTools {
        tools: Vec<String>,
        reply: Reply,
    },
    Clear {
        reply: Reply,
    },
}

enum ChatMode {
    Buffered { reply: Reply },
    Streaming { reply: StreamReply },
}

/// Events reported by the in-flight inference task
enum InferenceEvent {
    Fragment(String),
    Finished(Completion),
    Failed(EngineError),
}

enum ActorMsg {
    Command(Command),
    Inference(InferenceEvent),
}

/// Where the in-flight call's outcome goes
enum Waiter {
    /// Buffered caller, resolved at completion
    Buffered(Reply),
    /// Live fragment channel; dropping it closes the caller's stream
    Streaming(mpsc::UnboundedSender<String>),
}

/// Cheap, cloneable address of a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<ActorMsg>,
}

impl SessionHandle {
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn chat_buffered(
        &self,
        text: impl Into<String>,
        model_override: Option<String>,
    ) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Chat {
            text: text.into(),
            model_override,
            mode: ChatMode::Buffered { reply },
        })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn chat_streaming(
        &self,
        text: impl Into<String>,
        model_override: Option<String>,
    ) -> Result<mpsc::UnboundedReceiver<String>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Chat {
            text: text.into(),
            model_override,
            mode: ChatMode::Streaming { reply },
        })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State { reply })?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn update_model(
        &self,
        model: impl Into<String>,
    ) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetModel {
            model: model.into(),
            reply,
        })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn update_system_prompt(
        &self,
        prompt: impl Into<String>,
    ) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetSystemPrompt {
            prompt: prompt.into(),
            reply,
        })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn update_tools(&self, tools: Vec<String>) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetTools { tools, reply })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn clear(&self) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Clear { reply })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.tx
            .send(ActorMsg::Command(command))
            .map_err(|_| SessionError::Closed)
    }
}

/// Owns one session's state and serializes everything that touches it
pub struct SessionActor {
    state: SessionState,
    client: Arc<dyn InferenceClient>,
    rx: mpsc::UnboundedReceiver<ActorMsg>,
    /// Cloned into inference tasks so their events land in the same queue
    tx: mpsc::UnboundedSender<ActorMsg>,
    in_flight: Option<Waiter>,
}

impl SessionActor {
    /// Start the actor task and return its handle.
    pub fn spawn(
        session_id: impl Into<String>,
        client: Arc<dyn InferenceClient>,
        defaults: &SessionDefaults,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            state: SessionState::new(session_id, defaults),
            client,
            rx,
            tx: tx.clone(),
            in_flight: None,
        };
        tokio::spawn(actor.run());
        SessionHandle { tx }
    }

    async fn run(mut self) {
        tracing::debug!(session_id = %self.state.session_id, "session actor started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ActorMsg::Command(command) => self.handle_command(command),
                ActorMsg::Inference(event) => self.handle_inference_event(event),
            }
        }
        tracing::debug!(session_id = %self.state.session_id, "session actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Chat {
                text,
                model_override,
                mode,
            } => self.handle_chat(text, model_override, mode),
            Command::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::SetModel { model, reply } => {
                let _ = reply.send(self.set_model(model));
            }
            Command::SetSystemPrompt { prompt, reply } => {
                let _ = reply.send(self.set_system_prompt(prompt));
            }
            Command::SetTools { tools, reply } => {
                let _ = reply.send(self.set_tools(tools));
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.clear());
            }
        }
    }

    fn handle_chat(&mut self, text: String, model_override: Option<String>, mode: ChatMode) {
        let text = text.trim().to_string();
        if text.is_empty() {
            Self::refuse(mode, SessionError::EmptyInput);
            return;
        }
        if self.state.is_processing {
            Self::refuse(mode, SessionError::Busy);
            return;
        }

        if let Some(model) = model_override {
            if model != self.state.model {
                tracing::debug!(session_id = %self.state.session_id, model = %model, "model override");
                self.state.model = model;
            }
        }

        self.state.push_turn(Role::User, text, Vec::new());
        self.state.is_processing = true;
        self.state.streaming_message.clear();

        let request = self.build_request();
        let events = self.tx.clone();

        match mode {
            ChatMode::Buffered { reply } => {
                self.in_flight = Some(Waiter::Buffered(reply));
                let client = Arc::clone(&self.client);
                tokio::spawn(async move {
                    let event = match client.complete(&request).await {
                        Ok(completion) => InferenceEvent::Finished(completion),
                        Err(e) => InferenceEvent::Failed(e),
                    };
                    let _ = events.send(ActorMsg::Inference(event));
                });
            }
            ChatMode::Streaming { reply } => {
                let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();
                // The caller may already be gone; the exchange proceeds and
                // the turn is still appended.
                let _ = reply.send(Ok(fragment_rx));
                self.in_flight = Some(Waiter::Streaming(fragment_tx));

                let client = Arc::clone(&self.client);
                let fragment_events = events.clone();
                tokio::spawn(async move {
                    let on_fragment = Box::new(move |fragment: String| {
                        let _ = fragment_events.send(ActorMsg::Inference(
                            InferenceEvent::Fragment(fragment),
                        ));
                    });
                    let event = match client.complete_streaming(&request, on_fragment).await {
                        Ok(completion) => InferenceEvent::Finished(completion),
                        Err(e) => InferenceEvent::Failed(e),
                    };
                    let _ = events.send(ActorMsg::Inference(event));
                });
            }
        }
    }

    fn handle_inference_event(&mut self, event: InferenceEvent) {
        match event {
            InferenceEvent::Fragment(fragment) => {
                if let Some(Waiter::Streaming(fragment_tx)) = &self.in_flight {
                    self.state.streaming_message.push_str(&fragment);
                    // A departed reader must not wedge the session.
                    let _ = fragment_tx.send(fragment);
                }
            }
            InferenceEvent::Finished(completion) => {
                let Some(waiter) = self.in_flight.take() else {
                    tracing::debug!(session_id = %self.state.session_id, "stale completion ignored");
                    return;
                };
                tracing::info!(
                    session_id = %self.state.session_id,
                    input_tokens = completion.usage.input_tokens,
                    output_tokens = completion.usage.output_tokens,
                    tool_calls = completion.tool_calls.len(),
                    "inference completed"
                );

                self.state
                    .push_turn(Role::Assistant, completion.content, completion.tool_calls);
                self.state.is_processing = false;
                self.state.streaming_message.clear();

                match waiter {
                    Waiter::Buffered(reply) => {
                        let _ = reply.send(Ok(self.state.clone()));
                    }
                    // Dropping the sender closes the caller's stream.
                    Waiter::Streaming(_fragment_tx) => {}
                }
            }
            InferenceEvent::Failed(error) => {
                let Some(waiter) = self.in_flight.take() else {
                    tracing::debug!(session_id = %self.state.session_id, "stale failure ignored");
                    return;
                };
                tracing::warn!(session_id = %self.state.session_id, error = %error, "inference failed");

                self.state.is_processing = false;
                let partial = std::mem::take(&mut self.state.streaming_message);

                match waiter {
                    Waiter::Buffered(reply) => {
                        let _ = reply.send(Err(error.into()));
                    }
                    Waiter::Streaming(fragment_tx) => {
                        let marker = format!("[stream interrupted: {error}]");
                        let content = if partial.is_empty() {
                            marker.clone()
                        } else {
                            format!("{partial}\n{marker}")
                        };
                        self.state.push_turn(Role::Assistant, content, Vec::new());
                        let _ = fragment_tx.send(marker);
                    }
                }
            }
        }
    }

    fn set_model(&mut self, model: String) -> Result<SessionState, SessionError> {
        if model.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "model must be a non-empty string".to_string(),
            ));
        }
        self.state.model = model;
        Ok(self.state.clone())
    }

    fn set_system_prompt(&mut self, prompt: String) -> Result<SessionState, SessionError> {
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "system prompt must be a non-empty string".to_string(),
            ));
        }
        self.state.system_prompt = prompt;
        Ok(self.state.clone())
    }

    fn set_tools(&mut self, tools: Vec<String>) -> Result<SessionState, SessionError> {
        if tools.iter().any(|t| t.trim().is_empty()) {
            return Err(SessionError::InvalidConfig(
                "tool identifiers must be non-empty strings".to_string(),
            ));
        }
        self.state.enabled_tools = tools.into_iter().collect();
        Ok(self.state.clone())
    }

    fn clear(&mut self) -> Result<SessionState, SessionError> {
        if self.state.is_processing {
            // A response is about to be appended; clearing now would race it.
            return Err(SessionError::Busy);
        }
        self.state.messages.clear();
        Ok(self.state.clone())
    }

    fn build_request(&self) -> InferenceRequest {
        InferenceRequest {
            model: self.state.model.clone(),
            system_prompt: self.state.system_prompt.clone(),
            history: self
                .state
                .messages
                .iter()
                .map(|turn| HistoryMessage {
                    role: match turn.role {
                        Role::User => ChatRole::User,
                        Role::Assistant => ChatRole::Assistant,
                    },
                    content: turn.content.clone(),
                })
                .collect(),
            enabled_tools: self.state.enabled_tools.iter().cloned().collect(),
        }
    }

    fn refuse(mode: ChatMode, error: SessionError) {
        match mode {
            ChatMode::Buffered { reply } => {
                let _ = reply.send(Err(error));
            }
            ChatMode::Streaming { reply } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{MockInferenceClient, ScriptedReply};
    use crate::tools::{ToolCall, ToolResult};
    use serde_json::json;

    fn spawn(client: Arc<MockInferenceClient>) -> SessionHandle {
        SessionActor::spawn("s1", client, &SessionDefaults::default())
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(fragment) = rx.recv().await {
            fragments.push(fragment);
        }
        fragments
    }

    #[tokio::test]
    async fn buffered_send_appends_user_and_assistant_turns() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::text("Hi there."));
        let handle = spawn(client.clone());

        let state = handle.chat_buffered("hello", None).await.unwrap();

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[0].content, "hello");
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.messages[1].content, "Hi there.");
        assert!(!state.is_processing);

        // the request carried the full history including the new user turn
        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].history.len(), 1);
        assert_eq!(requests[0].history[0].content, "hello");
    }

    #[tokio::test]
    async fn whitespace_only_message_is_refused() {
        let client = Arc::new(MockInferenceClient::new());
        let handle = spawn(client.clone());

        let err = handle.chat_buffered("   \n", None).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyInput));

        let state = handle.state().await.unwrap();
        assert!(state.messages.is_empty());
        assert!(client.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_busy() {
        let (client, gate) = MockInferenceClient::gated();
        let client = Arc::new(client);
        client.queue(ScriptedReply::text("done"));
        let handle = spawn(client.clone());

        let started = client.started.clone();
        let notified = started.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.chat_buffered("first", None).await })
        };
        notified.await;

        // busy is observable immediately, with no idle window
        let state = handle.state().await.unwrap();
        assert!(state.is_processing);

        let err = handle.chat_buffered("second", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));

        let err = handle.clear().await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));

        gate.notify_one();
        let state = first.await.unwrap().unwrap();
        assert!(!state.is_processing);
        // the rejected send appended nothing
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn configuration_updates_are_allowed_while_in_flight() {
        let (client, gate) = MockInferenceClient::gated();
        let client = Arc::new(client);
        client.queue(ScriptedReply::text("done"));
        let handle = spawn(client.clone());

        let started = client.started.clone();
        let notified = started.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.chat_buffered("first", None).await })
        };
        notified.await;

        let state = handle.update_model("google-ai-studio/gemini-1.5-pro").await.unwrap();
        assert!(state.is_processing);
        assert_eq!(state.model, "google-ai-studio/gemini-1.5-pro");
        handle.update_system_prompt("Answer tersely.").await.unwrap();
        handle.update_tools(vec!["web_search".to_string()]).await.unwrap();

        gate.notify_one();
        first.await.unwrap().unwrap();

        // the in-flight request kept the model it was accepted with
        assert_eq!(client.recorded_requests()[0].model, SessionDefaults::default().model);
    }

    #[tokio::test]
    async fn model_override_applies_before_the_call() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::text("ok"));
        let handle = spawn(client.clone());

        let state = handle
            .chat_buffered("hi", Some("google-ai-studio/gemini-1.5-flash".to_string()))
            .await
            .unwrap();

        assert_eq!(state.model, "google-ai-studio/gemini-1.5-flash");
        assert_eq!(
            client.recorded_requests()[0].model,
            "google-ai-studio/gemini-1.5-flash"
        );
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_into_the_assistant_turn() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::streamed(["Once", " upon", " a time"]));
        let handle = spawn(client);

        let rx = handle.chat_streaming("tell me a story", None).await.unwrap();
        let fragments = drain(rx).await;
        assert_eq!(fragments, vec!["Once", " upon", " a time"]);

        let state = handle.state().await.unwrap();
        assert!(!state.is_processing);
        assert!(state.streaming_message.is_empty());
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, fragments.concat());
    }

    #[tokio::test]
    async fn mid_stream_failure_appends_partial_with_marker_and_closes() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::fail_after(
            ["Once"],
            EngineError::unavailable("connection reset"),
        ));
        let handle = spawn(client);

        let rx = handle.chat_streaming("tell me a story", None).await.unwrap();
        // drain returns, so the stream was closed rather than left hanging
        let fragments = drain(rx).await;
        assert_eq!(fragments[0], "Once");
        assert!(fragments.last().unwrap().contains("[stream interrupted"));

        let state = handle.state().await.unwrap();
        assert!(!state.is_processing);
        assert!(state.streaming_message.is_empty());
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with("Once"));
        assert!(last.content.contains("[stream interrupted: backend unavailable"));
    }

    #[tokio::test]
    async fn buffered_failure_returns_error_and_goes_idle() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::fail(EngineError::rejected("HTTP 500")));
        let handle = spawn(client);

        let err = handle.chat_buffered("hi", None).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Backend(EngineError::BackendRejected(_))
        ));

        let state = handle.state().await.unwrap();
        assert!(!state.is_processing);
        // the user turn stays; no assistant turn was appended
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);

        // the session accepts new sends afterwards
        let err = handle.chat_buffered("again", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));
    }

    #[tokio::test]
    async fn clear_empties_the_log_and_keeps_configuration() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::text("ok"));
        let handle = spawn(client);

        handle.chat_buffered("hello", None).await.unwrap();
        handle.update_system_prompt("Stay focused.").await.unwrap();
        let before = handle.state().await.unwrap();

        let after = handle.clear().await.unwrap();
        assert!(after.messages.is_empty());
        assert_eq!(after.model, before.model);
        assert_eq!(after.system_prompt, before.system_prompt);
        assert_eq!(after.enabled_tools, before.enabled_tools);
    }

    #[tokio::test]
    async fn updating_model_to_the_same_value_is_idempotent() {
        let client = Arc::new(MockInferenceClient::new());
        let handle = spawn(client);

        let model = SessionDefaults::default().model;
        let first = handle.update_model(model.clone()).await.unwrap();
        let second = handle.update_model(model.clone()).await.unwrap();

        assert_eq!(first.model, model);
        assert_eq!(second.model, model);
        assert!(second.messages.is_empty());
    }

    #[tokio::test]
    async fn invalid_configuration_is_refused() {
        let client = Arc::new(MockInferenceClient::new());
        let handle = spawn(client);

        assert!(matches!(
            handle.update_model("   ").await.unwrap_err(),
            SessionError::InvalidConfig(_)
        ));
        assert!(matches!(
            handle.update_system_prompt("").await.unwrap_err(),
            SessionError::InvalidConfig(_)
        ));
        assert!(matches!(
            handle
                .update_tools(vec!["web_search".to_string(), " ".to_string()])
                .await
                .unwrap_err(),
            SessionError::InvalidConfig(_)
        ));
    }

    #[tokio::test]
    async fn tool_calls_land_on_the_assistant_turn() {
        let client = Arc::new(MockInferenceClient::new());
        client.queue(ScriptedReply::text("It is sunny in Rome.").with_tool_calls(vec![
            ToolCall {
                id: "call-1".to_string(),
                name: "get_weather".to_string(),
                arguments: json!({"location": "Rome"}),
                result: ToolResult::error("not configured"),
            },
        ]));
        let handle = spawn(client);

        let state = handle.chat_buffered("weather in Rome?", None).await.unwrap();
        let assistant = &state.messages[1];
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].name, "get_weather");
    }
}

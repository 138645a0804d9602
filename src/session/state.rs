//! Session state and the conversation log.

use crate::llm::DEFAULT_MODEL;
use crate::tools::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Unix millis; non-decreasing across the log
    pub timestamp: i64,
}

/// Initial configuration for newly created sessions
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub model: String,
    pub system_prompt: String,
    pub enabled_tools: BTreeSet<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
            enabled_tools: ["get_weather", "web_search", "query_database"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Full state of one session. Owned exclusively by its actor; everyone
/// else sees clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub messages: Vec<Turn>,
    pub model: String,
    pub system_prompt: String,
    pub enabled_tools: BTreeSet<String>,
    /// True exactly while an inference call is in flight
    pub is_processing: bool,
    /// Fragments accumulated so far for an in-flight streamed call
    pub streaming_message: String,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, defaults: &SessionDefaults) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            model: defaults.model.clone(),
            system_prompt: defaults.system_prompt.clone(),
            enabled_tools: defaults.enabled_tools.clone(),
            is_processing: false,
            streaming_message: String::new(),
        }
    }

    /// Append a turn, assigning its id and a non-decreasing timestamp.
    pub fn push_turn(&mut self, role: Role, content: String, tool_calls: Vec<ToolCall>) {
        let timestamp = self.next_timestamp();
        self.messages.push(Turn {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls,
            timestamp,
        });
    }

    // Wall clocks can step backwards; the log's ordering must not.
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        match self.messages.last() {
            Some(last) => now.max(last.timestamp),
            None => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_get_unique_ids_and_ordered_timestamps() {
        let mut state = SessionState::new("s1", &SessionDefaults::default());
        state.push_turn(Role::User, "hello".into(), vec![]);
        state.push_turn(Role::Assistant, "hi".into(), vec![]);

        assert_ne!(state.messages[0].id, state.messages[1].id);
        assert!(state.messages[0].timestamp <= state.messages[1].timestamp);
    }

    #[test]
    fn serializes_with_the_expected_field_names() {
        let state = SessionState::new("s1", &SessionDefaults::default());
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["isProcessing"], false);
        assert_eq!(json["streamingMessage"], "");
        assert!(json["enabledTools"].is_array());
        assert!(json["systemPrompt"].is_string());
    }

    #[test]
    fn empty_tool_calls_are_omitted_from_the_wire() {
        let mut state = SessionState::new("s1", &SessionDefaults::default());
        state.push_turn(Role::User, "hello".into(), vec![]);
        let json = serde_json::to_value(&state.messages[0]).unwrap();
        assert!(json.get("toolCalls").is_none());
    }
}

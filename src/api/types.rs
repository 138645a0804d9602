//! API request and response types

use serde::{Deserialize, Serialize};

/// Body of a chat request
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    /// Model override applied before the message is processed
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// Body of a model update
#[derive(Debug, Deserialize)]
pub struct ModelBody {
    pub model: String,
}

/// Body of a system prompt update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPromptBody {
    pub system_prompt: String,
}

/// Body of a tools update
#[derive(Debug, Deserialize)]
pub struct ToolsBody {
    pub tools: Vec<String>,
}

/// Uniform response envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<serde_json::Value> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Catalog entry in the models listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

/// Payload of the models listing
#[derive(Debug, Serialize)]
pub struct ModelsData {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

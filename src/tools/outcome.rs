//! Typed capability results.
//!
//! Tool results are a closed union keyed by capability name rather than
//! free-form dictionaries, so downstream consumers match on variants
//! instead of probing string keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability invocation recorded on an assistant turn. Immutable once
/// the turn is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

/// Success payload or error marker for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Success(ToolOutcome),
    Error { error: String },
}

impl ToolResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Closed union of capability payloads, keyed by capability name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ToolOutcome {
    Weather(WeatherReport),
    Search(SearchResults),
    Database(DatabaseReport),
    /// Fallback for capabilities without a dedicated payload shape
    Generic { data: Value },
}

impl ToolOutcome {
    /// Type a raw handler payload by the capability that produced it.
    /// Payloads that do not match the expected shape degrade to `Generic`
    /// rather than being dropped.
    pub fn from_name_and_value(name: &str, value: Value) -> Self {
        match name {
            "get_weather" => serde_json::from_value(value.clone())
                .map_or(ToolOutcome::Generic { data: value }, ToolOutcome::Weather),
            "web_search" => serde_json::from_value(value.clone())
                .map_or(ToolOutcome::Generic { data: value }, ToolOutcome::Search),
            "query_database" => serde_json::from_value(value.clone())
                .map_or(ToolOutcome::Generic { data: value }, ToolOutcome::Database),
            _ => ToolOutcome::Generic { data: value },
        }
    }
}

/// Current conditions for a located place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub location: String,
    pub temperature_c: f64,
    pub wind_kph: f64,
    pub conditions: String,
}

/// Ranked search hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outcome of a scratch-database statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    pub rows: Vec<Value>,
    pub rows_affected: u64,
}

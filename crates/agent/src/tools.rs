use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::queue::WriteQueue;

pub const DEFAULT_SUGGESTION: &str = "Try a different approach or different parameters.";

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

impl ToolCall {
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        str_arg(&self.input, key)
    }
}

/// Recoverable tool error. It is handed back to the model as the tool result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    #[serde(rename = "error")]
    pub message: String,
    pub suggestion: String,
}

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), suggestion: DEFAULT_SUGGESTION.to_string() }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn access_denied(tool_name: &str) -> Self {
        Self::new(format!("Access denied: {tool_name}"))
            .with_suggestion("This tool is not available for your role.")
    }

    pub fn unknown_tool(tool_name: &str) -> Self {
        Self::new(format!("Unknown tool: {tool_name}"))
    }

    pub fn missing_argument(key: &str) -> Self {
        Self::new(format!("Missing required parameter `{key}`"))
    }

    pub fn timeout(tool_name: &str, seconds: u64) -> Self {
        Self::new(format!("Tool {tool_name} timed out after {seconds}s"))
    }

    pub fn to_value(&self) -> Value {
        json!({ "error": self.message, "suggestion": self.suggestion })
    }
}

pub type ToolResult = Result<Value, ToolFailure>;

/// One handler set per engine run: the primary assistant or one specialist.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult;

    /// Whether executions of this tool are written to the tool execution audit.
    fn audits(&self, _tool_name: &str) -> bool {
        false
    }
}

pub fn str_arg<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

pub fn required_str<'a>(input: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolFailure> {
    str_arg(input, key).ok_or_else(|| ToolFailure::missing_argument(key))
}

pub fn bool_arg(input: &Map<String, Value>, key: &str) -> Option<bool> {
    input.get(key).and_then(Value::as_bool)
}

pub fn u32_arg(input: &Map<String, Value>, key: &str) -> Option<u32> {
    input.get(key).and_then(Value::as_u64).and_then(|value| u32::try_from(value).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{required_str, ToolFailure, DEFAULT_SUGGESTION};

    #[test]
    fn failure_payload_carries_error_and_suggestion() {
        let value = ToolFailure::timeout("get_events", 120).to_value();
        assert_eq!(value["error"], "Tool get_events timed out after 120s");
        assert_eq!(value["suggestion"], DEFAULT_SUGGESTION);
        assert_eq!(
            serde_json::to_value(ToolFailure::access_denied("create_shift")).expect("encode")
                ["error"],
            "Access denied: create_shift"
        );
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let input = json!({"name": "  ", "date": "2026-03-14"});
        let input = input.as_object().expect("object");
        assert_eq!(required_str(input, "date"), Ok("2026-03-14"));
        assert_eq!(required_str(input, "name"), Err(ToolFailure::missing_argument("name")));
    }
}

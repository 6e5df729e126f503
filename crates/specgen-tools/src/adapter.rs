use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ToolCallError, ToolNamespace, ToolSessionManager};

#[async_trait]
/// Uniform call contract between pipeline stages and remote capabilities.
///
/// Stages never touch namespace handles directly; they hold this trait and
/// catch `ToolCallError` to degrade per their own contract.
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(
        &self,
        namespace: ToolNamespace,
        capability: &str,
        arguments: Value,
    ) -> Result<String, ToolCallError>;
}

/// Production invoker backed by the session manager's current handle set.
pub struct ToolInvoker {
    sessions: Arc<ToolSessionManager>,
}

impl ToolInvoker {
    pub fn new(sessions: Arc<ToolSessionManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl CapabilityInvoker for ToolInvoker {
    async fn invoke(
        &self,
        namespace: ToolNamespace,
        capability: &str,
        arguments: Value,
    ) -> Result<String, ToolCallError> {
        let set = self
            .sessions
            .current()
            .ok_or(ToolCallError::NoSession(namespace.as_str()))?;
        let result = set.handle(namespace).call(capability, arguments).await?;

        if result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(ToolCallError::Remote(normalize_tool_result(&result)));
        }

        Ok(normalize_tool_result(&result))
    }
}

/// Normalizes a capability result into text.
///
/// MCP-style `content` fragments are concatenated; text that looks like JSON
/// is pretty-printed; every other shape is stringified.
pub fn normalize_tool_result(result: &Value) -> String {
    if let Some(fragments) = result.get("content").and_then(Value::as_array) {
        let joined = fragments
            .iter()
            .map(|item| match item.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            })
            .collect::<Vec<_>>()
            .join("");
        return pretty_when_json(&joined);
    }

    match result {
        Value::String(text) => pretty_when_json(text),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn pretty_when_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            if let Ok(pretty) = serde_json::to_string_pretty(&parsed) {
                return pretty;
            }
        }
    }
    text.to_string()
}

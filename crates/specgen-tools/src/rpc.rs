use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{HandleFactory, ToolCallError, ToolHandle, ToolNamespace};

const MCP_JSONRPC_VERSION: &str = "2.0";
const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_INIT_REQUEST_ID: &str = "specgen-client-init";
const MCP_TOOLS_CALL_REQUEST_ID: &str = "specgen-client-tools-call";
const MCP_SESSION_HEADER: &str = "mcp-session-id";

pub(crate) fn jsonrpc_request_frame(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": MCP_JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

fn initialize_params() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {"tools": {"listChanged": true}},
        "clientInfo": {
            "name": "specgen",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

pub(crate) fn jsonrpc_result_for_id(
    response: &Value,
    request_id: &str,
) -> Result<Value, ToolCallError> {
    if response.get("id").and_then(Value::as_str) != Some(request_id) {
        return Err(ToolCallError::InvalidPayload(format!(
            "response id does not match request '{request_id}'"
        )));
    }
    if let Some(error) = response.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown json-rpc error")
            .to_string();
        return Err(ToolCallError::Rpc { code, message });
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| ToolCallError::InvalidPayload("response has no result object".to_string()))
}

#[derive(Debug, Clone)]
/// Endpoint configuration for the two HTTP tool namespaces.
pub struct HttpToolEndpoints {
    pub issue_tracker_url: String,
    pub code_host_url: String,
    pub request_timeout_ms: u64,
}

/// Live MCP session over HTTP for one namespace.
///
/// The handle owns its transport client and the session id granted by the
/// `initialize` handshake, so a replaced handle is a genuinely new session.
#[derive(Debug)]
pub struct McpHttpHandle {
    client: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
}

impl McpHttpHandle {
    async fn post_frame(&self, frame: &Value) -> Result<Value, ToolCallError> {
        let mut request = self.client.post(&self.endpoint).json(frame);
        if let Some(session_id) = self.session_id.as_deref() {
            request = request.header(MCP_SESSION_HEADER, session_id);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable response body>".to_string());
            return Err(ToolCallError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|error| ToolCallError::InvalidPayload(error.to_string()))
    }
}

#[async_trait]
impl ToolHandle for McpHttpHandle {
    async fn call(&self, capability: &str, arguments: Value) -> Result<Value, ToolCallError> {
        let frame = jsonrpc_request_frame(
            MCP_TOOLS_CALL_REQUEST_ID,
            "tools/call",
            json!({
                "name": capability,
                "arguments": arguments,
            }),
        );
        let response = self.post_frame(&frame).await?;
        jsonrpc_result_for_id(&response, MCP_TOOLS_CALL_REQUEST_ID)
    }
}

/// Production handle factory: `initialize` handshake per establishment.
pub struct HttpHandleFactory {
    endpoints: HttpToolEndpoints,
}

impl HttpHandleFactory {
    pub fn new(endpoints: HttpToolEndpoints) -> Self {
        Self { endpoints }
    }

    fn endpoint_for(&self, namespace: ToolNamespace) -> &str {
        match namespace {
            ToolNamespace::IssueTracker => &self.endpoints.issue_tracker_url,
            ToolNamespace::CodeHost => &self.endpoints.code_host_url,
        }
    }
}

#[async_trait]
impl HandleFactory for HttpHandleFactory {
    async fn establish(
        &self,
        namespace: ToolNamespace,
    ) -> Result<Arc<dyn ToolHandle>, ToolCallError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.endpoints.request_timeout_ms.max(1)))
            .build()?;
        let endpoint = self.endpoint_for(namespace).to_string();

        let frame = jsonrpc_request_frame(MCP_INIT_REQUEST_ID, "initialize", initialize_params());
        let response = client.post(&endpoint).json(&frame).send().await?;
        let status = response.status();
        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable response body>".to_string());
            return Err(ToolCallError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|error| ToolCallError::InvalidPayload(error.to_string()))?;
        jsonrpc_result_for_id(&payload, MCP_INIT_REQUEST_ID)?;

        Ok(Arc::new(McpHttpHandle {
            client,
            endpoint,
            session_id,
        }))
    }
}

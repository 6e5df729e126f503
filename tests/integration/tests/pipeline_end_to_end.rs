use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};
use specgen_ai::{
    ChatRequest, ChatResponse, ChatUsage, GenerationClient, GenerationConfig, GenerationError,
    LlmClient,
};
use specgen_pipeline::Pipeline;
use specgen_tools::{HttpHandleFactory, HttpToolEndpoints, ToolInvoker, ToolSessionManager};
use tokio::sync::Mutex as AsyncMutex;

struct ScriptedClient {
    responses: AsyncMutex<VecDeque<ChatResponse>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    fn canned(content: &str, copies: usize) -> Self {
        let response = ChatResponse {
            content: content.to_string(),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        };
        Self::new(vec![response; copies])
    }

    async fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.messages[0].content.clone())
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError> {
        self.requests.lock().await.push(request);
        let mut responses = self.responses.lock().await;
        responses.pop_front().ok_or_else(|| {
            GenerationError::InvalidResponse("scripted response queue exhausted".into())
        })
    }
}

fn text_result(payload: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "specgen-client-tools-call",
        "result": {
            "content": [{"type": "text", "text": payload.to_string()}]
        }
    })
}

/// Wires up an MCP stub serving the issue tracker on `/issues` and the code
/// host on `/repos`, for the TECBAC-209 fixture.
fn mount_tool_stubs(server: &MockServer) {
    for path in ["/issues", "/repos"] {
        server.mock(|when, then| {
            when.method(POST)
                .path(path)
                .json_body_includes(r#"{"method": "initialize"}"#);
            then.status(200)
                .header("mcp-session-id", &format!("session{path}"))
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": "specgen-client-init",
                    "result": {"protocolVersion": "2024-11-05"}
                }));
        });
    }

    server.mock(|when, then| {
        when.method(POST)
            .path("/issues")
            .json_body_includes(r#"{"params": {"name": "get_issue"}}"#);
        then.status(200).json_body(text_result(&json!({
            "summary": "Fix login bug",
            "description": "Login fails.\n\nAcceptance criteria: login succeeds\n\nSee https://git.example.com/projects/WS1/repos/web-store/browse",
            "status": {"name": "Open"},
            "priority": {"name": "High"},
            "assignee": {"displayName": "Dana Developer"},
            "reporter": {"displayName": "Riley Reporter", "emailAddress": "riley@example.com"},
            "labels": ["auth"],
            "url": "https://tracker.example.com/browse/TECBAC-209",
            "project": {"key": "TECBAC"}
        })));
    });

    server.mock(|when, then| {
        when.method(POST)
            .path("/repos")
            .json_body_includes(r#"{"params": {"name": "list_repositories"}}"#);
        then.status(200).json_body(text_result(&json!([
            {"slug": "web-store", "name": "Web Store"},
            {"slug": "billing", "name": "Billing"}
        ])));
    });

    server.mock(|when, then| {
        when.method(POST)
            .path("/repos")
            .json_body_includes(r#"{"params": {"name": "list_repository_files", "arguments": {"path": ""}}}"#);
        then.status(200).json_body(text_result(&json!({
            "files": [
                {"path": "web-store", "type": "directory"},
                {"path": "README.md", "type": "file"}
            ]
        })));
    });

    server.mock(|when, then| {
        when.method(POST)
            .path("/repos")
            .json_body_includes(r#"{"params": {"name": "list_repository_files", "arguments": {"path": "web-store"}}}"#);
        then.status(200).json_body(text_result(&json!({
            "files": [
                {"path": "web-store/package.json", "type": "file"},
                {"path": "web-store/next.config.js", "type": "file"}
            ]
        })));
    });
}

fn pipeline_against(server: &MockServer, llm: Arc<dyn LlmClient>) -> Pipeline {
    let factory = Arc::new(HttpHandleFactory::new(HttpToolEndpoints {
        issue_tracker_url: format!("{}/issues", server.base_url()),
        code_host_url: format!("{}/repos", server.base_url()),
        request_timeout_ms: 5_000,
    }));
    let sessions = Arc::new(ToolSessionManager::new(factory));
    let invoker = Arc::new(ToolInvoker::new(sessions.clone()));
    Pipeline::new(sessions, invoker, llm, "spec-model")
}

#[tokio::test]
async fn functional_end_to_end_produces_specification_from_issue_key() {
    let server = MockServer::start();
    mount_tool_stubs(&server);
    let generation = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "# Issue Summary\n\n**Issue Key:** TECBAC-209\n**Title:** Fix login bug\n\n# Implementation Specification\n\n## Deliverables\n- Login fix"
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 900, "completion_tokens": 64, "total_tokens": 964}
        }));
    });

    let llm = Arc::new(
        GenerationClient::new(GenerationConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client must build"),
    );
    let pipeline = pipeline_against(&server, llm);

    let state = pipeline
        .run(r#"{"jira_issue_key": "TECBAC-209"}"#)
        .await
        .expect("run must succeed");

    assert_eq!(state.issue_key, "TECBAC-209");
    assert_eq!(state.workspace.as_deref(), Some("WS1"));
    assert_eq!(state.repo_slug.as_deref(), Some("web-store"));
    assert_eq!(
        state.repo_listing.as_ref().map(|listing| listing.len()),
        Some(2)
    );
    let inventory = state.file_inventory.as_ref().expect("inventory must exist");
    assert!(inventory.web_store.is_some());

    let output = state.final_output.expect("output must be set");
    assert!(output.contains("TECBAC-209"));
    assert!(output.contains("Fix login bug"));
    assert!(output.contains("# Issue Summary"));
    generation.assert_calls(1);
}

#[tokio::test]
async fn functional_repeated_runs_assemble_identical_prompts() {
    let server = MockServer::start();
    mount_tool_stubs(&server);

    let llm = Arc::new(ScriptedClient::canned("# Issue Summary\n\nstable output", 2));
    let pipeline = pipeline_against(&server, llm.clone());

    let first = pipeline.run("TECBAC-209").await.expect("first run");
    let second = pipeline.run("TECBAC-209").await.expect("second run");

    let prompts = llm.prompts().await;
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], prompts[1]);
    assert!(prompts[0].contains("Issue Key: TECBAC-209"));
    assert!(prompts[0].contains("Acceptance Criteria:"));
    assert!(prompts[0].contains("Key files in web-store: web-store/package.json"));
    assert_eq!(first.final_output, second.final_output);
}

#[tokio::test]
async fn regression_generation_failure_degrades_to_error_output() {
    let server = MockServer::start();
    mount_tool_stubs(&server);
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(503).body("service unavailable");
    });

    let llm = Arc::new(
        GenerationClient::new(GenerationConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client must build"),
    );
    let pipeline = pipeline_against(&server, llm);

    let state = pipeline.run("TECBAC-209").await.expect("run must succeed");

    // tool stages still completed; only synthesis degraded
    assert_eq!(state.workspace.as_deref(), Some("WS1"));
    let output = state.final_output.expect("output must be set");
    assert!(output.starts_with("Error: "));
}

#[tokio::test]
async fn regression_unparseable_issue_payload_still_yields_output() {
    let server = MockServer::start();
    for path in ["/issues", "/repos"] {
        server.mock(|when, then| {
            when.method(POST)
                .path(path)
                .json_body_includes(r#"{"method": "initialize"}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": "specgen-client-init",
                "result": {"protocolVersion": "2024-11-05"}
            }));
        });
    }
    server.mock(|when, then| {
        when.method(POST)
            .path("/issues")
            .json_body_includes(r#"{"params": {"name": "get_issue"}}"#);
        then.status(200).json_body(text_result(&json!("issue not found")));
    });

    let llm = Arc::new(ScriptedClient::canned("# Issue Summary\n\nnothing known", 1));
    let pipeline = pipeline_against(&server, llm.clone());

    let state = pipeline.run("TECBAC-209").await.expect("run must succeed");

    assert!(state.issue_record.is_none());
    assert!(state.workspace.is_none());
    let prompts = llm.prompts().await;
    assert!(prompts[0].contains("Title: N/A"));
    assert_eq!(
        state.final_output.as_deref(),
        Some("# Issue Summary\n\nnothing known")
    );
}

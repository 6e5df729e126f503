use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ChatRequest, ChatResponse, ChatUsage, GenerationError, LlmClient, Message, MessageRole};

#[derive(Debug, Clone)]
/// Public struct `GenerationConfig` consumed at client construction.
pub struct GenerationConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// OpenAI-compatible completion client.
///
/// Stateless: one endpoint and credential fixed at construction, one request
/// per `complete` call, no retry. A failed call surfaces directly to the
/// caller, which renders it into the run output instead of rethrowing.
pub struct GenerationClient {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                GenerationError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for GenerationClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError> {
        let body = build_chat_request_body(&request);
        let response = self
            .client
            .post(self.chat_completions_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        parse_chat_response(&raw)
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": role_name(message),
                "content": message.content,
            })
        })
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    body
}

fn role_name(message: &Message) -> &'static str {
    match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, GenerationError> {
    let parsed: WireChatResponse = serde_json::from_str(raw)?;
    let choice =
        parsed.choices.into_iter().next().ok_or_else(|| {
            GenerationError::InvalidResponse("response contained no choices".to_string())
        })?;

    let content = match choice.message.content {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        finish_reason: choice.finish_reason,
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{build_chat_request_body, parse_chat_response, GenerationClient, GenerationConfig};
    use crate::{ChatRequest, GenerationError, LlmClient, Message};

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user("write the spec")],
            temperature: 0.0,
            max_tokens: None,
        }
    }

    #[test]
    fn unit_serializes_messages_and_temperature() {
        let body = build_chat_request_body(&request("spec-model"));
        assert_eq!(body["model"], "spec-model");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "write the spec");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn unit_parses_assistant_content_and_usage() {
        let raw = r##"{
            "choices": [{
                "message": { "content": "# Issue Summary\n..." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 }
        }"##;

        let response = parse_chat_response(raw).expect("response must parse");
        assert!(response.content.starts_with("# Issue Summary"));
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.total_tokens, 14);
    }

    #[test]
    fn regression_empty_choices_is_an_invalid_response() {
        let error = parse_chat_response(r#"{"choices":[]}"#).expect_err("must fail");
        assert!(matches!(error, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn unit_rejects_blank_api_key() {
        let error = GenerationClient::new(GenerationConfig {
            api_base: "http://localhost:9".to_string(),
            api_key: "  ".to_string(),
            request_timeout_ms: 1_000,
        })
        .expect_err("blank key must be rejected");
        assert!(matches!(error, GenerationError::MissingApiKey));
    }

    #[tokio::test]
    async fn functional_complete_posts_bearer_request_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": { "content": "done" },
                    "finish_reason": "stop"
                }]
            }));
        });

        let client = GenerationClient::new(GenerationConfig {
            api_base: format!("{}/v1", server.base_url()),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client must build");

        let response = client.complete(request("spec-model")).await.expect("ok");
        assert_eq!(response.content, "done");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_non_success_status_surfaces_without_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503).body("overloaded");
        });

        let client = GenerationClient::new(GenerationConfig {
            api_base: format!("{}/v1", server.base_url()),
            api_key: "test-key".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("client must build");

        let error = client
            .complete(request("spec-model"))
            .await
            .expect_err("status must surface");
        match error {
            GenerationError::HttpStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_calls(1);
    }
}

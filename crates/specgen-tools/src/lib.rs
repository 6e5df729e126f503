//! Remote tool namespaces for specgen: session lifecycle and uniform invocation.
//!
//! Two MCP-style namespaces back the pipeline (issue tracker, code host).
//! Handle validity is scoped to an execution context shorter than process
//! lifetime, so the session manager refreshes the full handle set before
//! every run and swaps it atomically.
mod adapter;
mod rpc;
mod session;

use thiserror::Error;

pub use adapter::{normalize_tool_result, CapabilityInvoker, ToolInvoker};
pub use rpc::{HttpHandleFactory, HttpToolEndpoints, McpHttpHandle};
pub use session::{
    establish_backoff_ms, HandleFactory, HandleSet, ToolHandle, ToolSessionManager,
    ESTABLISH_ATTEMPTS, ESTABLISH_BASE_BACKOFF_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates the remote tool namespaces the pipeline consumes.
pub enum ToolNamespace {
    IssueTracker,
    CodeHost,
}

impl ToolNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolNamespace::IssueTracker => "issue_tracker",
            ToolNamespace::CodeHost => "code_host",
        }
    }
}

impl std::fmt::Display for ToolNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
/// Normalized failure from a remote capability call. Stages catch this and
/// degrade by leaving their output field unset.
pub enum ToolCallError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tool endpoint returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("json-rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid tool payload: {0}")]
    InvalidPayload(String),
    #[error("remote tool reported an error: {0}")]
    Remote(String),
    #[error("no live session for namespace '{0}'")]
    NoSession(&'static str),
}

#[derive(Debug, Error)]
#[error("tool namespace '{namespace}' unavailable after {attempts} attempts: {detail}")]
/// Handle establishment exhausted its retries with no cached set to fall
/// back on. Fatal for the run that needed the handle, nothing else.
pub struct ToolUnavailableError {
    pub namespace: &'static str,
    pub attempts: usize,
    pub detail: String,
}

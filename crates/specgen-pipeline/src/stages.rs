use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use specgen_ai::{ChatRequest, LlmClient, Message};
use specgen_tools::{CapabilityInvoker, ToolNamespace};

use crate::{
    prompt::build_prompt,
    state::{FileInventory, PipelineState, RepoDescriptor},
};

/// Fixed, well-known storefront subdirectory probed by `list_files`.
pub(crate) const WEB_STORE_DIR: &str = "web-store";

fn issue_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Z]+-\d+").expect("issue key pattern must compile"))
}

fn exact_issue_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z]+-\d+$").expect("exact issue key pattern must compile"))
}

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https?://\S+?/projects/([^/\s]+)/repos/([^/\s?#]+)")
            .expect("repo url pattern must compile")
    })
}

/// Stage 1: extract the issue key from the initial input text.
///
/// First `[A-Z]+-\d+` substring wins; failing that, the whole trimmed text
/// is used when it is itself a key. Pure and deterministic.
pub fn process_input(state: &mut PipelineState) {
    let text = state
        .messages
        .last()
        .map(|message| message.content.clone())
        .unwrap_or_default();

    if let Some(found) = issue_key_pattern().find(&text) {
        state.issue_key = found.as_str().to_string();
        tracing::info!(issue_key = %state.issue_key, "extracted issue key from input");
        return;
    }

    let trimmed = text.trim();
    if exact_issue_key_pattern().is_match(trimmed) {
        state.issue_key = trimmed.to_string();
        tracing::info!(issue_key = %state.issue_key, "using entire input as issue key");
        return;
    }

    tracing::warn!("no issue key found in input");
}

/// Stage 2: fetch the issue record through the issue-tracker namespace.
pub async fn fetch_issue(invoker: &dyn CapabilityInvoker, state: &mut PipelineState) {
    if state.issue_key.is_empty() {
        return;
    }

    let payload = match invoker
        .invoke(
            ToolNamespace::IssueTracker,
            "get_issue",
            json!({"issue_key": state.issue_key}),
        )
        .await
    {
        Ok(payload) => payload,
        Err(error) => {
            tracing::error!(issue_key = %state.issue_key, error = %error, "error fetching issue");
            state.issue_record = None;
            return;
        }
    };

    let trimmed = payload.trim();
    if trimmed.is_empty() {
        tracing::warn!(issue_key = %state.issue_key, "empty issue payload");
        state.issue_record = None;
        return;
    }
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        tracing::warn!(
            issue_key = %state.issue_key,
            payload = %truncate_for_log(trimmed, 100),
            "unexpected issue payload format"
        );
        state.issue_record = None;
        return;
    }

    match crate::IssueRecord::from_payload(trimmed) {
        Ok(record) => {
            tracing::info!(issue_key = %state.issue_key, "fetched issue");
            state.issue_record = Some(record);
        }
        Err(error) => {
            tracing::error!(
                issue_key = %state.issue_key,
                error = %error,
                payload = %truncate_for_log(trimmed, 200),
                "failed to decode issue payload"
            );
            state.issue_record = None;
        }
    }
}

/// Stage 3: derive workspace and repository slug from the issue record.
///
/// Description is scanned before the url field; first match wins. With no
/// URL match anywhere, the project key becomes the workspace and the slug
/// stays unset.
pub fn resolve_repo(state: &mut PipelineState) {
    let Some(record) = state.issue_record.clone() else {
        tracing::warn!("no issue record to resolve repository from");
        return;
    };

    for field in [&record.description, &record.url] {
        if let Some(captures) = repo_url_pattern().captures(field) {
            state.workspace = Some(captures[1].to_string());
            state.repo_slug = Some(captures[2].to_string());
            tracing::info!(
                workspace = %captures[1],
                repo_slug = %captures[2],
                "resolved repository from issue record"
            );
            return;
        }
    }

    if let Some(project_key) = state.project_key() {
        tracing::info!(workspace = %project_key, "falling back to project key as workspace");
        state.workspace = Some(project_key);
    }
}

/// Stage 4: list repositories in the resolved workspace.
pub async fn list_repos(invoker: &dyn CapabilityInvoker, state: &mut PipelineState) {
    let Some(workspace) = state.workspace.clone() else {
        tracing::warn!("no workspace available to list repositories");
        return;
    };

    let payload = match invoker
        .invoke(
            ToolNamespace::CodeHost,
            "list_repositories",
            json!({"workspace": workspace}),
        )
        .await
    {
        Ok(payload) => payload,
        Err(error) => {
            tracing::error!(workspace = %workspace, error = %error, "error listing repositories");
            state.repo_listing = None;
            return;
        }
    };

    match serde_json::from_str::<Vec<RepoDescriptor>>(&payload) {
        Ok(listing) => {
            if let Some(repo_slug) = state.repo_slug.as_deref() {
                if listing.iter().any(|repo| repo.slug == repo_slug) {
                    tracing::info!(repo_slug = %repo_slug, "found repository in workspace listing");
                } else {
                    tracing::warn!(repo_slug = %repo_slug, "repository absent from workspace listing");
                }
            }
            tracing::info!(workspace = %workspace, count = listing.len(), "listed repositories");
            state.repo_listing = Some(listing);
        }
        Err(error) => {
            tracing::error!(workspace = %workspace, error = %error, "failed to decode repository listing");
            state.repo_listing = None;
        }
    }
}

/// Stage 5: list files at the repository root, plus the storefront
/// subdirectory when the root listing contains it.
pub async fn list_files(invoker: &dyn CapabilityInvoker, state: &mut PipelineState) {
    let (Some(workspace), Some(repo_slug)) = (state.workspace.clone(), state.repo_slug.clone())
    else {
        tracing::warn!(
            workspace = state.workspace.as_deref().unwrap_or("<none>"),
            repo_slug = state.repo_slug.as_deref().unwrap_or("<none>"),
            "missing workspace or repo_slug for file listing"
        );
        return;
    };

    let root = match fetch_listing(invoker, &workspace, &repo_slug, "").await {
        Ok(root) => root,
        Err(()) => {
            state.file_inventory = None;
            return;
        }
    };

    let has_web_store = root
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files.iter().any(|file| {
                file.get("path").and_then(Value::as_str) == Some(WEB_STORE_DIR)
                    && file.get("type").and_then(Value::as_str) == Some("directory")
            })
        })
        .unwrap_or(false);

    if !has_web_store {
        tracing::info!(workspace = %workspace, repo_slug = %repo_slug, "listed root files");
        state.file_inventory = Some(FileInventory {
            root,
            web_store: None,
        });
        return;
    }

    match fetch_listing(invoker, &workspace, &repo_slug, WEB_STORE_DIR).await {
        Ok(web_store) => {
            tracing::info!(
                workspace = %workspace,
                repo_slug = %repo_slug,
                path = WEB_STORE_DIR,
                "listed storefront files"
            );
            state.file_inventory = Some(FileInventory {
                root,
                web_store: Some(web_store),
            });
        }
        Err(()) => {
            state.file_inventory = None;
        }
    }
}

async fn fetch_listing(
    invoker: &dyn CapabilityInvoker,
    workspace: &str,
    repo_slug: &str,
    path: &str,
) -> Result<Value, ()> {
    let payload = invoker
        .invoke(
            ToolNamespace::CodeHost,
            "list_repository_files",
            json!({"workspace": workspace, "repo_slug": repo_slug, "path": path}),
        )
        .await
        .map_err(|error| {
            tracing::error!(
                workspace = %workspace,
                repo_slug = %repo_slug,
                path = %path,
                error = %error,
                "error listing repository files"
            );
        })?;

    serde_json::from_str::<Value>(&payload).map_err(|error| {
        tracing::error!(
            workspace = %workspace,
            repo_slug = %repo_slug,
            path = %path,
            error = %error,
            "failed to decode file listing"
        );
    })
}

/// Stage 6: synthesize the implementation specification.
///
/// Always runs, whatever the earlier stages managed to gather. Generation
/// failure becomes a literal error string in `final_output`; it is never
/// rethrown.
pub async fn synthesize(llm: &dyn LlmClient, model: &str, state: &mut PipelineState) {
    let prompt = build_prompt(state);
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![Message::user(prompt)],
        temperature: 0.0,
        max_tokens: None,
    };

    match llm.complete(request).await {
        Ok(response) => {
            state.messages.push(Message::assistant(response.content.clone()));
            state.final_output = Some(response.content);
            tracing::info!(
                output_tokens = response.usage.output_tokens,
                "synthesized final output"
            );
        }
        Err(error) => {
            tracing::error!(error = %error, "error synthesizing output");
            state.final_output = Some(format!("Error: {error}"));
        }
    }
}

fn truncate_for_log(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use specgen_ai::Message;

/// Structured issue-tracker record, decoded leniently.
///
/// Remote trackers return several shapes for the same field (bare strings
/// versus `{"name": ...}` objects, display-name wrappers around people), so
/// decoding goes through [`IssueRecord::from_payload`] rather than a direct
/// serde derive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IssueRecord {
    pub summary: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub reporter: String,
    pub labels: Vec<String>,
    pub url: String,
    pub project_key: Option<String>,
}

impl IssueRecord {
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(payload)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            summary: string_field(value, "summary"),
            description: string_field(value, "description"),
            status: named_field(value, "status"),
            priority: named_field(value, "priority"),
            assignee: assignee_field(value),
            reporter: reporter_field(value),
            labels: labels_field(value),
            url: string_field(value, "url"),
            project_key: value
                .get("project")
                .and_then(|project| project.get("key"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Accepts `"Open"` as well as `{"name": "Open"}`.
fn named_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(object) => object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

fn assignee_field(value: &Value) -> String {
    match value.get("assignee") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
        Some(Value::Object(object)) => object
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or("Unassigned")
            .to_string(),
        _ => "Unassigned".to_string(),
    }
}

fn reporter_field(value: &Value) -> String {
    match value.get("reporter") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(object)) => {
            let display_name = object
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or("N/A");
            let email = object
                .get("emailAddress")
                .and_then(Value::as_str)
                .unwrap_or("N/A");
            format!("{display_name} ({email})")
        }
        _ => String::new(),
    }
}

fn labels_field(value: &Value) -> Vec<String> {
    value
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One repository descriptor from the code host's workspace listing.
pub struct RepoDescriptor {
    #[serde(default)]
    pub slug: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// File listings gathered by the `list_files` stage.
pub struct FileInventory {
    pub root: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_store: Option<Value>,
}

/// Shared record threaded through every stage of one pipeline run.
///
/// Created fresh per run, never reused. Each stage writes only its own
/// field(s); once `final_output` is set the state is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineState {
    pub messages: Vec<Message>,
    pub issue_key: String,
    pub issue_record: Option<IssueRecord>,
    pub workspace: Option<String>,
    pub repo_slug: Option<String>,
    pub repo_listing: Option<Vec<RepoDescriptor>>,
    pub file_inventory: Option<FileInventory>,
    pub final_output: Option<String>,
}

impl PipelineState {
    pub fn new(input: &str) -> Self {
        Self {
            messages: vec![Message::user(input)],
            issue_key: String::new(),
            issue_record: None,
            workspace: None,
            repo_slug: None,
            repo_listing: None,
            file_inventory: None,
            final_output: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.final_output.is_some()
    }

    /// Project key: explicit record field first, then the alphabetic prefix
    /// of the issue key before its first hyphen.
    pub fn project_key(&self) -> Option<String> {
        if let Some(record) = &self.issue_record {
            if let Some(key) = record.project_key.as_deref() {
                if !key.trim().is_empty() {
                    return Some(key.to_string());
                }
            }
        }
        self.issue_key
            .split_once('-')
            .map(|(prefix, _)| prefix.to_string())
            .filter(|prefix| !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphabetic()))
    }
}

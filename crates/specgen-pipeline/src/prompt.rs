use std::sync::OnceLock;

use regex::Regex;

use crate::state::{IssueRecord, PipelineState};

/// Character ceiling for the serialized file-structure excerpt.
pub const FILE_STRUCTURE_CHAR_BUDGET: usize = 2000;

const KEY_FILE_LIMIT: usize = 10;

fn acceptance_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)(acceptance criteria|acceptance):\s*(.+?)(\n\n|\n#|$)")
            .expect("acceptance criteria pattern must compile")
    })
}

/// Pulls an acceptance-criteria section out of the description, best effort.
fn extract_acceptance_criteria(description: &str) -> String {
    let lowered = description.to_lowercase();
    if !lowered.contains("acceptance criteria") && !lowered.contains("acceptance") {
        return "See description".to_string();
    }
    match acceptance_pattern().captures(description) {
        Some(captures) => captures[2].trim().to_string(),
        None => "See description".to_string(),
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

fn labels_line(record: &IssueRecord) -> String {
    if record.labels.is_empty() {
        "None specified".to_string()
    } else {
        record.labels.join(", ")
    }
}

/// Assembles the synthesis prompt from whatever the earlier stages gathered.
///
/// The assembly is deterministic: fixed section ordering, fixed headers, and
/// a truncated file-structure excerpt. Missing inputs degrade to placeholder
/// lines rather than changing the layout.
pub fn build_prompt(state: &PipelineState) -> String {
    let record = state.issue_record.clone().unwrap_or_default();
    let issue_key = or_na(&state.issue_key);
    let acceptance = extract_acceptance_criteria(&record.description);
    let project_key = state.project_key().unwrap_or_default();
    let workspace = state.workspace.clone().unwrap_or_default();
    let repo_slug = state.repo_slug.clone().unwrap_or_default();

    let mut lines: Vec<String> = vec![
        "You are a Senior Technical Lead and Requirements Architect.".to_string(),
        "Analyze the issue and extract requirements, then produce a comprehensive implementation specification.".to_string(),
        String::new(),
        "=== ISSUE DATA ===".to_string(),
        format!("Issue Key: {issue_key}"),
        format!("Title: {}", or_na(&record.summary)),
        format!("Status: {}", or_na(&record.status)),
        format!("Priority: {}", or_na(&record.priority)),
        format!("Assignee: {}", or_na(&record.assignee)),
        format!("Reporter: {}", or_na(&record.reporter)),
        format!("Labels: {}", labels_line(&record)),
        String::new(),
        "Project Information:".to_string(),
    ];

    if !workspace.is_empty() {
        lines.push(format!("- Workspace: {workspace}"));
    }
    if !repo_slug.is_empty() {
        lines.push(format!("- Repository: {repo_slug}"));
    }
    if !record.url.is_empty() {
        lines.push(format!("- Linked Repository: {}", record.url));
    }
    if !project_key.is_empty() {
        lines.push(format!("- Project Key: {project_key}"));
    }

    lines.extend([
        String::new(),
        "Acceptance Criteria:".to_string(),
        acceptance.clone(),
        String::new(),
        "Description:".to_string(),
        or_na(&record.description).to_string(),
        String::new(),
        "=== REPOSITORY CONTEXT ===".to_string(),
    ]);

    if let Some(inventory) = &state.file_inventory {
        if let Some(key_files) = key_files_line(inventory.web_store.as_ref()) {
            lines.push(key_files);
        }
        lines.push(String::new());
        lines.push("Repository file structure:".to_string());
        lines.push(truncate_chars(
            &serde_json::to_string_pretty(inventory).unwrap_or_default(),
            FILE_STRUCTURE_CHAR_BUDGET,
        ));
    }

    lines.extend([
        String::new(),
        "=== YOUR TASK ===".to_string(),
        String::new(),
        "Produce output in EXACTLY this format:".to_string(),
        String::new(),
        "# Issue Summary".to_string(),
        String::new(),
        format!("**Issue Key:** {issue_key}"),
        format!("**Title:** {}", or_na(&record.summary)),
        format!("**Status:** {}", or_na(&record.status)),
        format!("**Priority:** {}", or_na(&record.priority)),
        format!("**Assignee:** {}", or_na(&record.assignee)),
        format!("**Reporter:** {}", or_na(&record.reporter)),
        format!("**Labels:** {}", labels_line(&record)),
        format!(
            "**Linked Repository:** {}",
            if record.url.is_empty() {
                "Not specified"
            } else {
                &record.url
            }
        ),
        String::new(),
        "**Project Information:**".to_string(),
        format!("- Project Key: {}", or_na(&project_key)),
        format!("- Workspace: {}", or_na(&workspace)),
        format!("- Repository: {}", or_na(&repo_slug)),
        String::new(),
        "**Acceptance Criteria:**".to_string(),
        format!("- {}", acceptance.replace('\n', "\n- ")),
        String::new(),
        "**Description:**".to_string(),
        or_na(&record.description).to_string(),
        String::new(),
        "---".to_string(),
        String::new(),
        "# Implementation Specification".to_string(),
        String::new(),
        "## Deliverables".to_string(),
        String::new(),
        "List WHAT needs to be created or modified (not HOW). Be specific about the concrete outputs.".to_string(),
        String::new(),
        "## Required Functionality".to_string(),
        String::new(),
        "Describe the specific behaviors, operations, or capabilities that must be implemented. Focus on functional requirements.".to_string(),
        String::new(),
        "## Input/Output Specifications".to_string(),
        String::new(),
        "**Inputs:**".to_string(),
        "List all data inputs, user interactions, or triggers required.".to_string(),
        String::new(),
        "**Outputs:**".to_string(),
        "List all expected outputs, responses, or results.".to_string(),
        String::new(),
        "**Data Requirements:**".to_string(),
        "Describe the data structures, formats, or data flow requirements.".to_string(),
        String::new(),
        "## Constraints & Validations".to_string(),
        String::new(),
        "List all rules, limitations, validation requirements, or constraints that must be followed.".to_string(),
        String::new(),
        "## Integration Requirements".to_string(),
        String::new(),
        "Describe external systems, APIs, existing components, or integration points that must be considered.".to_string(),
        String::new(),
        "## Repository Context".to_string(),
        String::new(),
        "**Project Type:** [Identify from repository structure]".to_string(),
        String::new(),
        "**Technology Stack Indicators:**".to_string(),
        "[List technologies identified from repository files]".to_string(),
        String::new(),
        "**Project Structure:**".to_string(),
        "[Describe the directory structure and organization]".to_string(),
        String::new(),
        "**Key Files Present:**".to_string(),
        "[List important configuration and source files]".to_string(),
        String::new(),
        "CRITICAL INSTRUCTIONS:".to_string(),
        "- Extract acceptance criteria from the description and list them as bullet points".to_string(),
        "- Be comprehensive and detailed".to_string(),
        "- Focus on WHAT needs to be built, NOT HOW to implement it".to_string(),
        "- Include all relevant details from the issue".to_string(),
        "- Analyze the repository structure to provide accurate technology stack and project context".to_string(),
        "- Do NOT include code examples or implementation details".to_string(),
    ]);

    lines.join("\n")
}

/// Renders a one-line preview of the storefront listing, capped at ten paths.
fn key_files_line(web_store: Option<&serde_json::Value>) -> Option<String> {
    let files = web_store?.get("files")?.as_array()?;
    let names: Vec<&str> = files
        .iter()
        .filter_map(|file| file.get("path").and_then(serde_json::Value::as_str))
        .take(KEY_FILE_LIMIT)
        .collect();
    if names.is_empty() {
        return None;
    }
    Some(format!("Key files in web-store: {}", names.join(", ")))
}

fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

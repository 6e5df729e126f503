//! Pipeline orchestrator for specgen.
//!
//! A fixed-order chain of six stages turns an issue key (or free text that
//! contains one) into an implementation specification, mutating one shared
//! state record. Stages degrade on failure instead of aborting; only a
//! session-establishment failure with no fallback fails a run.
mod orchestrator;
mod prompt;
mod stages;
mod state;

pub use orchestrator::Pipeline;
pub use prompt::{build_prompt, FILE_STRUCTURE_CHAR_BUDGET};
pub use stages::{fetch_issue, list_files, list_repos, process_input, resolve_repo, synthesize};
pub use state::{FileInventory, IssueRecord, PipelineState, RepoDescriptor};

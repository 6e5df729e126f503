use std::sync::Arc;

use specgen_ai::LlmClient;
use specgen_tools::{CapabilityInvoker, ToolSessionManager, ToolUnavailableError};

use crate::{
    stages::{fetch_issue, list_files, list_repos, process_input, resolve_repo, synthesize},
    state::PipelineState,
};

/// Fixed-order pipeline from raw input text to a synthesized specification.
///
/// Each `run` starts on a fresh state and a freshly refreshed set of tool
/// handles. Stage failures degrade the state instead of aborting; the only
/// hard error is failing to establish the tool sessions up front.
pub struct Pipeline {
    sessions: Arc<ToolSessionManager>,
    invoker: Arc<dyn CapabilityInvoker>,
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl Pipeline {
    pub fn new(
        sessions: Arc<ToolSessionManager>,
        invoker: Arc<dyn CapabilityInvoker>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            invoker,
            llm,
            model: model.into(),
        }
    }

    pub async fn run(&self, input: &str) -> Result<PipelineState, ToolUnavailableError> {
        self.sessions.refresh().await?;

        let mut state = PipelineState::new(input);
        process_input(&mut state);
        fetch_issue(self.invoker.as_ref(), &mut state).await;
        resolve_repo(&mut state);
        list_repos(self.invoker.as_ref(), &mut state).await;
        list_files(self.invoker.as_ref(), &mut state).await;
        synthesize(self.llm.as_ref(), &self.model, &mut state).await;

        tracing::info!(
            issue_key = %state.issue_key,
            complete = state.is_complete(),
            "pipeline run finished"
        );
        Ok(state)
    }
}

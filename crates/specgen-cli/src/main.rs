mod args;
mod bootstrap;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use specgen_ai::{GenerationClient, GenerationConfig};
use specgen_pipeline::Pipeline;
use specgen_tools::{HttpHandleFactory, HttpToolEndpoints, ToolInvoker, ToolSessionManager};

use crate::args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();

    let cli = Cli::parse();
    cli.validate().context("invalid configuration")?;

    let factory = Arc::new(HttpHandleFactory::new(HttpToolEndpoints {
        issue_tracker_url: cli.issue_tracker_url.clone(),
        code_host_url: cli.code_host_url.clone(),
        request_timeout_ms: cli.tool_timeout_ms,
    }));
    let sessions = Arc::new(ToolSessionManager::new(factory));
    let invoker = Arc::new(ToolInvoker::new(sessions.clone()));
    let llm = Arc::new(
        GenerationClient::new(GenerationConfig {
            api_base: cli.api_base.clone(),
            api_key: cli.api_key.clone(),
            request_timeout_ms: cli.generation_timeout_ms,
        })
        .context("failed to build generation client")?,
    );
    let pipeline = Pipeline::new(sessions, invoker, llm, cli.model.clone());

    if let Some(input) = cli.input.as_deref() {
        let state = pipeline
            .run(input)
            .await
            .context("tool sessions unavailable")?;
        println!("{}", state.final_output.unwrap_or_default());
        return Ok(());
    }

    serve_stdin(&pipeline).await
}

/// Long-lived mode: one pipeline run per stdin line, until EOF.
///
/// A run that cannot establish tool sessions is reported and the loop keeps
/// going; the process only exits on EOF or a stdin read error.
async fn serve_stdin(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match pipeline.run(input).await {
            Ok(state) => println!("{}", state.final_output.unwrap_or_default()),
            Err(error) => {
                tracing::error!(error = %error, "pipeline run skipped");
                eprintln!("Error: {error}");
            }
        }
    }
    Ok(())
}

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
/// Startup validation failures; reported before any pipeline work begins.
pub enum ConfigurationError {
    #[error("invalid {flag}: {detail}")]
    InvalidEndpoint { flag: &'static str, detail: String },
    #[error("--{flag} must be greater than zero")]
    ZeroTimeout { flag: &'static str },
}

#[derive(Debug, Parser)]
#[command(
    name = "specgen",
    about = "Turns an issue-tracker ticket key into an implementation specification",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "SPECGEN_ISSUE_TRACKER_URL",
        help = "MCP endpoint for the issue-tracker tool namespace"
    )]
    pub issue_tracker_url: String,

    #[arg(
        long,
        env = "SPECGEN_CODE_HOST_URL",
        help = "MCP endpoint for the code-host tool namespace"
    )]
    pub code_host_url: String,

    #[arg(
        long,
        env = "SPECGEN_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for the OpenAI-compatible generation API"
    )]
    pub api_base: String,

    #[arg(
        long,
        env = "SPECGEN_API_KEY",
        hide_env_values = true,
        help = "API key for the generation service"
    )]
    pub api_key: String,

    #[arg(
        long,
        env = "SPECGEN_MODEL",
        default_value = "gpt-4o-mini",
        help = "Model identifier sent with every generation request"
    )]
    pub model: String,

    #[arg(
        long,
        env = "SPECGEN_TOOL_TIMEOUT_MS",
        default_value_t = 30_000,
        help = "Per-request timeout for tool namespace calls, in milliseconds"
    )]
    pub tool_timeout_ms: u64,

    #[arg(
        long,
        env = "SPECGEN_GENERATION_TIMEOUT_MS",
        default_value_t = 120_000,
        help = "Timeout for the single generation call, in milliseconds"
    )]
    pub generation_timeout_ms: u64,

    #[arg(
        long,
        help = "Run the pipeline once on this input instead of reading lines from stdin"
    )]
    pub input: Option<String>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (flag, value) in [
            ("--issue-tracker-url", &self.issue_tracker_url),
            ("--code-host-url", &self.code_host_url),
            ("--api-base", &self.api_base),
        ] {
            validate_endpoint(flag, value)?;
        }
        for (flag, value) in [
            ("tool-timeout-ms", self.tool_timeout_ms),
            ("generation-timeout-ms", self.generation_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::ZeroTimeout { flag });
            }
        }
        Ok(())
    }
}

fn validate_endpoint(flag: &'static str, value: &str) -> Result<(), ConfigurationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::InvalidEndpoint {
            flag,
            detail: "value is empty".to_string(),
        });
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigurationError::InvalidEndpoint {
            flag,
            detail: format!("expected http(s) url, got {trimmed}"),
        });
    }
    Ok(())
}

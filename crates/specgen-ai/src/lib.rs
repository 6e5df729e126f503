//! Text-generation client surface for specgen.
mod client;
mod types;

pub use client::{GenerationClient, GenerationConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, GenerationError, LlmClient, Message, MessageRole,
};

//! Test generation through an OpenAI-compatible chat completion API.
//!
//! - **client**: async HTTP client for `/v1/chat/completions`
//! - **prompt**: prompts for initial and optimization rounds, code extraction
//! - **generator**: blocking [`TestGenerator`](crate::TestGenerator) adapter

pub mod client;
pub mod generator;
pub mod prompt;

pub use client::{ChatMessage, ChatRequest, ChatResponse, LlmClient, LlmClientError, Role, Usage};
pub use generator::{LlmSettings, LlmTestGenerator};
pub use prompt::extract_code;

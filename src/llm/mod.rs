//! LLM integration module

pub mod gemini;
pub mod prompts;
pub mod provider;
pub mod response;

pub use gemini::GeminiClient;
pub use provider::LlmProvider;
pub use response::extract_sql;

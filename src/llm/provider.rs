//! Abstraction over hosted text-generation models

use crate::error::Result;
use async_trait::async_trait;

/// A model that answers a two-part prompt: fixed instructions, then the
/// user's question.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, instructions: &str, question: &str) -> Result<String>;

    /// Model identifier shown in reports
    fn name(&self) -> &str;
}

#[async_trait]
impl<P: LlmProvider + ?Sized> LlmProvider for Box<P> {
    async fn generate(&self, instructions: &str, question: &str) -> Result<String> {
        (**self).generate(instructions, question).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

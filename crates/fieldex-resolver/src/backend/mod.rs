//! Completion backend implementations.

pub mod mock;
pub mod openai;

use std::future::Future;

use crate::prompt::Prompt;
use crate::Result;

/// Trait for LLM completion backends.
///
/// A backend turns one rendered prompt into the raw text of the model's
/// reply. Decoding the reply is left to the caller so every backend shares
/// the same response contract.
pub trait CompletionBackend: Send + Sync {
    /// Send the prompt and return the raw completion text.
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<String>> + Send;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

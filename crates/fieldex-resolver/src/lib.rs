//! LLM fallback layer for fieldex.
//!
//! This crate resolves fields the heuristic layer could not settle with a
//! single batched completion call:
//! - `BatchResolver` builds the prompt and decodes the reply
//! - `OpenAiBackend` talks to an OpenAI-compatible chat-completions endpoint
//! - `MockBackend` returns canned replies for tests
//!
//! Resolution never fails outward: any error degrades to null values for
//! every requested field (see [`ResolveOutcome`]).

mod backend;
mod error;
mod prompt;
mod resolver;
mod response;
mod types;

pub use backend::CompletionBackend;
pub use backend::mock::MockBackend;
pub use backend::openai::{OpenAiBackend, DEFAULT_ENDPOINT, DEFAULT_MODEL};
pub use error::ResolverError;
pub use prompt::{build_prompt, truncate_document, Prompt, DEFAULT_MAX_DOC_CHARS, TRUNCATION_MARKER};
pub use resolver::{BatchResolver, ResolveOutcome, Resolver};
pub use response::parse_resolutions;
pub use types::{FieldResolution, ResolveRequest, Resolutions, ResolverMetadata, UncertainField};

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

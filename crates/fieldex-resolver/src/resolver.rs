//! Batched field resolution.

use std::future::Future;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::CompletionBackend;
use crate::prompt::{build_prompt, DEFAULT_MAX_DOC_CHARS};
use crate::response::parse_resolutions;
use crate::types::{FieldResolution, ResolveRequest, Resolutions};

/// Outcome of a resolution attempt.
///
/// Both variants carry one entry per requested field, so callers can merge
/// the resolutions without caring how the call went.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The backend answered and the reply was decoded.
    Resolved(Resolutions),
    /// The call failed; every requested field is unresolved.
    Degraded {
        resolutions: Resolutions,
        reason: String,
    },
}

impl ResolveOutcome {
    /// Degraded outcome with an unresolved entry for each of `fields`.
    pub fn degraded<'a>(fields: impl IntoIterator<Item = &'a str>, reason: impl Into<String>) -> Self {
        ResolveOutcome::Degraded {
            resolutions: fields
                .into_iter()
                .map(|name| (name.to_string(), FieldResolution::unresolved()))
                .collect(),
            reason: reason.into(),
        }
    }

    pub fn resolutions(&self) -> &Resolutions {
        match self {
            ResolveOutcome::Resolved(resolutions) => resolutions,
            ResolveOutcome::Degraded { resolutions, .. } => resolutions,
        }
    }

    pub fn into_resolutions(self) -> Resolutions {
        match self {
            ResolveOutcome::Resolved(resolutions) => resolutions,
            ResolveOutcome::Degraded { resolutions, .. } => resolutions,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ResolveOutcome::Degraded { .. })
    }

    /// Failure reason for degraded outcomes.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Resolved(_) => None,
            ResolveOutcome::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Trait for anything that can resolve uncertain fields.
///
/// Implementations must not fail: errors are reported through
/// [`ResolveOutcome::Degraded`].
pub trait Resolver: Send + Sync {
    fn resolve(&self, request: &ResolveRequest) -> impl Future<Output = ResolveOutcome> + Send;
}

/// Resolver issuing one batched prompt per request.
pub struct BatchResolver<B: CompletionBackend> {
    backend: B,
    max_doc_chars: usize,
    max_output_tokens: u32,
}

impl<B: CompletionBackend> BatchResolver<B> {
    /// Create a resolver with default prompt limits.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_doc_chars: DEFAULT_MAX_DOC_CHARS,
            max_output_tokens: 500,
        }
    }

    /// Set the document character cap.
    pub fn with_max_doc_chars(mut self, max_doc_chars: usize) -> Self {
        self.max_doc_chars = max_doc_chars;
        self
    }

    /// Set the generated token cap.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: CompletionBackend> Resolver for BatchResolver<B> {
    async fn resolve(&self, request: &ResolveRequest) -> ResolveOutcome {
        if request.is_empty() {
            return ResolveOutcome::Resolved(Resolutions::new());
        }

        let start = Instant::now();
        let prompt = build_prompt(request, self.max_doc_chars, self.max_output_tokens);

        debug!(
            "Resolving {} fields via {} backend",
            request.fields.len(),
            self.backend.name()
        );

        let raw = match self.backend.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("LLM resolution failed: {}", e);
                return ResolveOutcome::degraded(request.field_names(), e.to_string());
            }
        };

        match parse_resolutions(&raw, request.field_names()) {
            Ok(resolutions) => {
                let resolved = resolutions.values().filter(|r| r.value.is_some()).count();
                info!(
                    "LLM resolved {}/{} fields in {}ms",
                    resolved,
                    request.fields.len(),
                    start.elapsed().as_millis()
                );
                ResolveOutcome::Resolved(resolutions)
            }
            Err(e) => {
                warn!("Failed to parse LLM reply: {}", e);
                ResolveOutcome::degraded(request.field_names(), e.to_string())
            }
        }
    }
}

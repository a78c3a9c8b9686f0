//! Core library for schema-driven field extraction from documents.
//!
//! This crate provides:
//! - PDF layout extraction (positioned text lines)
//! - Anchor heuristics with scoring and top-k selection
//! - A per-label knowledge base that learns anchors, enums and regions
//! - The extraction pipeline with a time-budgeted LLM fallback

pub mod error;
pub mod heuristics;
pub mod kb;
pub mod layout;
pub mod models;
pub mod normalize;
pub mod pipeline;

pub use error::{FieldexError, LayoutError, Result, StoreError};
pub use models::{validate_schema, Schema};
pub use models::config::{FieldexConfig, LayoutConfig, PipelineConfig, ResolverConfig, StoreConfig};
pub use models::output::{ExtractionMetadata, ExtractionOutput, ExtractionRun, FieldValues, RunReport, StageStatus};
pub use heuristics::{Candidate, FieldHints, FieldMatcher, Method, Selection};
pub use kb::{Evidence, Feedback, FileKbStore, KbStore, KnowledgeBase, MemoryKbStore};
pub use layout::{extract_layout_with_timeout, DocumentLayout, LayoutExtractor, LayoutOutcome, Line, PdfLayoutExtractor};
pub use normalize::{normalize_for_matching, normalize_for_output};
pub use pipeline::{ExtractionRequest, Pipeline};

/// Re-export resolver types.
pub use fieldex_resolver::{BatchResolver, CompletionBackend, MockBackend, OpenAiBackend, ResolveOutcome, Resolver};

//! Error types for the fieldex-core library.

use thiserror::Error;

/// Main error type for the fieldex library.
#[derive(Error, Debug)]
pub enum FieldexError {
    /// Layout extraction error.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Knowledge base persistence error.
    #[error("knowledge base error: {0}")]
    Store(#[from] StoreError),

    /// Error from the resolver layer.
    #[error("resolver error: {0}")]
    Resolver(#[from] fieldex_resolver::ResolverError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to document layout extraction.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from the PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Extraction did not finish within the deadline.
    #[error("layout extraction timed out after {0:.1}s")]
    Timeout(f64),
}

/// Errors related to knowledge base persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing a record failed.
    #[error("I/O error for label '{label}': {source}")]
    Io {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("invalid record for label '{label}': {source}")]
    Json {
        label: String,
        #[source]
        source: serde_json::Error,
    },

    /// The temporary file could not replace the record.
    #[error("failed to persist record for label '{label}': {reason}")]
    Persist { label: String, reason: String },
}

/// Result type for the fieldex library.
pub type Result<T> = std::result::Result<T, FieldexError>;

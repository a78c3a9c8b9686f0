//! Subcommands and the input handling they share.

pub mod batch;
pub mod config;
pub mod extract;
pub mod kb;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use fieldex_core::{
    extract_layout_with_timeout, validate_schema, BatchResolver, DocumentLayout, FieldexConfig,
    FileKbStore, OpenAiBackend, PdfLayoutExtractor, Pipeline, Schema, StageStatus,
};

/// Pipeline wired to the on-disk knowledge base and the OpenAI-compatible backend.
pub type CliPipeline = Pipeline<FileKbStore, BatchResolver<OpenAiBackend>>;

/// Document extensions accepted by `extract` and `batch`.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "json"];

/// Configuration file under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldex")
        .join("config.json")
}

/// The `--config` path, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration from `--config` or the default location.
///
/// A missing file yields defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<FieldexConfig> {
    let path = config_path(explicit);
    if path.exists() {
        debug!("Loading config from {}", path.display());
        Ok(FieldexConfig::from_file(&path)?)
    } else {
        Ok(FieldexConfig::default())
    }
}

/// Parse a schema given inline (`{...}`) or as a path to a JSON file.
pub fn parse_schema(arg: &str) -> anyhow::Result<Schema> {
    let content = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        fs::read_to_string(arg)
            .map_err(|e| anyhow::anyhow!("Failed to read schema file {}: {}", arg, e))?
    };

    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Schema is not valid JSON: {}", e))?;

    let Some(object) = value.as_object() else {
        anyhow::bail!("Schema must be a JSON object of field name to description");
    };

    let mut schema = Schema::new();
    for (name, description) in object {
        let Some(description) = description.as_str() else {
            anyhow::bail!("Schema description for '{}' must be a string", name);
        };
        schema.insert(name.clone(), description.to_string());
    }

    validate_schema(&schema)?;
    Ok(schema)
}

/// Reject labels that cannot name a knowledge base.
pub fn validate_label(label: &str) -> anyhow::Result<()> {
    if label.trim().is_empty() {
        anyhow::bail!("Label must not be empty");
    }
    Ok(())
}

/// Turn a document into positioned lines.
///
/// PDFs go through the layout extractor under the remaining budget; `.json`
/// files are read as a pre-extracted layout.
pub async fn load_document(
    path: &Path,
    config: &FieldexConfig,
    started: Instant,
) -> anyhow::Result<DocumentLayout> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let data = fs::read(path)?;
    if data.is_empty() {
        anyhow::bail!("Input file is empty: {}", path.display());
    }

    let layout = match extension.as_str() {
        "pdf" => {
            let extractor = Arc::new(PdfLayoutExtractor::new().with_y_tolerance(config.layout.y_tolerance));
            let budget = config.pipeline.timeout().saturating_sub(started.elapsed());
            let outcome = extract_layout_with_timeout(extractor, data, budget).await;

            if let StageStatus::Degraded(reason) | StageStatus::Failed(reason) = outcome.status {
                anyhow::bail!("Failed to extract text from {}: {}", path.display(), reason);
            }
            outcome.layout
        }
        "json" => DocumentLayout::from_json(&data)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?,
        _ => anyhow::bail!("Unsupported file format: {}", extension),
    };

    if layout.is_empty() {
        anyhow::bail!("No text lines found in {}", path.display());
    }

    debug!(
        "Loaded {} lines from {} ({} pages)",
        layout.lines.len(),
        path.display(),
        layout.page_count
    );

    Ok(layout)
}

/// Build the pipeline from configuration.
pub fn build_pipeline(
    config: &FieldexConfig,
    kb_dir: Option<&Path>,
    no_llm: bool,
) -> anyhow::Result<CliPipeline> {
    let backend = OpenAiBackend::from_env(
        config.resolver.endpoint.as_str(),
        config.resolver.model.as_str(),
        &config.resolver.api_key_env,
        config.resolver.timeout(),
    )?;
    let resolver = BatchResolver::new(backend)
        .with_max_doc_chars(config.resolver.max_doc_chars)
        .with_max_output_tokens(config.resolver.max_output_tokens);

    let mut pipeline_config = config.pipeline.clone();
    if no_llm {
        pipeline_config.fallback_enabled = false;
    }

    let store = FileKbStore::new(kb_dir.unwrap_or(config.store.kb_dir.as_path()));
    Ok(Pipeline::new(store, resolver).with_config(pipeline_config))
}

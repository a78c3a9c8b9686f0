//! Batch command - extract fields from many documents of one label.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use fieldex_core::{ExtractionOutput, ExtractionRequest, FieldexConfig, Schema};

use super::{
    build_pipeline, load_config, load_document, parse_schema, validate_label, CliPipeline,
    DOCUMENT_EXTENSIONS,
};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input glob pattern
    #[arg(required = true)]
    input: String,

    /// Knowledge base label (document type)
    #[arg(short, long)]
    label: String,

    /// Schema as inline JSON or a path to a JSON file
    #[arg(short, long)]
    schema: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Knowledge base directory (overrides config)
    #[arg(long)]
    kb_dir: Option<PathBuf>,

    /// Never call the LLM fallback
    #[arg(long)]
    no_llm: bool,
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    output: Option<ExtractionOutput>,
    error: Option<String>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    validate_label(&args.label)?;
    let schema = parse_schema(&args.schema)?;

    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = build_pipeline(&config, args.kb_dir.as_deref(), args.no_llm)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    // Sequential so each run learns from the previous ones
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let result = process_file(&path, &args.label, &schema, &config, &pipeline).await;

        match result {
            Ok(output) => {
                if let Some(output_dir) = &args.output_dir {
                    write_output(output_dir, &path, &output)?;
                }
                results.push(FileResult {
                    path,
                    output: Some(output),
                    error: None,
                });
            }
            Err(e) => {
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(FileResult {
                        path,
                        output: None,
                        error: Some(error_msg),
                    });
                } else {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    pb.abandon();
                    anyhow::bail!("Processing failed: {}", error_msg);
                }
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

async fn process_file(
    path: &Path,
    label: &str,
    schema: &Schema,
    config: &FieldexConfig,
    pipeline: &CliPipeline,
) -> anyhow::Result<ExtractionOutput> {
    let started = Instant::now();
    let layout = load_document(path, config, started).await?;

    let request = ExtractionRequest::new(label, schema, &layout).with_started(started);
    let run = pipeline.run(request).await;

    Ok(run.output)
}

fn write_output(output_dir: &Path, input: &Path, output: &ExtractionOutput) -> anyhow::Result<()> {
    let name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let output_path = output_dir.join(format!("{}.json", name));

    fs::write(&output_path, serde_json::to_string_pretty(output)?)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "filled_fields",
        "total_fields",
        "llm_used",
        "processing_time",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(output) = &result.output {
            wtr.write_record([
                filename,
                "success",
                &output.filled_count().to_string(),
                &output.fields.len().to_string(),
                &output.metadata.llm_used.to_string(),
                &format!("{:.3}", output.metadata.processing_time),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

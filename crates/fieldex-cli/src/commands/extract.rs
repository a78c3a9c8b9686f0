//! Extract command - pull schema fields from a single document.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use fieldex_core::{ExtractionOutput, ExtractionRequest, RunReport};

use super::{build_pipeline, load_config, load_document, parse_schema, validate_label};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input document (PDF or layout JSON)
    #[arg(required = true)]
    input: PathBuf,

    /// Knowledge base label (document type)
    #[arg(short, long)]
    label: String,

    /// Schema as inline JSON or a path to a JSON file
    #[arg(short, long)]
    schema: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Knowledge base directory (overrides config)
    #[arg(long)]
    kb_dir: Option<PathBuf>,

    /// Never call the LLM fallback
    #[arg(long)]
    no_llm: bool,

    /// Print the run report to stderr
    #[arg(long)]
    show_report: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let started = Instant::now();

    let config = load_config(config_path)?;
    validate_label(&args.label)?;
    let schema = parse_schema(&args.schema)?;

    info!("Processing file: {}", args.input.display());

    let layout = load_document(&args.input, &config, started).await?;
    let pipeline = build_pipeline(&config, args.kb_dir.as_deref(), args.no_llm)?;

    let request = ExtractionRequest::new(&args.label, &schema, &layout).with_started(started);
    let run = pipeline.run(request).await;

    let output = format_output(&run.output, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_report {
        print_report(&run.report);
    }

    debug!("Total processing time: {:?}", started.elapsed());

    Ok(())
}

pub fn format_output(output: &ExtractionOutput, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(output)?),
        OutputFormat::Text => Ok(format_text(output)),
    }
}

fn format_text(output: &ExtractionOutput) -> String {
    let width = output.fields.keys().map(|k| k.chars().count()).max().unwrap_or(0);

    let mut text = String::new();
    for (field, value) in &output.fields {
        text.push_str(&format!(
            "{:width$}  {}\n",
            field,
            value.as_deref().unwrap_or("-"),
            width = width
        ));
    }
    text.push('\n');
    text.push_str(&format!(
        "{}/{} fields in {:.2}s{}",
        output.filled_count(),
        output.fields.len(),
        output.metadata.processing_time,
        if output.metadata.llm_used { " (llm)" } else { "" }
    ));
    text
}

fn print_report(report: &RunReport) {
    eprintln!();
    if report.uncertain_fields.is_empty() {
        eprintln!("{} Heuristics settled every field", style("ℹ").blue());
    } else {
        eprintln!(
            "{} Uncertain after heuristics: {}",
            style("ℹ").blue(),
            report.uncertain_fields.join(", ")
        );
    }
    eprintln!("{} Fallback: {}", style("ℹ").blue(), report.fallback);
    eprintln!("{} Knowledge base: {}", style("ℹ").blue(), report.kb_update);
}

//! Kb command - inspect and manage per-label knowledge bases.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use fieldex_core::{FileKbStore, KbStore};

use super::{load_config, parse_schema, validate_label};

/// Arguments for the kb command.
#[derive(Args)]
pub struct KbArgs {
    /// Knowledge base directory (overrides config)
    #[arg(long, global = true)]
    kb_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: KbCommand,
}

#[derive(Subcommand)]
enum KbCommand {
    /// List labels with a stored knowledge base
    List,

    /// Print the knowledge base of a label
    Show {
        /// Label
        label: String,
    },

    /// Seed anchors for a label from a schema
    Init {
        /// Label
        label: String,

        /// Schema as inline JSON or a path to a JSON file
        #[arg(short, long)]
        schema: String,
    },

    /// Delete the knowledge base of a label
    Reset {
        /// Label
        label: String,
    },

    /// Show the knowledge base directory
    Path,
}

pub async fn run(args: KbArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dir = args.kb_dir.unwrap_or(config.store.kb_dir);
    let store = FileKbStore::new(dir);

    match args.command {
        KbCommand::List => list_labels(&store),
        KbCommand::Show { label } => show_label(&store, &label),
        KbCommand::Init { label, schema } => init_label(&store, &label, &schema),
        KbCommand::Reset { label } => reset_label(&store, &label),
        KbCommand::Path => show_path(&store),
    }
}

fn list_labels(store: &FileKbStore) -> anyhow::Result<()> {
    let labels = store.labels()?;

    if labels.is_empty() {
        println!(
            "{} No knowledge bases in {}",
            style("ℹ").blue(),
            store.dir().display()
        );
        return Ok(());
    }

    for label in labels {
        let kb = store.load(&label)?;
        println!("{}  ({} fields)", label, kb.fields().len());
    }

    Ok(())
}

fn show_label(store: &FileKbStore, label: &str) -> anyhow::Result<()> {
    validate_label(label)?;
    let kb = store.load(label)?;

    if kb.is_empty() {
        anyhow::bail!("No knowledge base for label '{}'", label);
    }

    println!("{}", serde_json::to_string_pretty(&kb)?);
    Ok(())
}

fn init_label(store: &FileKbStore, label: &str, schema: &str) -> anyhow::Result<()> {
    validate_label(label)?;
    let schema = parse_schema(schema)?;
    let kb = store.init_from_schema(label, &schema)?;

    println!(
        "{} Seeded '{}' with anchors for {} fields at {}",
        style("✓").green(),
        label,
        kb.anchors.len(),
        store.path_for(label).display()
    );

    Ok(())
}

fn reset_label(store: &FileKbStore, label: &str) -> anyhow::Result<()> {
    validate_label(label)?;

    if store.remove(label)? {
        println!("{} Removed knowledge base for '{}'", style("✓").green(), label);
    } else {
        println!(
            "{} No knowledge base for '{}'",
            style("ℹ").blue(),
            label
        );
    }

    Ok(())
}

fn show_path(store: &FileKbStore) -> anyhow::Result<()> {
    println!("Knowledge base directory: {}", store.dir().display());

    if store.dir().exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
    }

    Ok(())
}

//! Ingest CLI - runs the pipeline over a local file and prints what came out

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ingest::{ingest_with, IngestOptions, Ingestion};

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Normalizes an accounting spreadsheet into case rows")]
struct Args {
    /// Path to a CSV or workbook file
    #[arg(long)]
    file: PathBuf,

    /// Declared MIME type, used when the extension is missing
    #[arg(long)]
    mime: Option<String>,

    /// Print the full result as JSON instead of a summary
    #[arg(long, default_value = "false")]
    json: bool,

    /// Year used for generated case ids (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Rows to preview per sheet
    #[arg(long, default_value = "3")]
    preview: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut options = IngestOptions::default();
    if let Some(year) = args.year {
        options.year = year;
    }

    let ingestion = ingest_with(&bytes, &file_name, args.mime.as_deref(), options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ingestion)?);
    } else {
        print_summary(&ingestion, args.preview);
    }

    Ok(())
}

fn print_summary(ingestion: &Ingestion, preview: usize) {
    println!("=== Ingest ===");
    println!("File: {}", ingestion.file_name);
    println!("Size: {} bytes", ingestion.size);
    println!("Sheets: {}", ingestion.sheets.len());

    for sheet in ingestion.sheets.values() {
        println!("\nSheet '{}': {} rows", sheet.name, sheet.rows.len());
        println!("Columns ({}):", sheet.headers.len());
        for (i, h) in sheet.headers.iter().enumerate() {
            println!("  [{:2}] {}", i, h);
        }

        for (i, row) in sheet.rows.iter().take(preview).enumerate() {
            let cells: Vec<String> = row
                .iter()
                .map(|(column, value)| format!("{}={}", column, value))
                .collect();
            println!("  [{}] {}", i + 1, cells.join(" | "));
        }
        if sheet.rows.len() > preview {
            println!("  ... and {} more", sheet.rows.len() - preview);
        }
    }

    if !ingestion.warnings.is_empty() {
        println!("\nWarnings ({}):", ingestion.warnings.len());
        for (i, warning) in ingestion.warnings.iter().enumerate() {
            println!("  [{}] {}", i + 1, warning);
        }
    }

    println!("\n=== Ingest Complete ===");
    println!("Rows: {}", ingestion.total_rows());
}

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use content_activator::audit::FileLogStore;
use content_activator::config;

/// Print the latest activation log recorded for an entry.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Read this JSON-lines file instead of the configured one
    #[arg(long)]
    file: Option<PathBuf>,

    /// Content entry ID
    #[arg(long)]
    entry_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = match args.file {
        Some(path) => path,
        None => config::load(Some(&args.config))?.activation_log_path(),
    };
    let store = FileLogStore::new(&path);
    let Some(log) = store.read_latest(&args.entry_id).await? else {
        bail!("no activation log for '{}' in {}", args.entry_id, path.display());
    };

    println!("Activation: {}", log.activation_id);
    println!("Status:     {}", log.status.as_str());
    println!("Timestamp:  {}", log.timestamp.to_rfc3339());
    println!("Duration:   {:.3}s", log.processing_time);
    println!("Stages:");
    for t in &log.transitions {
        match &t.detail {
            Some(detail) => println!("  {:<10} {:?} ({})", t.stage.as_str(), t.outcome, detail),
            None => println!("  {:<10} {:?}", t.stage.as_str(), t.outcome),
        }
    }
    if !log.errors.is_empty() {
        println!("Errors:");
        for err in &log.errors {
            println!("  - {err}");
        }
    }
    println!("{}", serde_json::to_string_pretty(&log)?);
    Ok(())
}

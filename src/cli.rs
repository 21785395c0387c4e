//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;

use vaultscan::analysis::{AnalyzeOptions, Analyzer};
use vaultscan::config::load_settings;
use vaultscan::server;
use vaultscan::storage::MemoryStore;

#[derive(Parser)]
#[command(name = "vaultscan")]
#[command(about = "Document analysis service for family record vaults")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a stored document and print the extraction JSON
    Analyze {
        /// Storage key of the uploaded document
        key: String,
        /// Preview mode: page 1 only, no vision fusion
        #[arg(short, long)]
        preview: bool,
        /// Analyze a local file instead of fetching from storage
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// Start the analysis HTTP server
    Serve {
        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Report which pipeline stages are configured
    Check,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, _config) = load_settings(cli.config.as_deref()).await;

    match cli.command {
        Commands::Analyze {
            key,
            preview,
            local,
        } => {
            let mut analyzer = Analyzer::from_settings(&settings);
            if let Some(path) = local {
                let bytes = std::fs::read(&path)?;
                let mut store = MemoryStore::new();
                store.insert_detected(key.clone(), bytes);
                analyzer = analyzer.with_store(Arc::new(store));
            }

            let options = AnalyzeOptions {
                preview_only: preview,
            };
            let result = analyzer.analyze(&key, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Serve { host, port } => server::serve(&settings, &host, port).await,

        Commands::Check => {
            let caps = settings.capabilities();
            let report = |name: &str, enabled: bool, hint: &str| {
                if enabled {
                    println!("{} {}", style("✓").green(), name);
                } else {
                    println!("{} {} ({})", style("✗").red(), name, hint);
                }
            };
            report(
                "object storage",
                caps.storage,
                "set AWS credentials and VAULTSCAN_BUCKET",
            );
            report("OCR (Textract)", caps.ocr, "set AWS credentials");
            report("vision fusion", caps.vision, "set OPENAI_API_KEY");
            if which::which("pdftoppm").is_ok() {
                println!("{} PDF preview rendering (pdftoppm)", style("✓").green());
            } else {
                println!(
                    "{} PDF preview rendering (install poppler-utils for pdftoppm)",
                    style("✗").red()
                );
            }
            Ok(())
        }
    }
}

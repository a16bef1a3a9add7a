use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod alerts;
mod cluster;
mod config;
mod db;
mod engine;
mod error;
mod ingest;
mod institute;
mod llm;
mod models;
mod report;
mod routes;
mod server;
mod state;
mod store;

use config::Config;
use models::{ExportFormat, DEFAULT_INSTITUTE};
use state::AppState;

#[derive(Parser)]
#[command(name = "aits-insights")]
#[command(about = "Feedback aggregation and insight service for the AITS portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Load the demo institute and feedback before serving
        #[arg(long)]
        seed: bool,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import feedback from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = DEFAULT_INSTITUTE)]
        institute: String,
    },
    /// Cluster an institute's feedback and commit the results
    Process {
        #[arg(long, default_value = DEFAULT_INSTITUTE)]
        institute: String,
    },
    /// Write a report of the latest results
    Report {
        #[arg(long, default_value = DEFAULT_INSTITUTE)]
        institute: String,
        #[arg(long, default_value = "md")]
        format: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    // Only `serve` may fall back to the in-memory store.
    if !matches!(cli.command, Commands::Serve { .. }) {
        config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")?;
    }

    match cli.command {
        Commands::Serve { port, seed } => {
            if let Some(port) = port {
                config.port = port;
            }
            let store = state::open_store(&config).await?;
            if seed {
                let inserted = ingest::seed(store.as_ref()).await?;
                println!("Seed data inserted ({inserted} feedback items).");
            }
            server::start_server(AppState::new(config, store)).await?;
        }
        Commands::InitDb => {
            state::open_store(&config).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = state::open_store(&config).await?;
            let inserted = ingest::seed(store.as_ref()).await?;
            println!("Seed data inserted ({inserted} feedback items).");
        }
        Commands::Import { csv, institute } => {
            let store = state::open_store(&config).await?;
            let summary = ingest::import_csv(store.as_ref(), &csv, &institute).await?;
            println!(
                "Inserted {} feedback items from {} ({} skipped).",
                summary.inserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Process { institute } => {
            let store = state::open_store(&config).await?;
            let state = AppState::new(config, store);
            let set = state.engine.process(&institute).await?;

            if set.clusters.is_empty() {
                println!("No feedback found for {institute}.");
                return Ok(());
            }

            println!("Themes for {institute} by volume:");
            for cluster in set.clusters.iter() {
                println!(
                    "- {} ({} reports, {}): {}",
                    cluster.theme,
                    cluster.count,
                    cluster.primary_sentiment(),
                    cluster.problem_statement
                );
            }
        }
        Commands::Report {
            institute,
            format,
            out,
        } => {
            let format: ExportFormat = format.parse().map_err(|e: String| anyhow!(e))?;
            let store = state::open_store(&config).await?;
            let lexicon = alerts::UrgencyLexicon::new(&config.urgency_terms);
            let set = store
                .latest_clusters(&institute)
                .await?
                .filter(|set| !set.clusters.is_empty())
                .with_context(|| format!("no analysis results for {institute}, run `process` first"))?;

            let report = report::render(&set, format, &lexicon)?;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

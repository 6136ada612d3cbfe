//! Rift CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "rift")]
#[command(about = "Structural, semantics-aware diffs of code graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding rift.toml and the graph store (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two checkouts and print per-file risk
    Diff {
        /// Old snapshot directory
        old: PathBuf,

        /// New snapshot directory
        new: PathBuf,

        /// Repository id used for graph storage
        #[arg(long)]
        repo: Option<String>,

        /// Unified diff (`git diff` output) supplying hunks and file statuses
        #[arg(long)]
        patch: Option<PathBuf>,

        /// Also list new-side nodes matching this query
        #[arg(long)]
        search: Option<String>,

        /// Print summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every stored graph
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("rift={log_level}")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = rift_core::RiftConfig::load(&cli.root)?;
    tracing::debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Diff {
            old,
            new,
            repo,
            patch,
            search,
            json,
        } => {
            let options = commands::DiffOptions {
                repo,
                patch,
                search,
                json,
            };
            commands::diff(&cli.root, &config, old, new, options).await
        }
        Commands::Clear => commands::clear(&cli.root, &config).await,
        Commands::Version => {
            println!("rift v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

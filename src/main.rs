//! PickGok AI CLI
//!
//! Track recommendation server backed by a precomputed embedding index.
//!
//! # Usage
//!
//! ```bash
//! # Start the server (reads models/music.index and models/metadata.json)
//! pickgok-ai serve --model-dir models --port 5000
//!
//! # Check an index and its metadata before deploying them
//! pickgok-ai inspect --index models/music.index --metadata models/metadata.json
//!
//! # Ask a running server for recommendations
//! pickgok-ai recommend --track-id 101 -k 5
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pickgok_ai::loader::{load, load_mapping};
use pickgok_ai::preflight;
use pickgok_ai::server::{serve, AppState};
use pickgok_ai::service::{RecommendRequest, RecommendResponse, RecommendService};
use pickgok_ai::{ServeArgs, ServerConfig};
use pickgok_core::{FlatIndex, VectorIndex};

#[derive(Parser)]
#[command(name = "pickgok-ai")]
#[command(about = "Track recommendation server backed by a precomputed embedding index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pre-flight gate, load resources and start the HTTP server
    Serve(ServeArgs),

    /// Display statistics about an index file and validate its metadata
    Inspect {
        /// Path to the vector index file
        #[arg(short, long)]
        index: PathBuf,

        /// Path to the metadata JSON file
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Request recommendations from a running server
    Recommend {
        /// Server URL
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,

        /// Seed track id
        #[arg(short, long)]
        track_id: i64,

        /// Number of recommendations (server default when omitted)
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = ServerConfig::try_from(args)?;

            let outcome = preflight::run(&config.preflight).context("pre-flight check failed")?;
            tracing::info!("Pre-flight outcome: {:?}", outcome);

            let resources = match load(&config.resources) {
                Ok(resources) => resources,
                Err(e) => {
                    tracing::error!("Failed to load resources: {}", e);
                    return Err(e).context("failed to load resources");
                }
            };

            let service = RecommendService::new(config.limits);
            service.publish(resources);
            tracing::info!(
                "Serving with default k {} (max {})",
                config.limits.default_k,
                config.limits.max_k
            );

            serve(AppState::new(service), config.bind_addr).await?;
        }

        Commands::Inspect { index, metadata } => {
            let flat = FlatIndex::open(&index)
                .with_context(|| format!("opening index {:?}", index))?;
            println!("Index File: {:?}", index);
            println!("  Vectors: {}", flat.len());
            println!("  Dimensions: {}", flat.dim());
            println!("  Metric: {}", flat.metric());
            println!(
                "  File Size: {:.2} MB",
                flat.store().memory_bytes() as f64 / (1024.0 * 1024.0)
            );

            if let Some(metadata) = metadata {
                let mapping = load_mapping(&metadata, flat.len())?;
                println!("Metadata File: {:?}", metadata);
                println!("  Mapped Tracks: {}", mapping.len());
                println!("  Unmapped Positions: {}", flat.len() - mapping.len());
            }
        }

        Commands::Recommend {
            server,
            track_id,
            k,
        } => {
            let client = reqwest::Client::new();
            let url = format!("{}/recommend", server.trim_end_matches('/'));

            let response = client
                .post(&url)
                .json(&RecommendRequest { track_id, k })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let error: serde_json::Value = response.json().await?;
                eprintln!("Error ({}): {}", status, error);
                std::process::exit(1);
            }

            let result: RecommendResponse = response.json().await?;
            println!("Seed: {}", result.seed);
            println!("Recommendations:");
            for (rank, rec) in result.recommendations.iter().enumerate() {
                println!(
                    "  {:>2}. Track {}  distance {:.4}",
                    rank + 1,
                    rec.track_id,
                    rec.distance
                );
            }
        }
    }

    Ok(())
}

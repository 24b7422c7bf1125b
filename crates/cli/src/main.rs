//! Anomaly detector CLI
//!
//! Queries the detector's HTTP API for recorded anomalies and health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, health};

/// Latency/memory anomaly detector CLI
#[derive(Parser)]
#[command(name = "anomctl")]
#[command(author, version, about = "CLI for the latency/memory anomaly detector", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ANOMCTL_API_URL env var)
    #[arg(
        long,
        global = true,
        env = "ANOMCTL_API_URL",
        default_value = "http://localhost:5000"
    )]
    pub api_url: String,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recently detected anomalies, newest first
    Anomalies {
        /// Show at most this many anomalies
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show detector and component health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Anomalies { limit } => {
            anomalies::list_anomalies(&client, limit, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

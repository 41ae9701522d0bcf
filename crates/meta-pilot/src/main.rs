//! Meta Pilot command line entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use meta_pilot::storage::FileStorage;
use meta_pilot::{CreateIndexRequest, Pilot, PilotConfig};

/// Meta Pilot - Cluster metadata control plane
#[derive(Parser, Debug)]
#[command(name = "meta-pilot")]
#[command(about = "Index creation for the cluster metadata control plane")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an index from a JSON request file
    CreateIndex {
        /// Request file
        #[arg(short, long)]
        request: PathBuf,

        /// Seconds to wait for active shards, overrides the request
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the persisted cluster state
    State,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PilotConfig::from_file(path)?,
        None => PilotConfig::default(),
    };
    if let Some(data_dir) = &args.data_dir {
        config.cluster.data_dir = data_dir.clone();
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    // Initialize logging
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::CreateIndex { request, timeout } => {
            let content = tokio::fs::read_to_string(&request).await?;
            let mut request: CreateIndexRequest = serde_json::from_str(&content)?;
            if timeout.is_some() {
                request.timeout_secs = timeout;
            }

            let pilot = Pilot::new(config).await?;

            info!("Creating index [{}]", request.index);
            let response = pilot.create_index(request).await?;
            pilot.save().await?;

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::State => {
            let storage = FileStorage::new(&config.cluster.data_dir);
            let state = storage.load_or_create(&config.cluster.name).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

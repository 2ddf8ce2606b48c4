use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anchorsync_core::config::Config;
use anchorsync_core::core_codec::world_map;
use anchorsync_core::core_storage::MapStore;
use anchorsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use anchorsync_core::SyncNode;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

mod repl;

#[derive(Parser, Debug)]
#[command(name = "anchorsync")]
#[command(author, version, about = "Shared AR sketching session node", long_about = None)]
struct Args {
    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML config file (environment overrides still apply)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a session and read commands from stdin
    Run {
        /// Name shown to other peers
        #[arg(short, long, default_value = "anchorsync")]
        name: String,

        /// TCP address to accept peers on
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Peers to dial at startup, as host:port
        #[arg(short, long)]
        dial: Vec<String>,

        /// Directory holding the saved map
        #[arg(long)]
        data_dir: Option<String>,

        /// Disable UDP beacon discovery
        #[arg(long)]
        no_discovery: bool,
    },

    /// Print a summary of a saved map file
    Inspect {
        /// Map file (defaults to the configured map path)
        path: Option<String>,
    },

    /// Write the default configuration to a file
    InitConfig {
        path: String,
    },
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let path = expand(path);
            Config::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::from_env().context("failed to read config from environment")?,
    };
    Ok(config)
}

fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let mut log_config = LogConfig::from_config(&config.logging)?;

    if let Some(level) = &args.log_level {
        match level.parse::<LogLevel>() {
            Ok(level) => log_config.level = level,
            Err(e) => eprintln!("{}, keeping '{}'", e, log_config.level),
        }
    }
    if args.json_logs {
        log_config.json_format = true;
    }

    init_logging_with_config(log_config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    init_logging(&args, &config)?;

    match args.command {
        Command::Run {
            name,
            listen,
            dial,
            data_dir,
            no_discovery,
        } => {
            if let Some(listen) = listen {
                config.transport.listen_address = listen;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = expand(&dir);
            }
            if no_discovery {
                config.discovery.enabled = false;
            }
            run(config, name, dial).await
        }
        Command::Inspect { path } => {
            let path = path.map(|p| expand(&p)).unwrap_or_else(|| config.storage.map_path());
            inspect(&path)
        }
        Command::InitConfig { path } => {
            let path = expand(&path);
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn run(config: Config, name: String, peers: Vec<String>) -> Result<()> {
    let node = SyncNode::start(config, name).await?;
    println!("{} listening on {}", node.local(), node.listen_addr());

    for addr in peers {
        match node.dial(addr.clone()).await {
            Ok(info) => info!(peer = %info, addr = %addr, "Connected"),
            Err(e) => warn!(addr = %addr, error = %e, "Failed to connect"),
        }
    }

    let result = repl::run(&node).await;
    node.shutdown().await;
    result
}

#[derive(Serialize)]
struct AnchorSummary {
    name: String,
    id: String,
    position: [f32; 3],
    segment: Option<[[f32; 3]; 2]>,
}

#[derive(Serialize)]
struct MapSummary {
    path: String,
    tracking_bytes: usize,
    snapshot_bytes: Option<usize>,
    anchors: Vec<AnchorSummary>,
}

fn inspect(path: &Path) -> Result<()> {
    let blob = MapStore::new(path).load()?;
    let map = world_map::decode_vec(blob)
        .with_context(|| format!("{} is not a valid world map", path.display()))?;

    let summary = MapSummary {
        path: path.display().to_string(),
        tracking_bytes: map.tracking_data.len(),
        snapshot_bytes: map.snapshot.as_ref().map(|s| s.len()),
        anchors: map
            .anchors
            .iter()
            .map(|anchor| {
                let p = anchor.transform.position();
                AnchorSummary {
                    name: anchor.name.clone(),
                    id: anchor.id.to_string(),
                    position: [p.x, p.y, p.z],
                    segment: anchor
                        .segment()
                        .map(|(s, d)| [[s.x, s.y, s.z], [d.x, d.y, d.z]]),
                }
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

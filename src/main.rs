//! AirLog Server Binary
//!
//! Central hub accepting CO2 submissions and fanning the shared log out
//! to every connected client.

use airlog::config::ServerConfig;
use airlog::server::HubServer;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "airlog-server")]
#[command(about = "Centralized CO2 submission hub")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,

    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent client sessions
    #[arg(short, long)]
    max_clients: Option<usize>,

    /// Shared log file path
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if args.verbose {
            "airlog=debug,info"
        } else {
            "airlog=info,warn,error"
        })
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting AirLog Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if args.config.exists() {
        ServerConfig::from_file(&args.config)?
    } else {
        info!("Config file not found, using defaults");
        ServerConfig::default()
    };

    // Override config with CLI arguments
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(max_clients) = args.max_clients {
        config.server.max_clients = max_clients;
    }
    if let Some(log_file) = args.log_file {
        config.storage.log_path = log_file;
    }

    config.validate()?;

    info!("Listen address: {}", config.listen_addr());
    info!("Max clients: {}", config.server.max_clients);
    info!("Log file: {}", config.storage.log_path.display());
    info!("Timestamp timezone: {}", config.storage.timezone);

    let server = HubServer::new(config).await?;
    let shutdown = server.shutdown_handle();

    // Handle shutdown gracefully
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = shutdown_signal => {
            info!("Shutting down gracefully...");
            let _ = shutdown.send(());
        }
    }

    info!("AirLog Server stopped");
    Ok(())
}

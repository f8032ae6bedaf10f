//! Hungarian Water Temperature Service - Main Daemon
//!
//! Runs the water temperature integration inside a minimal host:
//! 1. Loads settings and stored config entries
//! 2. Creates the single config entry on first start
//! 3. Sets the entry up, retrying until the feed answers with valid data
//! 4. Refreshes every 30 minutes and keeps sensor states current
//! 5. Optionally serves sensor states over HTTP
//!
//! Usage:
//!   cargo run --release                     # Run without HTTP endpoint
//!   cargo run --release -- --endpoint 8080  # Also serve states on port 8080
//!   cargo run --release -- --config my.toml # Use another config file
//!
//! Environment:
//!   VIZHOMERSEKLET_CONFIG - config file path when --config is absent
//!   RUST_LOG              - log filter (default: info)

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use vizhomerseklet::config::{load_settings, resolve_config_path};
use vizhomerseklet::endpoint;
use vizhomerseklet::host::Host;
use vizhomerseklet::model::DOMAIN;

#[derive(Debug, Parser)]
#[command(name = "vizhomerseklet", version, about = "Hungarian water temperature sensors")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve sensor states over HTTP on this port
    #[arg(long, value_name = "PORT")]
    endpoint: Option<u16>,
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(&resolve_config_path(args.config))?;
    let host = Arc::new(Host::new(&settings)?);

    let entry = match host.config_entries.entries(DOMAIN).into_iter().next() {
        Some(entry) => {
            info!("Using stored config entry '{}' ({})", entry.title, entry.entry_id);
            entry
        }
        None => {
            let entry = host.configure()?;
            info!("Created config entry '{}' ({})", entry.title, entry.entry_id);
            entry
        }
    };

    if let Some(port) = args.endpoint.or(settings.endpoint.port) {
        let endpoint_host = Arc::clone(&host);
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, endpoint_host) {
                error!("Endpoint server error: {}", e);
            }
        });
    }

    info!("Poll interval: {} minutes", host.update_interval().as_secs() / 60);
    info!("Press Ctrl+C to stop");

    tokio::select! {
        result = host.setup_entry_with_retry(&entry.entry_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before setup completed");
            host.shutdown();
            return Ok(());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    host.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    info!("Magyar Vizek Hőmérséklete");

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

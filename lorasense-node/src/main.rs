use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::eyre;
use lorasense_core::GpsFix;
use lorasense_node::{
    Config, GpsConfig, NodeAgent, SensorsConfig, SharedFix, SimulatedThingy, spawn_nmea_reader,
    spawn_serial_reader,
};
use lorasense_radio::UdpRadio;
use lorasense_store::{CsvStore, MemoryStore, ReadingStore, SqliteStore, StorageConfig};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "lorasense-node")]
#[command(about = "Lorasense sensor node")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "lorasense-node.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "lorasense_node=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if config.node.id == lorasense_core::BASESTATION_ID {
        return Err(eyre!("node id {} is reserved for the basestation", config.node.id));
    }

    info!(
        id = config.node.id,
        capabilities = ?config.node.capabilities,
        group = %config.radio.group,
        port = config.radio.port,
        "Starting lorasense-node"
    );

    match config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            run_node(config, MemoryStore::default()).await?;
        }
        StorageConfig::Csv { ref dir } => {
            info!(dir = ?dir, "Using CSV storage");
            let store = CsvStore::new(dir).await?;
            run_node(config, store).await?;
        }
        StorageConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite storage");
            let store = SqliteStore::new(path).await?;
            run_node(config, store).await?;
        }
    }

    Ok(())
}

async fn run_node<S: ReadingStore>(config: Config, store: S) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();

    let radio = UdpRadio::open(&config.radio)?;
    let SensorsConfig::Simulated { interval_secs, .. } = config.sensors;
    let source = SimulatedThingy::new(Duration::from_secs(interval_secs));

    let mut agent = NodeAgent::new(config.agent(), radio, source, store);
    let mut gps_handle = None;

    match &config.gps {
        GpsConfig::None => info!("No GPS configured"),
        GpsConfig::Fixed { latitude, longitude } => {
            let fix = GpsFix::from_degrees(*latitude, *longitude)
                .ok_or_else(|| eyre!("fixed position {latitude}, {longitude} is off the globe"))?;
            info!(%fix, "Using fixed position");
            agent = agent.with_gps(Arc::new(SharedFix::fixed(fix)));
        }
        GpsConfig::Nmea { path, baud } => {
            info!(path = ?path, baud = ?baud, "Reading NMEA sentences");
            let fix = SharedFix::new();
            let handle = match baud {
                Some(baud) => spawn_serial_reader(
                    &path.to_string_lossy(),
                    *baud,
                    fix.clone(),
                    cancel.clone(),
                )?,
                None => {
                    let file = tokio::fs::File::open(path).await?;
                    spawn_nmea_reader(BufReader::new(file), fix.clone(), cancel.clone())
                }
            };
            gps_handle = Some(handle);
            agent = agent.with_gps(Arc::new(fix));
        }
    }

    let cancel_for_agent = cancel.clone();
    let mut agent_handle = tokio::spawn(async move { agent.run(cancel_for_agent).await });

    let result = tokio::select! {
        result = &mut agent_handle => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            agent_handle.await?
        }
    };
    cancel.cancel();

    if let Some(handle) = gps_handle {
        let _ = handle.await;
    }

    if let Err(e) = &result {
        error!(error = %e, "Node stopped");
    }
    result?;

    info!("lorasense-node shut down complete");
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;
use lorasense_base::{AppState, Basestation, Config, api};
use lorasense_radio::UdpRadio;
use lorasense_store::{
    CsvStore, MemoryStore, ReadingStore, SqliteStore, StorageConfig, StoredReading,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "lorasense-base")]
#[command(about = "Lorasense basestation")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "lorasense-base.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "lorasense_base=info".to_owned());
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

    info!(
        group = %config.radio.group,
        port = config.radio.port,
        http_addr = %config.server.http_addr,
        "Starting lorasense-base"
    );

    match config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            run_basestation(config, MemoryStore::default()).await?;
        }
        StorageConfig::Csv { ref dir } => {
            info!(dir = ?dir, "Using CSV storage");
            let store = CsvStore::new(dir).await?;
            run_basestation(config, store).await?;
        }
        StorageConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite storage");
            let store = SqliteStore::new(path).await?;
            run_basestation(config, store).await?;
        }
    }

    Ok(())
}

async fn run_basestation<S: ReadingStore>(config: Config, store: S) -> color_eyre::Result<()> {
    let cancel = CancellationToken::new();

    let radio = UdpRadio::open(&config.radio)?;
    let (tx, rx) = mpsc::channel(100);
    let station = Basestation::new(radio, config.basestation.clone()).with_sink(tx);

    let app = AppState {
        registry: station.registry(),
        state: station.state(),
    };

    // Spawn data collector task
    let cancel_for_collector = cancel.clone();
    let collector_handle = tokio::spawn(async move {
        run_data_collector(rx, store, cancel_for_collector).await;
    });

    // Spawn radio task; a radio failure shuts everything down
    let cancel_for_station = cancel.clone();
    let station_handle = tokio::spawn(async move {
        let result = station.run(cancel_for_station.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "Radio failure");
        }
        cancel_for_station.cancel();
        result
    });

    // HTTP server
    let http_addr = config.server.http_addr;
    let axum_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(axum_listener, api::router(app)).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }
    cancel.cancel();

    let _ = collector_handle.await;
    station_handle.await??;

    info!("lorasense-base shut down complete");
    Ok(())
}

async fn run_data_collector<S: ReadingStore>(
    mut rx: mpsc::Receiver<StoredReading>,
    store: S,
    cancel: CancellationToken,
) {
    info!("Data collector started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Data collector shutting down");
                break;
            }
            Some(stored) = rx.recv() => {
                let kind = stored.reading.kind();
                if let Err(e) = store.append(stored.node, &stored.reading).await {
                    error!(error = ?e, node = stored.node, %kind, "Failed to store reading");
                } else {
                    info!(node = stored.node, %kind, "Stored sensor reading");
                }
            }
        }
    }
}

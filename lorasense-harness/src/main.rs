use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lorasense_base::{Basestation, BasestationConfig};
use lorasense_core::{Capabilities, GpsFix, NodeId, SensorKind};
use lorasense_node::{AgentConfig, JoinPolicy, NodeAgent, SharedFix, SimulatedThingy};
use lorasense_radio::Ether;
use lorasense_store::{MemoryStore, ReadingStore, StoredReading};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lorasense-harness")]
#[command(about = "Run a basestation and simulated sensor nodes over an in-memory radio")]
struct Cli {
    /// Path to the harness configuration file
    #[arg(short, long, default_value = "lorasense-harness.toml")]
    config: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct HarnessConfig {
    node_count: usize,
    discovery_window_secs: u64,
    response_timeout_secs: u64,
    cycle_pause_secs: u64,
    sensor_interval_secs: u64,
    /// Probability that a station misses a frame
    loss_rate: f64,
    center_latitude: f64,
    center_longitude: f64,
    /// Stop after this long; runs until Ctrl+C when absent
    run_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            node_count: 4,
            discovery_window_secs: 10,
            response_timeout_secs: 2,
            cycle_pause_secs: 5,
            sensor_interval_secs: 1,
            loss_rate: 0.05,
            center_latitude: 55.9447,
            center_longitude: -3.1890,
            run_secs: None,
        }
    }
}

impl HarnessConfig {
    fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HarnessConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Spreads `count` positions on a grid roughly a kilometre across around the
/// center.
fn generate_node_positions(center: GpsFix, count: usize) -> Vec<GpsFix> {
    let side = (count as f64).sqrt().ceil().max(1.0) as usize;
    let step = 0.01 / side as f64;
    let lat0 = center.latitude.degrees() - 0.005;
    let lon0 = center.longitude.degrees() - 0.005;

    (0..count)
        .filter_map(|i| {
            let lat = lat0 + ((i / side) as f64 + 0.5) * step;
            let lon = lon0 + ((i % side) as f64 + 0.5) * step;
            GpsFix::from_degrees(lat, lon)
        })
        .collect()
}

/// Node `i` serves every kind but one, so every kind has a node that cannot
/// answer it.
fn node_capabilities(index: usize) -> Capabilities {
    let mut capabilities = Capabilities::all();
    if index > 0 {
        capabilities.remove(SensorKind::ALL[index % SensorKind::ALL.len()]);
    }
    capabilities
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "lorasense_harness=info,lorasense_base=info,lorasense_node=warn".to_owned()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading harness configuration");
        HarnessConfig::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        HarnessConfig::default()
    };

    if config.node_count == 0 || config.node_count > NodeId::MAX as usize {
        return Err(color_eyre::eyre::eyre!(
            "node_count must be between 1 and {}, got {}",
            NodeId::MAX,
            config.node_count
        ));
    }

    let center = GpsFix::from_degrees(config.center_latitude, config.center_longitude)
        .ok_or_else(|| color_eyre::eyre::eyre!("center position is off the globe"))?;

    info!(
        node_count = config.node_count,
        loss_rate = config.loss_rate,
        "Starting lorasense harness"
    );

    let ether = Ether::new(256).with_loss_rate(config.loss_rate);
    let cancel = CancellationToken::new();
    let store = MemoryStore::default();

    let (tx, rx) = mpsc::channel(100);
    let station = Basestation::new(
        ether.attach(),
        BasestationConfig {
            discovery_window_secs: config.discovery_window_secs,
            response_timeout_secs: config.response_timeout_secs,
            cycle_pause_secs: config.cycle_pause_secs,
        },
    )
    .with_sink(tx);
    let base_state = station.state();
    let registry = station.registry();

    let mut nodes = JoinSet::new();
    for (i, position) in generate_node_positions(center, config.node_count)
        .into_iter()
        .enumerate()
    {
        let id = (i + 1) as NodeId;
        let agent = NodeAgent::new(
            AgentConfig {
                id,
                capabilities: node_capabilities(i),
                join: JoinPolicy {
                    ack_timeout: Duration::from_secs(2),
                    max_attempts: 3,
                },
                reconnect: Duration::from_secs(2),
            },
            ether.attach(),
            SimulatedThingy::new(Duration::from_secs(config.sensor_interval_secs)),
            MemoryStore::default(),
        )
        .with_gps(Arc::new(SharedFix::fixed(position)));

        info!(id, %position, "Spawned node");
        let cancel = cancel.clone();
        nodes.spawn(async move { (id, agent.run(cancel).await) });
    }

    let collector_cancel = cancel.clone();
    let collector_store = store.clone();
    let collector_handle = tokio::spawn(async move {
        log_readings(rx, collector_store, collector_cancel).await;
    });

    let station_cancel = cancel.clone();
    let station_handle = tokio::spawn(async move {
        let result = station.run(station_cancel.clone()).await;
        station_cancel.cancel();
        result
    });

    let run_for = async {
        match config.run_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
        _ = run_for => info!("Run time elapsed, shutting down..."),
        _ = cancel.cancelled() => warn!("Basestation stopped"),
    }
    cancel.cancel();

    if let Err(e) = station_handle.await? {
        error!(error = %e, "Basestation failed");
    }
    while let Some(joined) = nodes.join_next().await {
        match joined {
            Ok((id, Ok(()))) => info!(id, "Node stopped"),
            Ok((id, Err(e))) => warn!(id, error = %e, "Node failed"),
            Err(e) => error!(error = %e, "Node task panicked"),
        }
    }
    let _ = collector_handle.await;

    let snapshot = base_state.snapshot().await;
    info!(
        joined = registry.len().await,
        cycles = snapshot.cycles,
        responses = snapshot.responses,
        timeouts = snapshot.timeouts,
        malformed = snapshot.malformed,
        stored = store.count().await.unwrap_or(0),
        "Harness shutdown complete"
    );
    Ok(())
}

async fn log_readings(
    mut rx: mpsc::Receiver<StoredReading>,
    store: MemoryStore,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(stored) = rx.recv() => {
                let reading = stored.reading;
                match reading.position {
                    Some(fix) => info!(
                        node = stored.node,
                        kind = %reading.kind(),
                        value = %reading.value,
                        position = %fix,
                        "Reading"
                    ),
                    None => info!(
                        node = stored.node,
                        kind = %reading.kind(),
                        value = %reading.value,
                        "Reading"
                    ),
                }
                if let Err(e) = store.append(stored.node, &reading).await {
                    error!(error = %e, "Failed to store reading");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_surround_the_center() {
        let center = GpsFix::from_degrees(10.0, 20.0).unwrap();
        let positions = generate_node_positions(center, 5);

        assert_eq!(positions.len(), 5);
        for fix in &positions {
            assert!((fix.latitude.degrees() - 10.0).abs() <= 0.005);
            assert!((fix.longitude.degrees() - 20.0).abs() <= 0.005);
        }
        assert_ne!(positions[0], positions[1]);
    }

    #[test]
    fn first_node_serves_everything() {
        assert_eq!(node_capabilities(0), Capabilities::all());
        assert!(!node_capabilities(2).contains(SensorKind::AirQuality));
        assert_eq!(node_capabilities(1).len(), 3);
    }
}

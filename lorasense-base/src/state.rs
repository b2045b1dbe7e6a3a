use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use lorasense_core::{NodeId, SensorKind, SensorReading};
use serde::Serialize;
use tokio::sync::Mutex;

/// Poll statistics for one node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeStats {
    pub responses: u64,
    pub timeouts: u64,
    pub malformed: u64,
    /// Most recent reading per kind.
    pub latest: BTreeMap<SensorKind, SensorReading>,
}

/// Point-in-time view of the basestation, as served on `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub cycles: u64,
    pub responses: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub uptime_secs: u64,
}

/// Shared state for tracking poll results.
pub struct BaseState {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    cycles: u64,
    nodes: HashMap<NodeId, NodeStats>,
    startup_time: Instant,
}

impl BaseState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                cycles: 0,
                nodes: HashMap::new(),
                startup_time: Instant::now(),
            })),
        }
    }

    pub async fn record_reading(&self, node: NodeId, reading: SensorReading) {
        let mut inner = self.inner.lock().await;
        let stats = inner.nodes.entry(node).or_default();
        stats.responses += 1;
        stats.latest.insert(reading.kind(), reading);
    }

    pub async fn record_timeout(&self, node: NodeId) {
        let mut inner = self.inner.lock().await;
        inner.nodes.entry(node).or_default().timeouts += 1;
    }

    pub async fn record_malformed(&self, node: NodeId) {
        let mut inner = self.inner.lock().await;
        inner.nodes.entry(node).or_default().malformed += 1;
    }

    pub async fn cycle_completed(&self) {
        self.inner.lock().await.cycles += 1;
    }

    pub async fn node_stats(&self, node: NodeId) -> NodeStats {
        let inner = self.inner.lock().await;
        inner.nodes.get(&node).cloned().unwrap_or_default()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock().await;

        let (responses, timeouts, malformed) =
            inner.nodes.values().fold((0, 0, 0), |(r, t, m), stats| {
                (r + stats.responses, t + stats.timeouts, m + stats.malformed)
            });

        StatusSnapshot {
            cycles: inner.cycles,
            responses,
            timeouts,
            malformed,
            uptime_secs: inner.startup_time.elapsed().as_secs(),
        }
    }
}

impl Default for BaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BaseState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

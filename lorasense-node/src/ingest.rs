use std::sync::Arc;
use std::time::Duration;

use lorasense_core::{Capabilities, NodeId, SensorReading};
use lorasense_store::ReadingStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::ReadingCache;
use crate::gps::GpsSource;
use crate::sensor::{SensorError, SensorSource};

/// Keeps the reading cache fed from a sensor source.
///
/// Connects (retrying every `reconnect` until it succeeds), subscribes to
/// `kinds`, and then publishes every decoded notification to the cache and
/// the local store. A lost connection sends it back to discovery.
pub struct Ingestor<S, St> {
    pub(crate) node: NodeId,
    pub(crate) kinds: Capabilities,
    pub(crate) source: S,
    pub(crate) store: St,
    pub(crate) cache: ReadingCache,
    pub(crate) gps: Option<Arc<dyn GpsSource>>,
    pub(crate) reconnect: Duration,
    pub(crate) connected: watch::Sender<bool>,
}

impl<S: SensorSource, St: ReadingStore> Ingestor<S, St> {
    #[instrument(name = "ingest", skip_all, fields(node = self.node))]
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if !self.discover(&cancel).await {
                break;
            }

            self.connected.send_replace(true);

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.source.disconnect().await;
                    break;
                }
                e = self.stream() => {
                    warn!(error = %e, "sensor source lost, rediscovering");
                    self.source.disconnect().await;
                    self.connected.send_replace(false);
                }
            }
        }

        self.connected.send_replace(false);
        info!("ingestion stopped");
    }

    /// Returns `false` when cancelled before a connection was made.
    async fn discover(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            let attempt = async {
                self.source.connect().await?;
                self.source.enable(self.kinds).await
            };

            match attempt.await {
                Ok(()) => {
                    info!(kinds = ?self.kinds, "sensor source connected");
                    return true;
                }
                Err(e) => {
                    debug!(error = %e, retry_in = ?self.reconnect, "sensor source not available");
                    self.source.disconnect().await;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.reconnect) => {}
            }
        }
    }

    // Only returns on a fatal source error.
    async fn stream(&mut self) -> SensorError {
        loop {
            let notification = match self.source.next_notification().await {
                Ok(n) => n,
                Err(SensorError::InvalidLength { kind, expected, len }) => {
                    warn!(%kind, expected, len, "dropping malformed notification");
                    continue;
                }
                Err(e) => return e,
            };

            let value = match self.source.decode(&notification) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable notification");
                    continue;
                }
            };

            let reading = SensorReading {
                value,
                position: self.gps.as_ref().and_then(|gps| gps.current_fix()),
                observed_at: notification.observed_at,
            };

            self.cache.publish(reading);

            if let Err(e) = self.store.append(self.node, &reading).await {
                error!(error = %e, kind = %reading.kind(), "failed to store local reading");
            } else {
                debug!(kind = %reading.kind(), value = %reading.value, "reading cached");
            }
        }
    }
}

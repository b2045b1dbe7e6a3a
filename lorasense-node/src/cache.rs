use std::sync::Arc;

use lorasense_core::{SensorKind, SensorReading};
use tokio::sync::watch;

/// Latest reading per sensor kind.
///
/// Each kind has a single slot: publishing replaces whatever was there and
/// reading never waits on the writer.
#[derive(Clone)]
pub struct ReadingCache {
    slots: Arc<[watch::Sender<Option<SensorReading>>; 4]>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(std::array::from_fn(|_| watch::channel(None).0)),
        }
    }

    fn slot(&self, kind: SensorKind) -> &watch::Sender<Option<SensorReading>> {
        &self.slots[kind as usize]
    }

    pub fn publish(&self, reading: SensorReading) {
        self.slot(reading.kind()).send_replace(Some(reading));
    }

    pub fn latest(&self, kind: SensorKind) -> Option<SensorReading> {
        *self.slot(kind).borrow()
    }

    /// Notified on every publish for `kind`.
    pub fn subscribe(&self, kind: SensorKind) -> watch::Receiver<Option<SensorReading>> {
        self.slot(kind).subscribe()
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lorasense_core::{NodeId, SensorKind, SensorReading};

use crate::{ReadingStore, StoredReading};

/// In-memory store.
/// Primarily intended for tests and the simulation harness.
#[derive(Clone, Default)]
pub struct MemoryStore {
    readings: Arc<Mutex<Vec<StoredReading>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("mutex poisoned: {0}")]
    MutexPoisoned(String),
}

impl<T> From<PoisonError<T>> for MemoryStoreError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStoreError::MutexPoisoned(err.to_string())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn append(&self, node: NodeId, reading: &SensorReading) -> Result<(), Self::Error> {
        let mut readings = self.readings.lock()?;
        readings.push(StoredReading {
            node,
            reading: *reading,
        });
        Ok(())
    }

    async fn records(&self, kind: SensorKind) -> Result<Vec<StoredReading>, Self::Error> {
        let readings = self.readings.lock()?;
        Ok(readings
            .iter()
            .filter(|r| r.reading.kind() == kind)
            .copied()
            .collect())
    }

    async fn count(&self) -> Result<usize, Self::Error> {
        Ok(self.readings.lock()?.len())
    }
}

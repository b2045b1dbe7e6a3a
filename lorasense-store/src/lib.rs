pub mod csv;
pub mod memory;
pub mod sqlite;

use std::path::PathBuf;

use async_trait::async_trait;
use lorasense_core::{NodeId, SensorKind, SensorReading};
use serde::{Deserialize, Serialize};

pub use csv::{CsvStore, CsvStoreError};
pub use memory::{MemoryStore, MemoryStoreError};
pub use sqlite::{SqliteStore, SqliteStoreError};

/// Append-only persistence for sensor readings, one stream per kind.
#[async_trait]
pub trait ReadingStore: Send + Sync + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one reading taken by `node`.
    async fn append(&self, node: NodeId, reading: &SensorReading) -> Result<(), Self::Error>;

    /// Every stored reading of `kind`, oldest first.
    async fn records(&self, kind: SensorKind) -> Result<Vec<StoredReading>, Self::Error>;

    /// Total number of readings across all kinds.
    async fn count(&self) -> Result<usize, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReading {
    pub node: NodeId,
    pub reading: SensorReading,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    /// One `<kind>.csv` file per sensor kind under `dir`.
    Csv { dir: PathBuf },
    Sqlite { path: PathBuf },
}

use std::path::Path;

use async_trait::async_trait;
use lorasense_core::{Coordinate, GpsFix, NodeId, SensorKind, SensorReading, SensorValue};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool, migrate::Migrator};

use crate::{ReadingStore, StoredReading};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid sensor kind: {0}")]
    InvalidKind(i64),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("value {value} out of range for {kind}")]
    InvalidValue { kind: SensorKind, value: i64 },
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens or creates a database file at `path`.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> Result<Self, SqliteStoreError> {
        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

fn dissect_value(value: &SensorValue) -> (i64, Option<i64>) {
    match *value {
        SensorValue::Temperature { centi_celsius } => (centi_celsius as i64, None),
        SensorValue::Humidity { centi_percent } => (centi_percent as i64, None),
        SensorValue::AirQuality { eco2_ppm, tvoc_ppb } => (eco2_ppm as i64, Some(tvoc_ppb as i64)),
        SensorValue::Pressure { hpa } => (hpa as i64, None),
    }
}

fn map_row(row: &SqliteRow) -> Result<StoredReading, SqliteStoreError> {
    let node: i64 = row.try_get("node")?;
    let kind: i64 = row.try_get("kind")?;
    let value_a: i64 = row.try_get("value_a")?;
    let value_b: Option<i64> = row.try_get("value_b")?;
    let latitude: Option<i64> = row.try_get("latitude")?;
    let longitude: Option<i64> = row.try_get("longitude")?;
    let observed_at: i64 = row.try_get("observed_at")?;

    let kind = u8::try_from(kind)
        .ok()
        .and_then(|k| SensorKind::try_from(k).ok())
        .ok_or(SqliteStoreError::InvalidKind(kind))?;

    let out_of_range = |value: i64| SqliteStoreError::InvalidValue { kind, value };
    let as_u16 = |value: i64| u16::try_from(value).map_err(|_| out_of_range(value));

    let value = match kind {
        SensorKind::Temperature => SensorValue::Temperature {
            centi_celsius: i16::try_from(value_a).map_err(|_| out_of_range(value_a))?,
        },
        SensorKind::Humidity => SensorValue::Humidity {
            centi_percent: as_u16(value_a)?,
        },
        SensorKind::AirQuality => SensorValue::AirQuality {
            eco2_ppm: as_u16(value_a)?,
            tvoc_ppb: as_u16(value_b.unwrap_or_default())?,
        },
        SensorKind::Pressure => SensorValue::Pressure {
            hpa: as_u16(value_a)?,
        },
    };

    let position = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GpsFix {
            latitude: Coordinate(lat as i32),
            longitude: Coordinate(lon as i32),
        }),
        _ => None,
    };

    Ok(StoredReading {
        node: node as NodeId,
        reading: SensorReading {
            value,
            position,
            observed_at: jiff::Timestamp::from_millisecond(observed_at)
                .map_err(|_| SqliteStoreError::InvalidTimestamp(observed_at))?,
        },
    })
}

#[async_trait]
impl ReadingStore for SqliteStore {
    type Error = SqliteStoreError;

    async fn append(&self, node: NodeId, reading: &SensorReading) -> Result<(), Self::Error> {
        let (value_a, value_b) = dissect_value(&reading.value);

        sqlx::query(
            r#"
            INSERT INTO readings (node, kind, value_a, value_b, latitude, longitude, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node as i64)
        .bind(reading.kind() as i64)
        .bind(value_a)
        .bind(value_b)
        .bind(reading.position.map(|p| p.latitude.0 as i64))
        .bind(reading.position.map(|p| p.longitude.0 as i64))
        .bind(reading.observed_at.as_millisecond())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn records(&self, kind: SensorKind) -> Result<Vec<StoredReading>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT node, kind, value_a, value_b, latitude, longitude, observed_at
            FROM readings WHERE kind = ? ORDER BY id ASC
            "#,
        )
        .bind(kind as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn count(&self) -> Result<usize, Self::Error> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        Ok(count as usize)
    }
}

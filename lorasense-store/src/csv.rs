use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lorasense_core::{Coordinate, GpsFix, NodeId, SensorKind, SensorReading, SensorValue};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{ReadingStore, StoredReading};

/// Delimited-text store: one append-only `<kind>.csv` file per sensor kind,
/// each starting with a header row.
#[derive(Clone)]
pub struct CsvStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CsvStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}:{line}: {reason}")]
    Malformed {
        file: PathBuf,
        line: usize,
        reason: String,
    },
}

impl CsvStore {
    /// Creates `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, CsvStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path_for(&self, kind: SensorKind) -> PathBuf {
        self.dir.join(format!("{}.csv", kind.name()))
    }
}

fn header(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Temperature => "observed_at,node,celsius,latitude,longitude",
        SensorKind::Humidity => "observed_at,node,percent,latitude,longitude",
        SensorKind::AirQuality => "observed_at,node,eco2_ppm,tvoc_ppb,latitude,longitude",
        SensorKind::Pressure => "observed_at,node,hpa,latitude,longitude",
    }
}

fn centi(value: i32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    format!("{sign}{}.{:02}", magnitude / 100, magnitude % 100)
}

fn format_row(node: NodeId, reading: &SensorReading) -> String {
    let value = match reading.value {
        SensorValue::Temperature { centi_celsius } => centi(centi_celsius as i32),
        SensorValue::Humidity { centi_percent } => centi(centi_percent as i32),
        SensorValue::AirQuality { eco2_ppm, tvoc_ppb } => format!("{eco2_ppm},{tvoc_ppb}"),
        SensorValue::Pressure { hpa } => hpa.to_string(),
    };

    let position = match reading.position {
        Some(fix) => format!(
            "{:.7},{:.7}",
            fix.latitude.degrees(),
            fix.longitude.degrees()
        ),
        None => ",".to_owned(),
    };

    format!("{},{node},{value},{position}\n", reading.observed_at)
}

fn parse_row(kind: SensorKind, row: &str) -> Result<StoredReading, String> {
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    let value_fields = if kind == SensorKind::AirQuality { 2 } else { 1 };

    if fields.len() != 4 + value_fields {
        return Err(format!("expected {} fields, got {}", 4 + value_fields, fields.len()));
    }

    let observed_at: jiff::Timestamp = fields[0].parse().map_err(|e| format!("timestamp: {e}"))?;
    let node: NodeId = fields[1].parse().map_err(|e| format!("node: {e}"))?;

    let number = |s: &str| s.parse::<f64>().map_err(|e| format!("value {s:?}: {e}"));
    let integer = |s: &str| s.parse::<u16>().map_err(|e| format!("value {s:?}: {e}"));

    let value = match kind {
        SensorKind::Temperature => SensorValue::temperature(number(fields[2])?),
        SensorKind::Humidity => SensorValue::humidity(number(fields[2])?),
        SensorKind::AirQuality => SensorValue::AirQuality {
            eco2_ppm: integer(fields[2])?,
            tvoc_ppb: integer(fields[3])?,
        },
        SensorKind::Pressure => SensorValue::Pressure {
            hpa: integer(fields[2])?,
        },
    };

    let (lat, lon) = (fields[2 + value_fields], fields[3 + value_fields]);
    let position = if lat.is_empty() && lon.is_empty() {
        None
    } else {
        Some(GpsFix {
            latitude: Coordinate::from_degrees(number(lat)?),
            longitude: Coordinate::from_degrees(number(lon)?),
        })
    };

    Ok(StoredReading {
        node,
        reading: SensorReading {
            value,
            position,
            observed_at,
        },
    })
}

async fn read_optional(path: &Path) -> Result<Option<String>, std::io::Error> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ReadingStore for CsvStore {
    type Error = CsvStoreError;

    async fn append(&self, node: NodeId, reading: &SensorReading) -> Result<(), Self::Error> {
        let kind = reading.kind();
        let path = self.path_for(kind);

        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if file.metadata().await?.len() == 0 {
            file.write_all(header(kind).as_bytes()).await?;
            file.write_all(b"\n").await?;
        }

        file.write_all(format_row(node, reading).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    async fn records(&self, kind: SensorKind) -> Result<Vec<StoredReading>, Self::Error> {
        let path = self.path_for(kind);

        let Some(content) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };

        content
            .lines()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| !row.trim().is_empty())
            .map(|(index, row)| {
                parse_row(kind, row).map_err(|reason| CsvStoreError::Malformed {
                    file: path.clone(),
                    line: index + 1,
                    reason,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, Self::Error> {
        let mut total = 0;

        for kind in SensorKind::ALL {
            if let Some(content) = read_optional(&self.path_for(kind)).await? {
                total += content
                    .lines()
                    .skip(1)
                    .filter(|row| !row.trim().is_empty())
                    .count();
            }
        }

        Ok(total)
    }
}

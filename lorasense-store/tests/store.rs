use lorasense_core::*;
use lorasense_store::{
    CsvStore, CsvStoreError, MemoryStore, MemoryStoreError, ReadingStore, SqliteStore,
    SqliteStoreError, StoredReading,
};
use tempfile::TempDir;

fn at(second: i64) -> jiff::Timestamp {
    jiff::Timestamp::from_second(1_700_000_000 + second).unwrap()
}

fn temperature(celsius: f64, second: i64) -> SensorReading {
    SensorReading {
        value: SensorValue::temperature(celsius),
        position: GpsFix::from_degrees(55.944_756, -3.189_028),
        observed_at: at(second),
    }
}

fn air_quality(second: i64) -> SensorReading {
    SensorReading {
        value: SensorValue::AirQuality {
            eco2_ppm: 412,
            tvoc_ppb: 31,
        },
        position: None,
        observed_at: at(second),
    }
}

fn pressure(second: i64) -> SensorReading {
    SensorReading {
        value: SensorValue::Pressure { hpa: 1013 },
        position: GpsFix::from_degrees(-33.856_784, 151.215_297),
        observed_at: at(second),
    }
}

/// Shared behaviour every store must show.
async fn exercise<S: ReadingStore>(store: &S) -> Result<(), S::Error> {
    assert_eq!(store.count().await?, 0);
    assert!(store.records(SensorKind::Temperature).await?.is_empty());

    store.append(1, &temperature(21.5, 0)).await?;
    store.append(2, &air_quality(1)).await?;
    store.append(1, &temperature(-3.25, 2)).await?;
    store.append(2, &pressure(3)).await?;

    assert_eq!(store.count().await?, 4);

    let temps = store.records(SensorKind::Temperature).await?;
    assert_eq!(
        temps,
        vec![
            StoredReading {
                node: 1,
                reading: temperature(21.5, 0)
            },
            StoredReading {
                node: 1,
                reading: temperature(-3.25, 2)
            },
        ]
    );

    let air = store.records(SensorKind::AirQuality).await?;
    assert_eq!(air, vec![StoredReading { node: 2, reading: air_quality(1) }]);

    let press = store.records(SensorKind::Pressure).await?;
    assert_eq!(press[0].reading.position, pressure(3).position);

    assert!(store.records(SensorKind::Humidity).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn memory_store_appends_per_kind() -> Result<(), MemoryStoreError> {
    exercise(&MemoryStore::default()).await
}

#[tokio::test]
async fn csv_store_appends_per_kind() -> Result<(), CsvStoreError> {
    let dir = TempDir::new()?;
    let store = CsvStore::new(dir.path()).await?;

    exercise(&store).await?;

    let raw = std::fs::read_to_string(store.path_for(SensorKind::Temperature))?;
    let mut lines = raw.lines();
    assert_eq!(
        lines.next(),
        Some("observed_at,node,celsius,latitude,longitude")
    );
    assert!(lines.next().is_some_and(|row| row.contains(",1,21.50,")));
    assert!(!store.path_for(SensorKind::Humidity).exists());

    Ok(())
}

#[tokio::test]
async fn csv_store_survives_reopen() -> Result<(), CsvStoreError> {
    let dir = TempDir::new()?;

    let store = CsvStore::new(dir.path()).await?;
    store.append(4, &pressure(0)).await?;
    drop(store);

    let store = CsvStore::new(dir.path()).await?;
    store.append(4, &pressure(1)).await?;

    assert_eq!(store.records(SensorKind::Pressure).await?.len(), 2);

    let raw = std::fs::read_to_string(store.path_for(SensorKind::Pressure))?;
    assert_eq!(raw.matches("observed_at").count(), 1, "header written once");

    Ok(())
}

#[tokio::test]
async fn sqlite_store_appends_per_kind() -> Result<(), SqliteStoreError> {
    let store = SqliteStore::new_in_memory().await?;
    exercise(&store).await
}

#[tokio::test]
async fn sqlite_store_persists_to_file() -> Result<(), SqliteStoreError> {
    let dir = TempDir::new().map_err(sqlx::Error::Io)?;
    let path = dir.path().join("readings.db");

    let store = SqliteStore::new(&path).await?;
    store.append(7, &temperature(19.99, 0)).await?;
    drop(store);

    let store = SqliteStore::new(&path).await?;
    let temps = store.records(SensorKind::Temperature).await?;

    assert_eq!(temps.len(), 1);
    assert_eq!(temps[0].node, 7);
    assert_eq!(temps[0].reading, temperature(19.99, 0));

    Ok(())
}

use std::time::Duration;

use async_trait::async_trait;
use lorasense_core::{Capabilities, SensorKind, SensorValue};
use rand::Rng;
use tracing::{debug, info};

/// A raw characteristic notification pushed by a sensor device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: SensorKind,
    pub raw: Vec<u8>,
    pub observed_at: jiff::Timestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no sensor device found")]
    NotFound,
    #[error("sensor device disconnected")]
    Disconnected,
    #[error("{kind} notification must be {expected} bytes, got {len}")]
    InvalidLength {
        kind: SensorKind,
        expected: usize,
        len: usize,
    },
}

/// A device that pushes environmental measurements to the node.
///
/// Mirrors a BLE peripheral: connect, subscribe to the characteristics of
/// interest, then receive notifications until the link drops.
#[async_trait]
pub trait SensorSource: Send + 'static {
    async fn connect(&mut self) -> Result<(), SensorError>;

    /// Subscribes to notifications for every kind in `kinds`.
    async fn enable(&mut self, kinds: Capabilities) -> Result<(), SensorError>;

    /// Waits for the next notification. `Disconnected` means the caller has
    /// to connect again.
    async fn next_notification(&mut self) -> Result<Notification, SensorError>;

    fn decode(&self, notification: &Notification) -> Result<SensorValue, SensorError> {
        decode_thingy(notification.kind, &notification.raw)
    }

    async fn disconnect(&mut self);
}

fn expect_len(kind: SensorKind, raw: &[u8], expected: usize) -> Result<(), SensorError> {
    if raw.len() != expected {
        return Err(SensorError::InvalidLength {
            kind,
            expected,
            len: raw.len(),
        });
    }
    Ok(())
}

/// Decodes the environment-service characteristic layouts of a Nordic
/// Thingy:52.
///
/// * temperature: `i8` integer part, `u8` hundredths. The hundredths carry
///   the sign of the integer part.
/// * pressure: `i32` LE integer part, `u8` hundredths.
/// * humidity: `u8` percent.
/// * air quality: `u16` LE eCO2 ppm, `u16` LE TVOC ppb.
pub fn decode_thingy(kind: SensorKind, raw: &[u8]) -> Result<SensorValue, SensorError> {
    match kind {
        SensorKind::Temperature => {
            expect_len(kind, raw, 2)?;
            let integer = raw[0] as i8 as i16;
            let fraction = raw[1].min(99) as i16;
            let centi = if integer < 0 {
                integer * 100 - fraction
            } else {
                integer * 100 + fraction
            };
            Ok(SensorValue::Temperature {
                centi_celsius: centi,
            })
        }
        SensorKind::Pressure => {
            expect_len(kind, raw, 5)?;
            let integer = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let rounded = if raw[4] >= 50 { integer.saturating_add(1) } else { integer };
            Ok(SensorValue::Pressure {
                hpa: rounded.clamp(0, u16::MAX as i32) as u16,
            })
        }
        SensorKind::Humidity => {
            expect_len(kind, raw, 1)?;
            Ok(SensorValue::Humidity {
                centi_percent: raw[0] as u16 * 100,
            })
        }
        SensorKind::AirQuality => {
            expect_len(kind, raw, 4)?;
            Ok(SensorValue::AirQuality {
                eco2_ppm: u16::from_le_bytes([raw[0], raw[1]]),
                tvoc_ppb: u16::from_le_bytes([raw[2], raw[3]]),
            })
        }
    }
}

/// A Thingy that lives in memory and produces plausible indoor readings.
pub struct SimulatedThingy {
    interval: Duration,
    failed_connects: u32,
    disconnect_every: Option<u32>,
    enabled: Vec<SensorKind>,
    connected: bool,
    next: usize,
    sent: u32,
}

impl SimulatedThingy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            failed_connects: 0,
            disconnect_every: None,
            enabled: Vec::new(),
            connected: false,
            next: 0,
            sent: 0,
        }
    }

    /// The first `attempts` connects fail as if the device were out of range.
    pub fn with_failed_connects(mut self, attempts: u32) -> Self {
        self.failed_connects = attempts;
        self
    }

    /// The link drops after every `count` notifications.
    pub fn with_disconnect_every(mut self, count: u32) -> Self {
        self.disconnect_every = Some(count.max(1));
        self
    }

    fn sample(kind: SensorKind) -> Vec<u8> {
        let mut rng = rand::rng();

        match kind {
            SensorKind::Temperature => {
                vec![rng.random_range(18..26u8), rng.random_range(0..100u8)]
            }
            SensorKind::Pressure => {
                let mut raw = rng.random_range(990..1030i32).to_le_bytes().to_vec();
                raw.push(rng.random_range(0..100u8));
                raw
            }
            SensorKind::Humidity => vec![rng.random_range(30..60u8)],
            SensorKind::AirQuality => {
                let mut raw = rng.random_range(400..1200u16).to_le_bytes().to_vec();
                raw.extend_from_slice(&rng.random_range(0..300u16).to_le_bytes());
                raw
            }
        }
    }
}

#[async_trait]
impl SensorSource for SimulatedThingy {
    async fn connect(&mut self) -> Result<(), SensorError> {
        if self.failed_connects > 0 {
            self.failed_connects -= 1;
            return Err(SensorError::NotFound);
        }

        self.connected = true;
        self.sent = 0;
        info!("simulated Thingy connected");
        Ok(())
    }

    async fn enable(&mut self, kinds: Capabilities) -> Result<(), SensorError> {
        if !self.connected {
            return Err(SensorError::Disconnected);
        }
        self.enabled = kinds.iter().collect();
        debug!(kinds = ?kinds, "notifications enabled");
        Ok(())
    }

    async fn next_notification(&mut self) -> Result<Notification, SensorError> {
        if !self.connected {
            return Err(SensorError::Disconnected);
        }
        if self.enabled.is_empty() {
            // Nothing subscribed; a real device would stay silent forever.
            std::future::pending::<()>().await;
        }

        tokio::time::sleep(self.interval).await;

        if self.disconnect_every.is_some_and(|every| self.sent >= every) {
            self.connected = false;
            return Err(SensorError::Disconnected);
        }

        let kind = self.enabled[self.next % self.enabled.len()];
        self.next = self.next.wrapping_add(1);
        self.sent += 1;

        Ok(Notification {
            kind,
            raw: Self::sample(kind),
            observed_at: jiff::Timestamp::now(),
        })
    }

    async fn disconnect(&mut self) {
        if self.connected {
            debug!("simulated Thingy disconnected");
        }
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thingy_temperature_is_sign_magnitude() {
        assert_eq!(
            decode_thingy(SensorKind::Temperature, &[21, 50]).unwrap(),
            SensorValue::Temperature { centi_celsius: 2150 }
        );
        assert_eq!(
            decode_thingy(SensorKind::Temperature, &[(-3i8) as u8, 25]).unwrap(),
            SensorValue::Temperature { centi_celsius: -325 }
        );
    }

    #[test]
    fn thingy_pressure_rounds_to_whole_hpa() {
        let mut raw = 1013i32.to_le_bytes().to_vec();
        raw.push(60);
        assert_eq!(
            decode_thingy(SensorKind::Pressure, &raw).unwrap(),
            SensorValue::Pressure { hpa: 1014 }
        );
    }

    #[test]
    fn thingy_humidity_and_gas() {
        assert_eq!(
            decode_thingy(SensorKind::Humidity, &[47]).unwrap(),
            SensorValue::Humidity { centi_percent: 4700 }
        );
        assert_eq!(
            decode_thingy(SensorKind::AirQuality, &[0x90, 0x01, 0x0a, 0x00]).unwrap(),
            SensorValue::AirQuality {
                eco2_ppm: 400,
                tvoc_ppb: 10
            }
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            decode_thingy(SensorKind::AirQuality, &[1, 2, 3]),
            Err(SensorError::InvalidLength { len: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_thingy_cycles_enabled_kinds() {
        let mut thingy = SimulatedThingy::new(Duration::from_millis(100));
        thingy.connect().await.unwrap();
        thingy
            .enable([SensorKind::Temperature, SensorKind::Pressure].into_iter().collect())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        for _ in 0..4 {
            let n = thingy.next_notification().await.unwrap();
            thingy.decode(&n).unwrap();
            kinds.push(n.kind);
        }

        assert_eq!(
            kinds,
            [
                SensorKind::Temperature,
                SensorKind::Pressure,
                SensorKind::Temperature,
                SensorKind::Pressure
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_thingy_failures() {
        let mut thingy = SimulatedThingy::new(Duration::from_millis(10))
            .with_failed_connects(1)
            .with_disconnect_every(2);

        assert!(matches!(thingy.connect().await, Err(SensorError::NotFound)));
        thingy.connect().await.unwrap();
        thingy.enable(Capabilities::all()).await.unwrap();

        thingy.next_notification().await.unwrap();
        thingy.next_notification().await.unwrap();
        assert!(matches!(
            thingy.next_notification().await,
            Err(SensorError::Disconnected)
        ));
    }
}

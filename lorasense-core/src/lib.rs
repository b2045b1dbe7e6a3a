use std::fmt;

use serde::{Deserialize, Serialize};

pub mod protocol;

/// Radio address of a participant. One byte on the wire.
pub type NodeId = u8;

/// Address reserved for the basestation. Never assigned to a sensor node.
pub const BASESTATION_ID: NodeId = 0;

/// Environmental sensor kinds known to the network.
///
/// The discriminants are the wire values used in sensor requests, responses
/// and (as a position) in the join capability bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SensorKind {
    Temperature = 0,
    Humidity = 1,
    AirQuality = 2,
    Pressure = 3,
}

impl SensorKind {
    /// Every kind, in the fixed order used by the capability bitmap and by
    /// the basestation's poll sweep.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::AirQuality,
        SensorKind::Pressure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::AirQuality => "air_quality",
            SensorKind::Pressure => "pressure",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of sensor kinds a node can serve.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<SensorKind>", into = "Vec<SensorKind>")]
pub struct Capabilities(u8);

impl Capabilities {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub fn insert(&mut self, kind: SensorKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: SensorKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: SensorKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Member kinds in [`SensorKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = SensorKind> + '_ {
        SensorKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<SensorKind> for Capabilities {
    fn from_iter<I: IntoIterator<Item = SensorKind>>(iter: I) -> Self {
        let mut caps = Capabilities::empty();
        for kind in iter {
            caps.insert(kind);
        }
        caps
    }
}

impl From<Vec<SensorKind>> for Capabilities {
    fn from(kinds: Vec<SensorKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<Capabilities> for Vec<SensorKind> {
    fn from(caps: Capabilities) -> Self {
        caps.iter().collect()
    }
}

/// One axis of a position, stored as signed hundredths of an arc-second.
///
/// This is exactly the resolution the wire format carries, so a coordinate
/// survives an encode/decode cycle unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate(pub i32);

/// Sexagesimal breakdown of a [`Coordinate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dms {
    /// South of the equator or west of the prime meridian.
    pub negative: bool,
    pub degrees: u16,
    pub minutes: u8,
    pub seconds: u8,
    pub hundredths: u8,
}

const CENTI_PER_SECOND: u32 = 100;
const CENTI_PER_MINUTE: u32 = 60 * CENTI_PER_SECOND;
const CENTI_PER_DEGREE: u32 = 60 * CENTI_PER_MINUTE;

impl Coordinate {
    /// Rounds decimal degrees to the nearest hundredth of an arc-second.
    pub fn from_degrees(degrees: f64) -> Self {
        Self((degrees * CENTI_PER_DEGREE as f64).round() as i32)
    }

    pub fn degrees(&self) -> f64 {
        self.0 as f64 / CENTI_PER_DEGREE as f64
    }

    pub fn from_dms(dms: Dms) -> Self {
        let magnitude = dms.degrees as u32 * CENTI_PER_DEGREE
            + dms.minutes as u32 * CENTI_PER_MINUTE
            + dms.seconds as u32 * CENTI_PER_SECOND
            + dms.hundredths as u32;
        let magnitude = magnitude as i32;
        Self(if dms.negative { -magnitude } else { magnitude })
    }

    pub fn dms(&self) -> Dms {
        let magnitude = self.0.unsigned_abs();
        let minutes_rem = magnitude % CENTI_PER_DEGREE;
        let seconds_rem = minutes_rem % CENTI_PER_MINUTE;

        Dms {
            negative: self.0 < 0,
            degrees: (magnitude / CENTI_PER_DEGREE) as u16,
            minutes: (minutes_rem / CENTI_PER_MINUTE) as u8,
            seconds: (seconds_rem / CENTI_PER_SECOND) as u8,
            hundredths: (seconds_rem % CENTI_PER_SECOND) as u8,
        }
    }
}

/// A decoded position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
}

impl GpsFix {
    /// Builds a fix from decimal degrees, rejecting values outside the globe.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }

        Some(Self {
            latitude: Coordinate::from_degrees(latitude),
            longitude: Coordinate::from_degrees(longitude),
        })
    }
}

impl fmt::Display for GpsFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}, {:.6}",
            self.latitude.degrees(),
            self.longitude.degrees()
        )
    }
}

/// A measured value. Decimal quantities are fixed-point, scaled by 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorValue {
    /// Degrees Celsius scaled by 100 (e.g., 21.50 -> 2150).
    Temperature { centi_celsius: i16 },
    /// Relative humidity in percent scaled by 100.
    Humidity { centi_percent: u16 },
    /// Equivalent CO2 (ppm) and total volatile organic compounds (ppb).
    AirQuality { eco2_ppm: u16, tvoc_ppb: u16 },
    /// Whole hectopascals.
    Pressure { hpa: u16 },
}

impl SensorValue {
    pub fn temperature(celsius: f64) -> Self {
        let centi = (celsius * 100.0).round().clamp(i16::MIN as f64, i16::MAX as f64);
        SensorValue::Temperature {
            centi_celsius: centi as i16,
        }
    }

    pub fn humidity(percent: f64) -> Self {
        let centi = (percent * 100.0).round().clamp(0.0, u16::MAX as f64);
        SensorValue::Humidity {
            centi_percent: centi as u16,
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            SensorValue::Temperature { .. } => SensorKind::Temperature,
            SensorValue::Humidity { .. } => SensorKind::Humidity,
            SensorValue::AirQuality { .. } => SensorKind::AirQuality,
            SensorValue::Pressure { .. } => SensorKind::Pressure,
        }
    }

    /// Primary magnitude as a float, in the kind's natural unit.
    pub fn as_f64(&self) -> f64 {
        match *self {
            SensorValue::Temperature { centi_celsius } => centi_celsius as f64 / 100.0,
            SensorValue::Humidity { centi_percent } => centi_percent as f64 / 100.0,
            SensorValue::AirQuality { eco2_ppm, .. } => eco2_ppm as f64,
            SensorValue::Pressure { hpa } => hpa as f64,
        }
    }
}

fn write_centi(f: &mut fmt::Formatter<'_>, centi: i32) -> fmt::Result {
    let sign = if centi < 0 { "-" } else { "" };
    let magnitude = centi.unsigned_abs();
    write!(f, "{sign}{}.{:02}", magnitude / 100, magnitude % 100)
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SensorValue::Temperature { centi_celsius } => {
                write_centi(f, centi_celsius as i32)?;
                f.write_str(" degC")
            }
            SensorValue::Humidity { centi_percent } => {
                write_centi(f, centi_percent as i32)?;
                f.write_str(" %")
            }
            SensorValue::AirQuality { eco2_ppm, tvoc_ppb } => {
                write!(f, "eCO2 {eco2_ppm} ppm, TVOC {tvoc_ppb} ppb")
            }
            SensorValue::Pressure { hpa } => write!(f, "{hpa} hPa"),
        }
    }
}

/// A single observation from a node's sensor, optionally tagged with where
/// it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: SensorValue,
    pub position: Option<GpsFix>,
    pub observed_at: jiff::Timestamp,
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        self.value.kind()
    }
}

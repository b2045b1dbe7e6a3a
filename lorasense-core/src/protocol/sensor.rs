use super::PayloadError;
use crate::{Capabilities, SensorKind};

/// One flag byte per [`SensorKind`], in [`SensorKind::ALL`] order.
pub const CAPABILITY_BITMAP_LEN: usize = 4;

impl TryFrom<u8> for SensorKind {
    type Error = PayloadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SensorKind::Temperature),
            0x01 => Ok(SensorKind::Humidity),
            0x02 => Ok(SensorKind::AirQuality),
            0x03 => Ok(SensorKind::Pressure),
            _ => Err(PayloadError::InvalidSensorKind(value)),
        }
    }
}

pub fn encode_capabilities(caps: Capabilities) -> [u8; CAPABILITY_BITMAP_LEN] {
    SensorKind::ALL.map(|kind| caps.contains(kind) as u8)
}

/// Strict inverse of [`encode_capabilities`]: every flag must be 0 or 1.
pub fn decode_capabilities(
    bitmap: [u8; CAPABILITY_BITMAP_LEN],
) -> Result<Capabilities, PayloadError> {
    let mut caps = Capabilities::empty();

    for (index, (flag, kind)) in bitmap.into_iter().zip(SensorKind::ALL).enumerate() {
        match flag {
            0 => {}
            1 => caps.insert(kind),
            value => return Err(PayloadError::InvalidCapabilityFlag { index, value }),
        }
    }

    Ok(caps)
}

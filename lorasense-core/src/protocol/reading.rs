use super::{MessageType, PayloadError};
use crate::{Coordinate, Dms, GpsFix, SensorKind, SensorValue};

// reading payload : kind(1) + latitude(4) + longitude(4) + value(2..6)
// coordinate      : degrees(1) + minutes(1, bit 7 = south/west) + seconds(1) + hundredths(1)

const COORDINATE_LEN: usize = 4;
const POSITION_LEN: usize = 2 * COORDINATE_LEN;
const READING_HEADER_LEN: usize = 1 + POSITION_LEN;

const NO_FIX: u8 = 0xFF;
const NEGATIVE_FLAG: u8 = 0x80;
const CENTI_PER_DEGREE: i32 = 360_000;

const MAX_LATITUDE: u8 = 90;
const MAX_LONGITUDE: u8 = 180;

const PRESSURE_DIGITS: u32 = 4;
const AIR_QUALITY_DIGITS: u32 = 3;

fn value_len(kind: SensorKind) -> usize {
    match kind {
        SensorKind::Temperature | SensorKind::Humidity => 2,
        SensorKind::Pressure => PRESSURE_DIGITS as usize,
        SensorKind::AirQuality => 2 * AIR_QUALITY_DIGITS as usize,
    }
}

/// Exact payload length of a sensor response carrying `kind`.
pub fn reading_payload_len(kind: SensorKind) -> usize {
    READING_HEADER_LEN + value_len(kind)
}

/// Encodes a value and the position it was taken at.
///
/// Values that do not fit their wire field saturate at the field's bounds.
pub fn encode_reading(value: &SensorValue, position: Option<&GpsFix>) -> Vec<u8> {
    let kind = value.kind();
    let mut buf = Vec::with_capacity(reading_payload_len(kind));

    buf.push(kind as u8);

    match position {
        Some(fix) => {
            buf.extend_from_slice(&encode_coordinate(fix.latitude, MAX_LATITUDE));
            buf.extend_from_slice(&encode_coordinate(fix.longitude, MAX_LONGITUDE));
        }
        None => buf.extend_from_slice(&[NO_FIX; POSITION_LEN]),
    }

    match *value {
        SensorValue::Temperature { centi_celsius } => {
            let whole = centi_celsius.div_euclid(100);
            let (whole, hundredths) = if whole < i8::MIN as i16 {
                (i8::MIN, 0)
            } else if whole > i8::MAX as i16 {
                (i8::MAX, 99)
            } else {
                (whole as i8, centi_celsius.rem_euclid(100) as u8)
            };
            buf.push(whole as u8);
            buf.push(hundredths);
        }
        SensorValue::Humidity { centi_percent } => {
            let whole = centi_percent / 100;
            let (whole, hundredths) = if whole > u8::MAX as u16 {
                (u8::MAX, 99)
            } else {
                (whole as u8, (centi_percent % 100) as u8)
            };
            buf.push(whole);
            buf.push(hundredths);
        }
        SensorValue::Pressure { hpa } => push_digits(&mut buf, hpa as u32, PRESSURE_DIGITS),
        SensorValue::AirQuality { eco2_ppm, tvoc_ppb } => {
            push_digits(&mut buf, eco2_ppm as u32, AIR_QUALITY_DIGITS);
            push_digits(&mut buf, tvoc_ppb as u32, AIR_QUALITY_DIGITS);
        }
    }

    buf
}

/// Decodes a sensor response payload into its value and reported position.
pub fn decode_reading(payload: &[u8]) -> Result<(SensorValue, Option<GpsFix>), PayloadError> {
    let Some(&kind_byte) = payload.first() else {
        return Err(PayloadError::InvalidLength {
            message_type: MessageType::SensorResponse,
            expected: READING_HEADER_LEN,
            actual: 0,
        });
    };

    let kind = SensorKind::try_from(kind_byte)?;
    let expected = reading_payload_len(kind);

    if payload.len() != expected {
        return Err(PayloadError::InvalidLength {
            message_type: MessageType::SensorResponse,
            expected,
            actual: payload.len(),
        });
    }

    let position = decode_position(&payload[1..READING_HEADER_LEN])?;
    let value = &payload[READING_HEADER_LEN..];

    let value = match kind {
        SensorKind::Temperature => {
            let hundredths = check_fraction(value[1])?;
            SensorValue::Temperature {
                centi_celsius: (value[0] as i8) as i16 * 100 + hundredths as i16,
            }
        }
        SensorKind::Humidity => {
            let hundredths = check_fraction(value[1])?;
            SensorValue::Humidity {
                centi_percent: value[0] as u16 * 100 + hundredths as u16,
            }
        }
        SensorKind::Pressure => SensorValue::Pressure {
            hpa: read_digits(value)? as u16,
        },
        SensorKind::AirQuality => {
            let (eco2, tvoc) = value.split_at(AIR_QUALITY_DIGITS as usize);
            SensorValue::AirQuality {
                eco2_ppm: read_digits(eco2)? as u16,
                tvoc_ppb: read_digits(tvoc)? as u16,
            }
        }
    };

    Ok((value, position))
}

fn push_digits(buf: &mut Vec<u8>, value: u32, width: u32) {
    let value = value.min(10u32.pow(width) - 1);

    for exp in (0..width).rev() {
        buf.push(((value / 10u32.pow(exp)) % 10) as u8);
    }
}

fn read_digits(bytes: &[u8]) -> Result<u32, PayloadError> {
    bytes.iter().try_fold(0u32, |acc, &digit| {
        if digit > 9 {
            return Err(PayloadError::InvalidDigit(digit));
        }
        Ok(acc * 10 + digit as u32)
    })
}

fn check_fraction(hundredths: u8) -> Result<u8, PayloadError> {
    if hundredths > 99 {
        return Err(PayloadError::InvalidFraction(hundredths));
    }
    Ok(hundredths)
}

fn encode_coordinate(coord: Coordinate, max_degrees: u8) -> [u8; COORDINATE_LEN] {
    let limit = max_degrees as i32 * CENTI_PER_DEGREE;
    let dms = Coordinate(coord.0.clamp(-limit, limit)).dms();

    let mut minutes = dms.minutes;
    if dms.negative {
        minutes |= NEGATIVE_FLAG;
    }

    [dms.degrees as u8, minutes, dms.seconds, dms.hundredths]
}

fn decode_coordinate(
    bytes: [u8; COORDINATE_LEN],
    max_degrees: u8,
) -> Result<Coordinate, PayloadError> {
    let [degrees, minutes, seconds, hundredths] = bytes;
    let negative = minutes & NEGATIVE_FLAG != 0;
    let minutes = minutes & !NEGATIVE_FLAG;

    let in_range = degrees <= max_degrees && minutes < 60 && seconds < 60 && hundredths < 100;
    let past_pole = degrees == max_degrees && (minutes, seconds, hundredths) != (0, 0, 0);

    if !in_range || past_pole {
        return Err(PayloadError::InvalidCoordinate(bytes));
    }

    Ok(Coordinate::from_dms(Dms {
        negative,
        degrees: degrees as u16,
        minutes,
        seconds,
        hundredths,
    }))
}

fn decode_position(bytes: &[u8]) -> Result<Option<GpsFix>, PayloadError> {
    if bytes.iter().all(|b| *b == NO_FIX) {
        return Ok(None);
    }

    let mut latitude = [0u8; COORDINATE_LEN];
    let mut longitude = [0u8; COORDINATE_LEN];
    latitude.copy_from_slice(&bytes[..COORDINATE_LEN]);
    longitude.copy_from_slice(&bytes[COORDINATE_LEN..POSITION_LEN]);

    Ok(Some(GpsFix {
        latitude: decode_coordinate(latitude, MAX_LATITUDE)?,
        longitude: decode_coordinate(longitude, MAX_LONGITUDE)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> GpsFix {
        // 55 deg 56' 41.12" N, 3 deg 11' 20.50" W
        GpsFix {
            latitude: Coordinate::from_dms(Dms {
                negative: false,
                degrees: 55,
                minutes: 56,
                seconds: 41,
                hundredths: 12,
            }),
            longitude: Coordinate::from_dms(Dms {
                negative: true,
                degrees: 3,
                minutes: 11,
                seconds: 20,
                hundredths: 50,
            }),
        }
    }

    #[test]
    fn temperature_layout() {
        let value = SensorValue::temperature(21.5);
        let payload = encode_reading(&value, Some(&fix()));

        assert_eq!(
            payload,
            vec![0, 55, 56, 41, 12, 3, 11 | 0x80, 20, 50, 21, 50]
        );

        let (decoded, position) = decode_reading(&payload).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(position, Some(fix()));
        assert!((decoded.as_f64() - 21.5).abs() < 0.005);
    }

    #[test]
    fn negative_temperatures_use_floor_and_hundredths() {
        let payload = encode_reading(&SensorValue::temperature(-3.25), None);
        assert_eq!(&payload[9..], &[(-4i8) as u8, 75]);

        let payload = encode_reading(&SensorValue::temperature(-0.5), None);
        assert_eq!(&payload[9..], &[(-1i8) as u8, 50]);
        let (value, _) = decode_reading(&payload).unwrap();
        assert_eq!(value, SensorValue::temperature(-0.5));
    }

    #[test]
    fn pressure_and_air_quality_are_digit_per_byte() {
        let payload = encode_reading(&SensorValue::Pressure { hpa: 1013 }, None);
        assert_eq!(&payload[9..], &[1, 0, 1, 3]);

        let payload = encode_reading(
            &SensorValue::AirQuality {
                eco2_ppm: 412,
                tvoc_ppb: 7,
            },
            None,
        );
        assert_eq!(&payload[9..], &[4, 1, 2, 0, 0, 7]);
        assert_eq!(
            decode_reading(&payload).unwrap().0,
            SensorValue::AirQuality {
                eco2_ppm: 412,
                tvoc_ppb: 7
            }
        );
    }

    #[test]
    fn out_of_range_values_saturate() {
        let payload = encode_reading(
            &SensorValue::AirQuality {
                eco2_ppm: 4500,
                tvoc_ppb: 1200,
            },
            None,
        );
        assert_eq!(&payload[9..], &[9, 9, 9, 9, 9, 9]);

        let payload = encode_reading(&SensorValue::temperature(200.0), None);
        let (value, _) = decode_reading(&payload).unwrap();
        assert_eq!(value, SensorValue::temperature(127.99));
    }

    #[test]
    fn missing_fix_round_trips() {
        let payload = encode_reading(&SensorValue::humidity(40.0), None);
        assert_eq!(&payload[1..9], &[NO_FIX; 8]);
        assert_eq!(decode_reading(&payload).unwrap().1, None);
    }

    #[test]
    fn payload_length_is_checked_per_kind() {
        let mut payload = encode_reading(&SensorValue::Pressure { hpa: 998 }, None);
        payload.pop();

        assert_eq!(
            decode_reading(&payload),
            Err(PayloadError::InvalidLength {
                message_type: MessageType::SensorResponse,
                expected: reading_payload_len(SensorKind::Pressure),
                actual: reading_payload_len(SensorKind::Pressure) - 1,
            })
        );
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let mut payload = encode_reading(&SensorValue::Pressure { hpa: 998 }, None);
        payload[10] = b'9';
        assert_eq!(
            decode_reading(&payload),
            Err(PayloadError::InvalidDigit(b'9'))
        );

        let mut payload = encode_reading(&SensorValue::temperature(1.0), Some(&fix()));
        payload[1] = 91;
        assert!(matches!(
            decode_reading(&payload),
            Err(PayloadError::InvalidCoordinate(_))
        ));
    }
}

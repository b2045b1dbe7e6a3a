use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use lorasense_core::GpsFix;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A source of the node's current position.
pub trait GpsSource: Send + Sync + 'static {
    /// Never blocks. `None` while there is no fix.
    fn current_fix(&self) -> Option<GpsFix>;
}

/// Last-fix slot, written by one background reader and read by anyone.
#[derive(Clone)]
pub struct SharedFix {
    tx: Arc<watch::Sender<Option<GpsFix>>>,
}

impl SharedFix {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::channel(None).0),
        }
    }

    /// A position that never changes, for stationary nodes without a receiver.
    pub fn fixed(fix: GpsFix) -> Self {
        let shared = Self::new();
        shared.update(Some(fix));
        shared
    }

    pub fn update(&self, fix: Option<GpsFix>) {
        self.tx.send_replace(fix);
    }
}

impl Default for SharedFix {
    fn default() -> Self {
        Self::new()
    }
}

impl GpsSource for SharedFix {
    fn current_fix(&self) -> Option<GpsFix> {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NmeaError {
    #[error("not a recommended minimum sentence")]
    NotRmc,
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    Checksum { expected: u8, computed: u8 },
    #[error("missing field {0}")]
    MissingField(usize),
    #[error("invalid coordinate field {0:?}")]
    InvalidCoordinate(String),
}

/// Parses a `$GPRMC` / `$GNRMC` sentence.
///
/// Returns `Ok(None)` when the receiver reports no valid fix (status `V`).
pub fn parse_rmc(line: &str) -> Result<Option<GpsFix>, NmeaError> {
    let line = line.trim();

    let Some(body) = line.strip_prefix('$') else {
        return Err(NmeaError::NotRmc);
    };

    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            let expected =
                u8::from_str_radix(checksum, 16).map_err(|_| NmeaError::MissingField(0))?;
            let computed = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if expected != computed {
                return Err(NmeaError::Checksum { expected, computed });
            }
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();

    if !matches!(fields.first(), Some(&"GPRMC") | Some(&"GNRMC")) {
        return Err(NmeaError::NotRmc);
    }

    let field = |i: usize| fields.get(i).copied().ok_or(NmeaError::MissingField(i));

    if field(2)? != "A" {
        return Ok(None);
    }

    let latitude = parse_coordinate(field(3)?, field(4)?, 'N', 'S')?;
    let longitude = parse_coordinate(field(5)?, field(6)?, 'E', 'W')?;

    GpsFix::from_degrees(latitude, longitude)
        .map(Some)
        .ok_or_else(|| NmeaError::InvalidCoordinate(format!("{latitude}, {longitude}")))
}

// ddmm.mmmm / dddmm.mmmm followed by a hemisphere letter
fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    positive: char,
    negative: char,
) -> Result<f64, NmeaError> {
    let invalid = || NmeaError::InvalidCoordinate(format!("{value},{hemisphere}"));

    if !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(invalid());
    }

    let dot = value.find('.').unwrap_or(value.len());
    if dot < 2 {
        return Err(invalid());
    }

    let (degrees, minutes) = value.split_at(dot - 2);
    let degrees: f64 = if degrees.is_empty() {
        0.0
    } else {
        degrees.parse().map_err(|_| invalid())?
    };
    let minutes: f64 = minutes.parse().map_err(|_| invalid())?;

    if minutes >= 60.0 {
        return Err(invalid());
    }

    let magnitude = degrees + minutes / 60.0;

    match hemisphere.chars().next() {
        Some(c) if c == positive => Ok(magnitude),
        Some(c) if c == negative => Ok(-magnitude),
        _ => Err(invalid()),
    }
}

fn apply_sentence(line: &str, fix: &SharedFix) {
    match parse_rmc(line) {
        Ok(update) => {
            if update.is_none() && fix.current_fix().is_some() {
                warn!("GPS fix lost");
            }
            fix.update(update);
        }
        Err(NmeaError::NotRmc) => {}
        Err(e) => debug!(error = %e, "skipping NMEA sentence"),
    }
}

/// Reads NMEA sentences line by line, keeping `fix` current.
///
/// Runs until the stream ends or `cancel` fires. The last fix is kept when
/// the stream ends.
pub fn spawn_nmea_reader<R>(reader: R, fix: SharedFix, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        info!("GPS reader started");

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("GPS reader shutting down");
                    break;
                }
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => apply_sentence(&line, &fix),
                Ok(None) => {
                    info!("GPS stream ended");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "GPS stream read failed");
                    break;
                }
            }
        }
    })
}

/// Reads NMEA sentences from a serial GPS receiver at `baud`.
///
/// The port is read on a blocking thread. Reads time out every 100 ms so the
/// thread notices `cancel`.
pub fn spawn_serial_reader(
    path: &str,
    baud: u32,
    fix: SharedFix,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, serialport::Error> {
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(100))
        .open()?;
    info!(path, baud, "GPS serial port open");

    Ok(tokio::task::spawn_blocking(move || {
        let mut reader = std::io::BufReader::new(port);
        let mut line = Vec::new();

        while !cancel.is_cancelled() {
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    info!("GPS stream ended");
                    break;
                }
                Ok(_) => {
                    apply_sentence(&String::from_utf8_lossy(&line), &fix);
                    line.clear();
                }
                // partial lines stay in `line` until the rest arrives
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!(error = %e, "GPS serial read failed");
                    break;
                }
            }
        }

        info!("GPS reader shutting down");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDINBURGH: &str =
        "$GPRMC,123519,A,5556.6854,N,00311.3417,W,0.0,0.0,230394,003.1,W";

    #[test]
    fn parses_active_fix() {
        let fix = parse_rmc(EDINBURGH).unwrap().unwrap();

        assert!((fix.latitude.degrees() - 55.944_757).abs() < 1e-5);
        assert!((fix.longitude.degrees() + 3.189_028).abs() < 1e-5);
    }

    #[test]
    fn void_status_means_no_fix() {
        assert_eq!(parse_rmc("$GNRMC,123519,V,,,,,,,230394,,"), Ok(None));
    }

    #[test]
    fn other_sentences_are_ignored() {
        assert_eq!(
            parse_rmc("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"),
            Err(NmeaError::NotRmc)
        );
        assert_eq!(parse_rmc("garbage"), Err(NmeaError::NotRmc));
    }

    #[test]
    fn checksum_is_verified_when_present() {
        let body = "GPRMC,000000,A,3351.4070,S,15112.9178,E,,,010100,,";
        let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);

        let good = format!("${body}*{checksum:02X}");
        let fix = parse_rmc(&good).unwrap().unwrap();
        assert!(fix.latitude.degrees() < 0.0);
        assert!(fix.longitude.degrees() > 151.0);

        let bad = format!("${body}*{:02X}", checksum ^ 0x01);
        assert!(matches!(parse_rmc(&bad), Err(NmeaError::Checksum { .. })));
    }

    #[test]
    fn bad_hemisphere_is_rejected() {
        assert!(matches!(
            parse_rmc("$GPRMC,123519,A,5556.6854,X,00311.3417,W,,,230394,,"),
            Err(NmeaError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn non_digit_coordinate_is_rejected() {
        assert!(matches!(
            parse_rmc("$GPRMC,123519,A,é5.0,N,00311.3417,W,,,230394,,"),
            Err(NmeaError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            parse_rmc("$GPRMC,123519,A,5556.6854,N,-0311.3417,W,,,230394,,"),
            Err(NmeaError::InvalidCoordinate(_))
        ));
    }

    #[tokio::test]
    async fn missing_serial_device_is_an_error() {
        let result = spawn_serial_reader(
            "/nonexistent/lorasense-gps",
            9600,
            SharedFix::new(),
            CancellationToken::new(),
        );

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reader_tracks_latest_sentence() {
        let stream = format!(
            "{EDINBURGH}\n$GPGSV,3,1,11,03,03,111,00\n$GPRMC,123520,V,,,,,,,230394,,\n"
        );
        let fix = SharedFix::new();
        let seen = fix.clone();
        let mut changes = fix.tx.subscribe();

        let handle = spawn_nmea_reader(
            std::io::Cursor::new(stream.into_bytes()),
            fix,
            CancellationToken::new(),
        );
        handle.await.unwrap();

        assert!(changes.has_changed().unwrap());
        assert_eq!(seen.current_fix(), None, "void sentence clears the fix");
    }
}

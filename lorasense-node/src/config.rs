use std::path::{Path, PathBuf};
use std::time::Duration;

use lorasense_core::{Capabilities, NodeId};
use lorasense_radio::UdpRadioConfig;
use lorasense_store::StorageConfig;
use serde::Deserialize;

use crate::agent::AgentConfig;
use crate::join::JoinPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub join: JoinConfig,
    pub sensors: SensorsConfig,
    pub gps: GpsConfig,
    pub radio: UdpRadioConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Radio address, 1..=255
    pub id: NodeId,
    /// Sensor kinds announced at join
    pub capabilities: Capabilities,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: 1,
            capabilities: Capabilities::all(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub ack_timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for JoinConfig {
    fn default() -> Self {
        let policy = JoinPolicy::default();
        Self {
            ack_timeout_secs: policy.ack_timeout.as_secs(),
            max_attempts: policy.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorsConfig {
    Simulated {
        /// Seconds between notifications
        #[serde(default = "default_interval_secs")]
        interval_secs: u64,
        /// Seconds between attempts to reach the device
        #[serde(default = "default_reconnect_secs")]
        reconnect_secs: u64,
    },
}

fn default_interval_secs() -> u64 {
    2
}

fn default_reconnect_secs() -> u64 {
    8
}

impl Default for SensorsConfig {
    fn default() -> Self {
        SensorsConfig::Simulated {
            interval_secs: default_interval_secs(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GpsConfig {
    /// No position source; responses carry no fix.
    #[default]
    None,
    /// A stationary node with a surveyed position.
    Fixed { latitude: f64, longitude: f64 },
    /// NMEA sentences read line by line from a file, or from a serial
    /// device when `baud` is set.
    Nmea {
        path: PathBuf,
        #[serde(default)]
        baud: Option<u32>,
    },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn agent(&self) -> AgentConfig {
        let SensorsConfig::Simulated { reconnect_secs, .. } = self.sensors;

        AgentConfig {
            id: self.node.id,
            capabilities: self.node.capabilities,
            join: JoinPolicy {
                ack_timeout: Duration::from_secs(self.join.ack_timeout_secs),
                max_attempts: self.join.max_attempts,
            },
            reconnect: Duration::from_secs(reconnect_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use lorasense_core::SensorKind;

    use super::*;

    #[test]
    fn node_config_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [node]
            id = 7
            capabilities = ["temperature", "air_quality"]

            [join]
            max_attempts = 3

            [gps]
            type = "fixed"
            latitude = 55.95
            longitude = -3.19
            "#,
        )
        .unwrap();

        let agent = config.agent();
        assert_eq!(agent.id, 7);
        assert_eq!(
            agent.capabilities,
            [SensorKind::Temperature, SensorKind::AirQuality]
                .into_iter()
                .collect::<Capabilities>()
        );
        assert_eq!(agent.join.max_attempts, 3);
        assert_eq!(agent.join.ack_timeout, Duration::from_secs(30));
        assert_eq!(agent.reconnect, Duration::from_secs(8));
        assert_eq!(
            config.gps,
            GpsConfig::Fixed {
                latitude: 55.95,
                longitude: -3.19
            }
        );
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.node.id, 1);
        assert_eq!(config.node.capabilities, Capabilities::all());
        assert_eq!(config.gps, GpsConfig::None);
        assert_eq!(config.sensors, SensorsConfig::default());
    }

    #[test]
    fn nmea_gps_with_baud_rate() {
        let config: Config = toml::from_str(
            r#"
            [gps]
            type = "nmea"
            path = "/dev/ttyACM0"
            baud = 9600
            "#,
        )
        .unwrap();

        assert_eq!(
            config.gps,
            GpsConfig::Nmea {
                path: PathBuf::from("/dev/ttyACM0"),
                baud: Some(9600),
            }
        );

        let config: Config =
            toml::from_str("[gps]\ntype = \"nmea\"\npath = \"gps.log\"\n").unwrap();
        assert!(matches!(config.gps, GpsConfig::Nmea { baud: None, .. }));
    }
}

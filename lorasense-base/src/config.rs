use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use lorasense_radio::UdpRadioConfig;
use lorasense_store::StorageConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basestation: BasestationConfig,
    pub radio: UdpRadioConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BasestationConfig {
    /// How long join requests are accepted after startup
    pub discovery_window_secs: u64,
    /// How long to wait for each sensor response
    pub response_timeout_secs: u64,
    /// Pause between poll cycles
    pub cycle_pause_secs: u64,
}

impl BasestationConfig {
    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_pause_secs)
    }
}

impl Default for BasestationConfig {
    fn default() -> Self {
        Self {
            discovery_window_secs: 30,
            response_timeout_secs: 10,
            cycle_pause_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP status server to listen on
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [basestation]
            response_timeout_secs = 4

            [storage]
            type = "csv"
            dir = "data"
            "#,
        )
        .unwrap();

        assert_eq!(config.basestation.response_timeout(), Duration::from_secs(4));
        assert_eq!(config.basestation.discovery_window(), Duration::from_secs(30));
        assert_eq!(
            config.storage,
            StorageConfig::Csv {
                dir: "data".into()
            }
        );
        assert_eq!(config.radio, UdpRadioConfig::default());
    }
}

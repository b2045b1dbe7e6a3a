pub mod agent;
pub mod cache;
pub mod config;
pub mod gps;
pub mod ingest;
pub mod join;
pub mod responder;
pub mod sensor;

pub use agent::{AgentConfig, AgentError, AgentState, NodeAgent};
pub use cache::ReadingCache;
pub use config::{Config, GpsConfig, SensorsConfig};
pub use gps::{
    GpsSource, NmeaError, SharedFix, parse_rmc, spawn_nmea_reader, spawn_serial_reader,
};
pub use join::{JoinError, JoinPolicy, join};
pub use responder::{Dropped, Responder, serve};
pub use sensor::{Notification, SensorError, SensorSource, SimulatedThingy, decode_thingy};

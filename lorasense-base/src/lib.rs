pub mod api;
pub mod config;
pub mod join;
pub mod poll;
pub mod registry;
pub mod state;
pub mod station;

pub use api::AppState;
pub use config::{BasestationConfig, Config, ServerConfig};
pub use join::{JoinRejection, admit, run_discovery};
pub use poll::{CycleReport, PollOutcome, Poller};
pub use registry::{NodeRecord, NodeRegistry, RegistryError};
pub use state::{BaseState, NodeStats, StatusSnapshot};
pub use station::Basestation;

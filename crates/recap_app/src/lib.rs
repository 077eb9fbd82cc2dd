//! Recap app: runs the job coordination core against the IO engine.
mod config;
mod coordinator;
mod effects;
pub mod logging;

pub use config::{AppConfig, ChannelPreference, ConfigError, DEFAULT_CONFIG_FILE};
pub use coordinator::JobCoordinator;
pub use effects::HandoffOutcome;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use recap_core::ChannelKind;
use recap_engine::EngineSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "recap.ron";

/// How progress is observed once the upload is done.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPreference {
    #[default]
    Poll,
    Push,
    /// Only the submit response is awaited; a backend acknowledgement still
    /// opens the channel it advertises.
    None,
}

impl ChannelPreference {
    pub fn channel(self) -> Option<ChannelKind> {
        match self {
            ChannelPreference::Poll => Some(ChannelKind::Poll),
            ChannelPreference::Push => Some(ChannelKind::Push),
            ChannelPreference::None => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// User-facing settings, stored as RON.
///
/// Missing fields fall back to their defaults, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub channel: ChannelPreference,
    pub poll_interval_ms: u64,
    pub max_consecutive_poll_failures: u32,
    pub storage_dir: PathBuf,
    pub result_key: String,
    pub navigation_delay_ms: u64,
    pub results_route: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            base_url: engine.base_url,
            channel: ChannelPreference::default(),
            poll_interval_ms: engine.poll_interval.as_millis() as u64,
            max_consecutive_poll_failures: engine.max_consecutive_poll_failures,
            storage_dir: engine.storage_dir,
            result_key: engine.result_key,
            navigation_delay_ms: engine.navigation_delay.as_millis() as u64,
            results_route: engine.results_route,
        }
    }
}

impl AppConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("No config at {:?}; using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        engine_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Like [`AppConfig::load`], but an unusable file only costs a warning.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                engine_warn!("{}; using defaults", err);
                Self::default()
            }
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        if !(250..=1000).contains(&self.poll_interval_ms) {
            engine_warn!(
                "Poll interval of {} ms is outside the recommended 250-1000 ms",
                self.poll_interval_ms
            );
        }
        EngineSettings {
            base_url: self.base_url.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_poll_failures: self.max_consecutive_poll_failures,
            storage_dir: self.storage_dir.clone(),
            result_key: self.result_key.clone(),
            navigation_delay: Duration::from_millis(self.navigation_delay_ms),
            results_route: self.results_route.clone(),
            ..EngineSettings::default()
        }
    }
}

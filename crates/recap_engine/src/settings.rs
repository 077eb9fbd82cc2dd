use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::TransportError;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub submit_path: String,
    pub poll_path: String,
    pub stream_path: String,
    pub connect_timeout: Duration,
    /// Whole submit request; the backend may analyze inline for minutes.
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub max_consecutive_poll_failures: u32,
    pub upload_chunk_size: usize,
    pub storage_dir: PathBuf,
    pub result_key: String,
    pub navigation_delay: Duration,
    pub results_route: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            submit_path: "/api/analyze".to_string(),
            poll_path: "/api/progress".to_string(),
            stream_path: "/api/progress/stream".to_string(),
            connect_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15 * 60),
            poll_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            max_consecutive_poll_failures: 5,
            upload_chunk_size: 64 * 1024,
            storage_dir: PathBuf::from("."),
            result_key: "film_log_stats".to_string(),
            navigation_delay: Duration::from_millis(1500),
            results_route: "/results".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn submit_url(&self) -> Result<Url, TransportError> {
        self.endpoint(&self.submit_path)
    }

    pub fn poll_url(&self, session: &str) -> Result<Url, TransportError> {
        let mut url = self.endpoint(&self.poll_path)?;
        url.query_pairs_mut().append_pair("session", session);
        Ok(url)
    }

    pub fn stream_url(&self, session: &str) -> Result<Url, TransportError> {
        let mut url = self.endpoint(&self.stream_path)?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(session);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let base = Url::parse(&self.base_url)
            .map_err(|err| TransportError::InvalidUrl(format!("{}: {err}", self.base_url)))?;
        base.join(path)
            .map_err(|err| TransportError::InvalidUrl(format!("{path}: {err}")))
    }
}

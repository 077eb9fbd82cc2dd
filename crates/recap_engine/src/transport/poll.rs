use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use reqwest::StatusCode;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ProgressSink, ProgressSource};
use crate::types::map_reqwest_error;
use crate::{EngineSettings, TransportError};

/// Fetches the latest progress snapshot on a fixed interval.
///
/// Requests never overlap: the next tick waits for the previous response.
/// Individual failures are tolerated until `max_failures` happen in a row.
#[derive(Debug, Clone)]
pub struct PollingStrategy {
    client: reqwest::Client,
    settings: EngineSettings,
}

impl PollingStrategy {
    pub fn new(settings: &EngineSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.poll_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn interval(&self) -> Duration {
        self.settings.poll_interval.max(Duration::from_millis(10))
    }

    /// One poll. `Ok(None)` means the server had nothing to report.
    async fn poll_once(&self, session: &str) -> Result<Option<String>, TransportError> {
        let url = self.settings.poll_url(session)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await.map_err(map_reqwest_error)?;
        let body = body.trim();
        Ok((!body.is_empty()).then(|| body.to_string()))
    }
}

#[async_trait::async_trait]
impl ProgressSource for PollingStrategy {
    async fn run(&self, session: &str, sink: &dyn ProgressSink, cancel: CancellationToken) {
        let max_failures = self.settings.max_consecutive_poll_failures.max(1);
        let mut ticker = tokio::time::interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures = 0u32;
        let mut last_body: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.poll_once(session) => outcome,
            };

            match outcome {
                Ok(Some(body)) => {
                    failures = 0;
                    if last_body.as_deref() == Some(body.as_str()) {
                        continue;
                    }
                    last_body = Some(body.clone());
                    sink.on_update(body);
                }
                Ok(None) => {
                    failures = 0;
                    engine_debug!("Poll for session {} returned no progress", session);
                }
                Err(err) => {
                    failures += 1;
                    engine_warn!(
                        "Poll {}/{} for session {} failed: {}",
                        failures,
                        max_failures,
                        session,
                        err
                    );
                    if failures >= max_failures {
                        sink.on_error(TransportError::PollBudgetExhausted {
                            attempts: failures,
                            last: err.to_string(),
                        });
                        break;
                    }
                }
            }
        }
        engine_debug!("Polling for session {} stopped", session);
    }
}

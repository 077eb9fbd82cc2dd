use engine_logging::{engine_debug, engine_info};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;

use super::{ProgressSink, ProgressSource, SseDecoder};
use crate::types::map_reqwest_error;
use crate::{EngineSettings, TransportError};

/// Reads a server-sent event stream keyed by the job's session.
///
/// The stream cannot tell a network blip from a server shutdown, so any
/// connection error, bad status or end of stream is reported as fatal.
#[derive(Debug, Clone)]
pub struct PushStrategy {
    client: reqwest::Client,
    settings: EngineSettings,
}

impl PushStrategy {
    pub fn new(settings: &EngineSettings) -> Result<Self, TransportError> {
        // No total timeout: the stream stays open for the whole analysis.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    async fn stream(&self, session: &str, sink: &dyn ProgressSink) -> Result<(), TransportError> {
        let url = self.settings.stream_url(session)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        engine_info!("Progress stream open for session {}", session);

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            for frame in decoder.push(&chunk)? {
                sink.on_update(frame);
            }
        }
        for frame in decoder.finish() {
            sink.on_update(frame);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressSource for PushStrategy {
    async fn run(&self, session: &str, sink: &dyn ProgressSink, cancel: CancellationToken) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                engine_debug!("Progress stream for session {} disposed", session);
                return;
            }
            outcome = self.stream(session, sink) => outcome,
        };
        // A clean close right after a terminal frame is dropped by the owner,
        // which has already left the running state.
        sink.on_error(outcome.err().unwrap_or(TransportError::StreamClosed));
    }
}

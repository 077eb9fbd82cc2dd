use std::sync::Arc;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_info};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::types::map_reqwest_error;
use crate::{Channel, EngineSettings, SubmitResponse, TransportError, UploadFile};

/// Receives byte-level progress of an upload body.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, sent: u64, total: u64);
    /// The last byte was handed to the connection.
    fn on_sent(&self);
}

/// Submits the archive as a multipart body, reporting upload progress.
///
/// Only the transfer itself is observable through this strategy; whatever
/// the server does afterwards needs a polling or push channel.
#[derive(Debug, Clone)]
pub struct UploadStrategy {
    client: reqwest::Client,
    settings: EngineSettings,
}

impl UploadStrategy {
    pub fn new(settings: &EngineSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.submit_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    pub async fn submit(
        &self,
        file: &UploadFile,
        session: &str,
        observer: Arc<dyn UploadObserver>,
    ) -> Result<SubmitResponse, TransportError> {
        let url = self.settings.submit_url()?;
        let bytes = tokio::fs::read(&file.path).await?;
        let total = bytes.len() as u64;
        engine_info!("Uploading {} ({} bytes) to {}", file.name, total, url);

        let body = progress_body(Bytes::from(bytes), self.settings.upload_chunk_size, observer);
        let part = Part::stream_with_length(body, total)
            .file_name(file.name.clone())
            .mime_str(mime_for(&file.name))
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;
        let form = Form::new()
            .text("session", session.to_string())
            .part("file", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        engine_debug!("Submit answered {} with {} bytes", status, text.len());
        if status.is_success() {
            parse_accepted_body(&text)
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&text).unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            })
        }
    }
}

fn mime_for(name: &str) -> &'static str {
    if name.to_ascii_lowercase().ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    }
}

/// Streams `bytes` in chunks, reporting each chunk as it is pulled.
fn progress_body(bytes: Bytes, chunk_size: usize, observer: Arc<dyn UploadObserver>) -> reqwest::Body {
    let total = bytes.len();
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..total)
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(total)))
        .collect();

    let mut sent = 0usize;
    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len();
        observer.on_progress(sent as u64, total as u64);
        if sent == total {
            observer.on_sent();
        }
        Ok::<_, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

/// Interprets a 2xx submit body.
fn parse_accepted_body(text: &str) -> Result<SubmitResponse, TransportError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;
    let Value::Object(fields) = &value else {
        return Err(TransportError::InvalidResponse("expected a JSON object".into()));
    };

    if fields.get("status").and_then(Value::as_str) == Some("error") {
        let detail = error_detail(text).unwrap_or_else(|| "Analysis failed".to_string());
        return Err(TransportError::Rejected { status: 200, detail });
    }
    if let Some(result) = fields.get("stats").or_else(|| fields.get("result")) {
        return Ok(SubmitResponse::Result(result.clone()));
    }

    let session = ["job_id", "session_id", "session"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    let channel = fields
        .get("channel")
        .and_then(Value::as_str)
        .and_then(Channel::from_name);
    if session.is_some() || channel.is_some() {
        return Ok(SubmitResponse::Accepted { session, channel });
    }
    Ok(SubmitResponse::Result(value))
}

/// Human-readable message from an error body, if it has one.
fn error_detail(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_body_is_a_result() {
        let response =
            parse_accepted_body(r#"{"status":"success","session_id":"abc","stats":{"films":2}}"#)
                .unwrap();
        assert_eq!(response, SubmitResponse::Result(json!({"films": 2})));
    }

    #[test]
    fn id_body_is_an_acknowledgement() {
        let response = parse_accepted_body(r#"{"job_id":"j-1","channel":"sse"}"#).unwrap();
        assert_eq!(
            response,
            SubmitResponse::Accepted {
                session: Some("j-1".into()),
                channel: Some(Channel::Push),
            }
        );
    }

    #[test]
    fn error_status_in_ok_body_is_rejected() {
        let err = parse_accepted_body(r#"{"status":"error","message":"Analysis failed: x"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Analysis failed: x");
    }

    #[test]
    fn non_json_body_is_invalid() {
        assert!(matches!(
            parse_accepted_body("<html>"),
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[test]
    fn detail_is_preferred_over_message() {
        assert_eq!(
            error_detail(r#"{"detail":"Please upload a ZIP file.","message":"x"}"#).as_deref(),
            Some("Please upload a ZIP file.")
        );
        assert_eq!(error_detail("oops"), None);
    }
}

use std::io;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

pub type JobId = u64;

/// Server-side progress delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Poll,
    Push,
}

impl Channel {
    /// Parses the channel name a backend advertises in its acknowledgement.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "poll" | "polling" => Some(Channel::Poll),
            "push" | "stream" | "sse" => Some(Channel::Push),
            _ => None,
        }
    }
}

/// The archive to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
}

/// Successful answer of the submit endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// Analysis ran inline; this is the final payload.
    Result(Value),
    /// Job accepted for background processing.
    Accepted {
        session: Option<String>,
        channel: Option<Channel>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    UploadProgress { job_id: JobId, sent: u64, total: u64 },
    UploadSent { job_id: JobId },
    SubmitCompleted {
        job_id: JobId,
        result: Result<SubmitResponse, TransportError>,
    },
    ChannelMessage { job_id: JobId, raw: String },
    ChannelFailed { job_id: JobId, error: TransportError },
    HandoffCompleted {
        job_id: JobId,
        stored: Option<PathBuf>,
        route: String,
    },
    HandoffFailed { job_id: JobId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Rejected by the backend; `detail` is the server's own message.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to read upload: {0}")]
    Io(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{attempts} consecutive polls failed, last: {last}")]
    PollBudgetExhausted { attempts: u32, last: String },
    #[error("progress stream closed by server")]
    StreamClosed,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(err.to_string());
    }
    if err.is_builder() {
        return TransportError::InvalidUrl(err.to_string());
    }
    TransportError::Network(err.to_string())
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

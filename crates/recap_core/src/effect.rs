use serde_json::Value;

use crate::{ChannelKind, JobId, SessionToken, SourceFile};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartUpload {
        job_id: JobId,
        file: SourceFile,
        session: SessionToken,
    },
    OpenChannel {
        job_id: JobId,
        channel: ChannelKind,
        session: SessionToken,
    },
    CloseChannel { job_id: JobId },
    AbortUpload { job_id: JobId },
    /// Persist the payload and navigate to the results view.
    HandOff { job_id: JobId, result: Option<Value> },
}

use crate::{JobId, SessionToken, SourceFile, SubmitOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User asked to analyze a file. `None` when nothing was chosen.
    SubmitRequested {
        file: Option<SourceFile>,
        session: SessionToken,
    },
    /// The chosen file could not be read; nothing is submitted.
    SubmitRejected { reason: String },
    /// Bytes of the upload body handed to the transport so far.
    UploadProgress { job_id: JobId, sent: u64, total: u64 },
    /// The whole upload body was sent; the backend now owns the job.
    UploadSent { job_id: JobId },
    /// The submit request returned successfully.
    SubmitSucceeded { job_id: JobId, outcome: SubmitOutcome },
    /// The submit request failed or was rejected.
    SubmitFailed { job_id: JobId, detail: String },
    /// One raw frame from the observation channel.
    ChannelMessage { job_id: JobId, raw: String },
    /// The observation channel died.
    ChannelFailed { job_id: JobId, reason: String },
    /// User abandoned the job.
    CancelClicked,
    /// The owner is going away; release every resource.
    Teardown,
    /// Fallback for placeholder wiring.
    NoOp,
}

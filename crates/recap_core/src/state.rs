use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::tracker::StageTracker;
use crate::view_model::AppViewModel;

pub type JobId = u64;

/// Opaque session token shared with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user-supplied archive. Only read by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Uploading,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Uploading | JobStatus::Running)
    }
}

/// Mechanism used to observe server-side progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Poll,
    Push,
}

/// What the backend said when the upload finished.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend ran the analysis inline and returned the payload.
    Result(Value),
    /// The backend accepted the job; progress must be observed.
    Accepted {
        session: Option<SessionToken>,
        channel: Option<ChannelKind>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Job {
    pub id: JobId,
    pub session: SessionToken,
    pub file: SourceFile,
    pub status: JobStatus,
    pub tracker: StageTracker,
    pub error: Option<String>,
    /// Channel currently open for this job, if any.
    pub channel: Option<ChannelKind>,
    pub upload_in_flight: bool,
    pub handed_off: bool,
}

impl Job {
    fn new(id: JobId, session: SessionToken, file: SourceFile) -> Self {
        Self {
            id,
            session,
            file,
            status: JobStatus::Uploading,
            tracker: StageTracker::new(),
            error: None,
            channel: None,
            upload_in_flight: true,
            handed_off: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    next_job_id: JobId,
    preferred_channel: Option<ChannelKind>,
    job: Option<Job>,
    notice: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_channel(Some(ChannelKind::Poll))
    }

    /// State whose jobs observe progress through `preferred`, or not at all.
    pub fn with_channel(preferred: Option<ChannelKind>) -> Self {
        Self {
            next_job_id: 1,
            preferred_channel: preferred,
            ..Self::default()
        }
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel::from_state(self.job.as_ref(), self.notice.as_deref(), self.dirty)
    }

    pub fn status(&self) -> JobStatus {
        self.job.as_ref().map_or(JobStatus::Idle, |job| job.status)
    }

    /// A job is still uploading, running, or owes its result hand-off.
    pub fn is_busy(&self) -> bool {
        self.job.as_ref().is_some_and(|job| {
            job.status.is_active() || (job.status == JobStatus::Complete && !job.handed_off)
        })
    }

    pub fn active_job_id(&self) -> Option<JobId> {
        self.job.as_ref().map(|job| job.id)
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn preferred_channel(&self) -> Option<ChannelKind> {
        self.preferred_channel
    }

    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    pub(crate) fn start_job(&mut self, session: SessionToken, file: SourceFile) -> JobId {
        let id = self.next_job_id;
        self.next_job_id += 1;
        self.job = Some(Job::new(id, session, file));
        self.notice = None;
        id
    }

    /// The job with `job_id`, if it is the current one.
    pub(crate) fn job_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        self.job.as_mut().filter(|job| job.id == job_id)
    }

    pub(crate) fn current_job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    pub(crate) fn clear_job(&mut self) -> Option<Job> {
        self.job.take()
    }
}

use serde::Serialize;

use crate::state::Job;
use crate::{JobStatus, StageKey};

/// Read-only snapshot published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AppViewModel {
    pub status: JobStatus,
    pub current_label: String,
    pub current_icon: &'static str,
    pub overall_fraction: f64,
    pub percent: u8,
    pub completed_stages: Vec<String>,
    pub error: Option<String>,
    pub session: Option<String>,
    pub file_name: Option<String>,
    #[serde(skip)]
    pub dirty: bool,
}

impl AppViewModel {
    pub(crate) fn from_state(job: Option<&Job>, notice: Option<&str>, dirty: bool) -> Self {
        let Some(job) = job else {
            return Self {
                error: notice.map(ToOwned::to_owned),
                dirty,
                ..Self::default()
            };
        };

        let tracker = &job.tracker;
        let fraction = tracker.overall_fraction();
        Self {
            status: job.status,
            current_label: tracker.label().to_string(),
            current_icon: tracker.icon(),
            overall_fraction: fraction,
            percent: (fraction * 100.0).floor() as u8,
            completed_stages: tracker
                .completed_stages()
                .iter()
                .map(StageKey::to_string)
                .collect(),
            error: notice.map(ToOwned::to_owned).or_else(|| job.error.clone()),
            session: Some(job.session.to_string()),
            file_name: Some(job.file.name.clone()),
            dirty,
        }
    }

    /// Progress UI is only shown while work is ongoing or finished cleanly.
    pub fn shows_progress(&self) -> bool {
        !matches!(self.status, JobStatus::Idle | JobStatus::Failed)
    }
}

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use recap_core::{update, AppState, AppViewModel, JobId, JobStatus, Msg, SessionToken, SourceFile};
use recap_engine::{EngineError, Navigator, ResultStore};
use uuid::Uuid;

use crate::effects::{translate, EffectRunner, HandoffOutcome, Inbound};
use crate::AppConfig;

/// Drives one analysis at a time: feeds engine events into the core state
/// machine and executes the effects it returns.
///
/// Everything runs on the owner's thread; the engine only does IO.
pub struct JobCoordinator {
    state: AppState,
    runner: EffectRunner,
    handoff: Option<HandoffOutcome>,
    /// The snapshot changed outside the core state.
    touched: bool,
    disposed: bool,
}

impl JobCoordinator {
    pub fn new(config: &AppConfig, navigator: Arc<dyn Navigator>) -> Result<Self, EngineError> {
        Ok(Self {
            state: AppState::with_channel(config.channel.channel()),
            runner: EffectRunner::new(config.engine_settings(), navigator)?,
            handoff: None,
            touched: false,
            disposed: false,
        })
    }

    /// Starts analyzing `path`. Returns the new job id, or `None` when the
    /// request was rejected or ignored; the snapshot explains rejections.
    pub fn submit(&mut self, path: Option<&Path>) -> Option<JobId> {
        if self.disposed {
            engine_warn!("Submit after dispose ignored");
            return None;
        }
        let before = self.state.active_job_id();
        let msg = match path.map(source_file) {
            None => Msg::SubmitRequested {
                file: None,
                session: new_session(),
            },
            Some(Ok(file)) => Msg::SubmitRequested {
                file: Some(file),
                session: new_session(),
            },
            Some(Err(reason)) => Msg::SubmitRejected { reason },
        };
        self.dispatch(msg);
        let after = self.state.active_job_id();
        if after != before {
            self.handoff = None;
            after
        } else {
            None
        }
    }

    /// Abandons the active job. The backend is not told.
    pub fn cancel(&mut self) {
        if !self.disposed {
            self.dispatch(Msg::CancelClicked);
        }
    }

    /// Releases every transport and pending hand-off. Idempotent.
    pub fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        engine_info!("Disposing job coordinator");
        self.dispatch_unchecked(Msg::Teardown);
        self.runner.engine().shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Applies every engine event already queued. Returns whether the
    /// snapshot changed; never true once disposed.
    pub fn pump(&mut self) -> bool {
        while let Some(event) = self.runner.engine().try_recv() {
            self.receive(translate(event));
        }
        let dirty = self.state.consume_dirty();
        let touched = std::mem::take(&mut self.touched);
        !self.disposed && (dirty || touched)
    }

    /// Waits up to `timeout` for the next engine event, then pumps.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if let Some(event) = self.runner.engine().recv_timeout(timeout) {
            self.receive(translate(event));
        }
        self.pump()
    }

    pub fn snapshot(&self) -> AppViewModel {
        self.state.view()
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// How the last hand-off ended, once it has.
    pub fn handoff(&self) -> Option<&HandoffOutcome> {
        self.handoff.as_ref()
    }

    /// True once nothing more will happen for the current job.
    pub fn is_settled(&self) -> bool {
        match self.state.status() {
            JobStatus::Idle | JobStatus::Failed => true,
            JobStatus::Complete => self.handoff.is_some(),
            JobStatus::Uploading | JobStatus::Running => false,
        }
    }

    pub fn result_store(&self) -> &ResultStore {
        self.runner.engine().result_store()
    }

    fn receive(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Msg(msg) => self.dispatch(msg),
            Inbound::Handoff(outcome) => {
                let current = self.state.active_job_id();
                let job_id = match &outcome {
                    HandoffOutcome::Navigated { job_id, .. }
                    | HandoffOutcome::Failed { job_id, .. } => *job_id,
                };
                if current == Some(job_id) {
                    engine_debug!("Hand-off of job {} finished: {:?}", job_id, outcome);
                    self.handoff = Some(outcome);
                    self.touched = true;
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        if self.disposed {
            engine_debug!("Dropping {:?} after dispose", msg);
            return;
        }
        self.dispatch_unchecked(msg);
    }

    fn dispatch_unchecked(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.run(effects);
    }
}

impl Drop for JobCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn new_session() -> SessionToken {
    SessionToken::new(Uuid::new_v4().to_string())
}

/// Describes the chosen file, or explains why it cannot be used.
fn source_file(path: &Path) -> Result<SourceFile, String> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let unreadable = |err: std::io::Error| format!("Could not read {name}: {err}");

    let meta = std::fs::metadata(path).map_err(unreadable)?;
    if !meta.is_file() {
        return Err(format!("{name} is not a file"));
    }
    File::open(path).map_err(unreadable)?;
    Ok(SourceFile {
        path: path.to_path_buf(),
        name,
        len: meta.len(),
    })
}

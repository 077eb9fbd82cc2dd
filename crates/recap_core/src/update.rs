use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::catalog::{self, UPLOAD_STAGE};
use crate::progress::{ratio, ProgressUpdate, StageKey, Terminal};
use crate::state::Job;
use crate::{AppState, ChannelKind, Effect, JobId, JobStatus, Msg, SessionToken, SourceFile, SubmitOutcome};

pub const CONNECTION_LOST: &str = "Lost connection to the analysis server";
pub const NO_FILE_SELECTED: &str = "Choose an archive to analyze first";
pub const EMPTY_FILE: &str = "The selected file is empty";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::SubmitRequested { file, session } => submit(&mut state, file, session),
        Msg::SubmitRejected { reason } if !state.is_busy() => reject(&mut state, &reason),
        Msg::SubmitRejected { .. } => Vec::new(),
        Msg::UploadProgress { job_id, sent, total } => {
            upload_progress(&mut state, job_id, ratio(sent, total).unwrap_or(0.0))
        }
        Msg::UploadSent { job_id } => upload_sent(&mut state, job_id),
        Msg::SubmitSucceeded { job_id, outcome } => submit_succeeded(&mut state, job_id, outcome),
        Msg::SubmitFailed { job_id, detail } => submit_failed(&mut state, job_id, detail),
        Msg::ChannelMessage { job_id, raw } => channel_message(&mut state, job_id, &raw),
        Msg::ChannelFailed { job_id, reason } => channel_failed(&mut state, job_id, &reason),
        Msg::CancelClicked if state.status().is_terminal() => {
            engine_debug!("Nothing to cancel; job already {:?}", state.status());
            Vec::new()
        }
        Msg::CancelClicked => match state.clear_job() {
            Some(mut job) => {
                engine_info!("Job {} cancelled by user", job.id);
                state.mark_dirty();
                release(&mut job)
            }
            None => Vec::new(),
        },
        Msg::Teardown => state.current_job_mut().map(release).unwrap_or_default(),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn submit(state: &mut AppState, file: Option<SourceFile>, session: SessionToken) -> Vec<Effect> {
    if state.is_busy() {
        engine_debug!("Ignoring submit while a job is in progress");
        return Vec::new();
    }
    let file = match file {
        Some(file) if file.len > 0 => file,
        Some(_) => return reject(state, EMPTY_FILE),
        None => return reject(state, NO_FILE_SELECTED),
    };

    let job_id = state.start_job(session.clone(), file.clone());
    engine_info!("Job {} submitting {} ({} bytes)", job_id, file.name, file.len);
    state.mark_dirty();
    vec![Effect::StartUpload {
        job_id,
        file,
        session,
    }]
}

fn reject(state: &mut AppState, notice: &str) -> Vec<Effect> {
    state.set_notice(Some(notice.to_string()));
    state.mark_dirty();
    Vec::new()
}

fn upload_progress(state: &mut AppState, job_id: JobId, fraction: f64) -> Vec<Effect> {
    let Some(job) = state.job_mut(job_id) else {
        return Vec::new();
    };
    if job.status != JobStatus::Uploading {
        return Vec::new();
    }
    job.tracker.apply(&upload_update(fraction));
    state.mark_dirty();
    Vec::new()
}

fn upload_sent(state: &mut AppState, job_id: JobId) -> Vec<Effect> {
    let preferred = state.preferred_channel();
    let Some(job) = state.job_mut(job_id) else {
        return Vec::new();
    };
    if job.status != JobStatus::Uploading {
        return Vec::new();
    }
    job.tracker.apply(&upload_update(1.0));
    job.status = JobStatus::Running;

    // Polling is keyed by the client-side session, so it can start before
    // the backend answers. A push stream waits for the acknowledgement.
    let effects = match preferred {
        Some(ChannelKind::Poll) => vec![open_channel(job, ChannelKind::Poll)],
        _ => Vec::new(),
    };
    state.mark_dirty();
    effects
}

fn submit_succeeded(state: &mut AppState, job_id: JobId, outcome: SubmitOutcome) -> Vec<Effect> {
    let preferred = state.preferred_channel();
    let Some(job) = state.job_mut(job_id) else {
        return Vec::new();
    };
    job.upload_in_flight = false;

    let effects = match (job.status, outcome) {
        (JobStatus::Complete, outcome) if !job.handed_off => {
            let result = match outcome {
                SubmitOutcome::Result(result) => Some(result),
                SubmitOutcome::Accepted { .. } => None,
            };
            hand_off(job, result)
        }
        (JobStatus::Uploading | JobStatus::Running, SubmitOutcome::Result(result)) => {
            job.tracker
                .apply(&ProgressUpdate::success("Analysis complete", None));
            job.status = JobStatus::Complete;
            let mut effects = close_channel(job);
            effects.extend(hand_off(job, Some(result)));
            effects
        }
        (JobStatus::Uploading | JobStatus::Running, SubmitOutcome::Accepted { session, channel }) => {
            job.status = JobStatus::Running;
            let reassigned = session.filter(|session| *session != job.session);
            let kind = channel.or(job.channel).or(preferred).unwrap_or(ChannelKind::Poll);
            if reassigned.is_none() && job.channel == Some(kind) {
                engine_debug!("Job {} accepted; {:?} channel already open", job.id, kind);
                Vec::new()
            } else {
                // The backend's token and channel replace whatever the
                // client opened on its own.
                if let Some(session) = reassigned {
                    job.session = session;
                }
                engine_info!("Job {} accepted as session {}; observing via {:?}", job.id, job.session, kind);
                let mut effects = close_channel(job);
                effects.push(open_channel(job, kind));
                effects
            }
        }
        _ => Vec::new(),
    };
    state.mark_dirty();
    effects
}

fn submit_failed(state: &mut AppState, job_id: JobId, detail: String) -> Vec<Effect> {
    let Some(job) = state.job_mut(job_id) else {
        return Vec::new();
    };
    job.upload_in_flight = false;
    let effects = match job.status {
        JobStatus::Uploading | JobStatus::Running => {
            engine_warn!("Job {} submission failed: {}", job.id, detail);
            fail(job, detail)
        }
        JobStatus::Complete if !job.handed_off => {
            engine_warn!("Job {} completed but its result was lost: {}", job.id, detail);
            hand_off(job, None)
        }
        _ => return Vec::new(),
    };
    state.mark_dirty();
    effects
}

fn channel_message(state: &mut AppState, job_id: JobId, raw: &str) -> Vec<Effect> {
    let Some(job) = state.job_mut(job_id).filter(|job| job.status.is_active()) else {
        engine_debug!("Dropping late frame for job {}", job_id);
        return Vec::new();
    };

    let update = crate::normalize(raw);
    let applied = job.tracker.apply(&update);
    engine_debug!("Job {} frame {:?} -> {} ({:?})", job.id, raw, update.stage_key, applied);

    let effects = match update.terminal {
        None => Vec::new(),
        Some(Terminal::Failure { detail }) => {
            engine_warn!("Job {} failed: {}", job.id, detail);
            fail(job, detail)
        }
        Some(Terminal::Success { result }) => {
            engine_info!("Job {} complete", job.id);
            job.status = JobStatus::Complete;
            let mut effects = close_channel(job);
            match result {
                Some(result) => effects.extend(hand_off(job, Some(result))),
                // The submit response still owes us the payload.
                None if job.upload_in_flight => {}
                None => effects.extend(hand_off(job, None)),
            }
            effects
        }
    };
    state.mark_dirty();
    effects
}

fn channel_failed(state: &mut AppState, job_id: JobId, reason: &str) -> Vec<Effect> {
    let Some(job) = state.job_mut(job_id).filter(|job| job.status.is_active()) else {
        return Vec::new();
    };
    engine_warn!("Job {} channel failed: {}", job.id, reason);
    let effects = fail(job, CONNECTION_LOST.to_string());
    state.mark_dirty();
    effects
}

/// The upload is a client-side phase, so it never enters the stage history.
fn upload_update(fraction: f64) -> ProgressUpdate {
    let key = StageKey::new(UPLOAD_STAGE);
    let overall = catalog::lookup(&key).map_or(fraction, |info| info.overall(fraction));
    let label = catalog::label_for(&key, "");
    let icon = catalog::icon_for(&key);
    ProgressUpdate::in_progress(StageKey::unknown(), label, icon, overall)
}

fn open_channel(job: &mut Job, channel: ChannelKind) -> Effect {
    job.channel = Some(channel);
    Effect::OpenChannel {
        job_id: job.id,
        channel,
        session: job.session.clone(),
    }
}

fn close_channel(job: &mut Job) -> Vec<Effect> {
    match job.channel.take() {
        Some(_) => vec![Effect::CloseChannel { job_id: job.id }],
        None => Vec::new(),
    }
}

/// Releases every resource the job holds. Safe to call repeatedly.
fn release(job: &mut Job) -> Vec<Effect> {
    let mut effects = close_channel(job);
    if std::mem::take(&mut job.upload_in_flight) {
        effects.push(Effect::AbortUpload { job_id: job.id });
    }
    effects
}

fn fail(job: &mut Job, detail: String) -> Vec<Effect> {
    job.tracker.apply(&ProgressUpdate::failure(detail.clone()));
    job.status = JobStatus::Failed;
    job.error = Some(detail);
    release(job)
}

fn hand_off(job: &mut Job, result: Option<serde_json::Value>) -> Vec<Effect> {
    if job.handed_off {
        return Vec::new();
    }
    job.handed_off = true;
    vec![Effect::HandOff {
        job_id: job.id,
        result,
    }]
}

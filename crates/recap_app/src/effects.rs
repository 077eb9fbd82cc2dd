use std::path::PathBuf;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use recap_core::{ChannelKind, Effect, JobId, Msg, SessionToken, SubmitOutcome};
use recap_engine::{
    Channel, EngineError, EngineEvent, EngineHandle, EngineSettings, Navigator, SubmitResponse,
    UploadFile,
};

/// How the result hand-off of a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    Navigated {
        job_id: JobId,
        stored: Option<PathBuf>,
        route: String,
    },
    Failed { job_id: JobId, message: String },
}

/// What an engine event means to the coordinator.
pub(crate) enum Inbound {
    Msg(Msg),
    Handoff(HandoffOutcome),
}

/// Executes core effects on the engine.
pub(crate) struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(settings: EngineSettings, navigator: Arc<dyn Navigator>) -> Result<Self, EngineError> {
        Ok(Self {
            engine: EngineHandle::new(settings, navigator)?,
        })
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartUpload {
                    job_id,
                    file,
                    session,
                } => {
                    engine_info!("StartUpload job_id={} file={:?}", job_id, file.path);
                    self.engine.start_upload(
                        job_id,
                        UploadFile {
                            path: file.path,
                            name: file.name,
                        },
                        session.as_str(),
                    );
                }
                Effect::OpenChannel {
                    job_id,
                    channel,
                    session,
                } => {
                    engine_debug!("OpenChannel job_id={} channel={:?}", job_id, channel);
                    self.engine
                        .open_channel(job_id, map_channel(channel), session.as_str());
                }
                Effect::CloseChannel { job_id } => self.engine.close_channel(job_id),
                Effect::AbortUpload { job_id } => self.engine.abort_upload(job_id),
                Effect::HandOff { job_id, result } => {
                    engine_debug!("HandOff job_id={} with_result={}", job_id, result.is_some());
                    self.engine.hand_off(job_id, result);
                }
            }
        }
    }
}

pub(crate) fn translate(event: EngineEvent) -> Inbound {
    let msg = match event {
        EngineEvent::UploadProgress {
            job_id,
            sent,
            total,
        } => Msg::UploadProgress {
            job_id,
            sent,
            total,
        },
        EngineEvent::UploadSent { job_id } => Msg::UploadSent { job_id },
        EngineEvent::SubmitCompleted { job_id, result } => match result {
            Ok(response) => Msg::SubmitSucceeded {
                job_id,
                outcome: map_response(response),
            },
            Err(err) => {
                engine_warn!("Submit of job {} failed: {:?}", job_id, err);
                Msg::SubmitFailed {
                    job_id,
                    detail: err.to_string(),
                }
            }
        },
        EngineEvent::ChannelMessage { job_id, raw } => Msg::ChannelMessage { job_id, raw },
        EngineEvent::ChannelFailed { job_id, error } => Msg::ChannelFailed {
            job_id,
            reason: error.to_string(),
        },
        EngineEvent::HandoffCompleted {
            job_id,
            stored,
            route,
        } => {
            return Inbound::Handoff(HandoffOutcome::Navigated {
                job_id,
                stored,
                route,
            })
        }
        EngineEvent::HandoffFailed { job_id, message } => {
            return Inbound::Handoff(HandoffOutcome::Failed { job_id, message })
        }
    };
    Inbound::Msg(msg)
}

fn map_response(response: SubmitResponse) -> SubmitOutcome {
    match response {
        SubmitResponse::Result(value) => SubmitOutcome::Result(value),
        SubmitResponse::Accepted { session, channel } => SubmitOutcome::Accepted {
            session: session.map(SessionToken::new),
            channel: channel.map(|channel| match channel {
                Channel::Poll => ChannelKind::Poll,
                Channel::Push => ChannelKind::Push,
            }),
        },
    }
}

fn map_channel(channel: ChannelKind) -> Channel {
    match channel {
        ChannelKind::Poll => Channel::Poll,
        ChannelKind::Push => Channel::Push,
    }
}

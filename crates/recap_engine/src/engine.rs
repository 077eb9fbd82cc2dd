use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info};
use serde_json::Value;

use crate::handoff::{Navigator, ResultHandoff};
use crate::persist::ResultStore;
use crate::transport::{
    PollingStrategy, ProgressSink, ProgressSource, PushStrategy, TransportHandle, UploadObserver,
    UploadStrategy,
};
use crate::{Channel, EngineError, EngineEvent, EngineSettings, JobId, TransportError, UploadFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TaskKind {
    Upload,
    Channel,
    Handoff,
}

type TaskMap = Arc<Mutex<HashMap<(JobId, TaskKind), TransportHandle>>>;

enum EngineCommand {
    Upload {
        job_id: JobId,
        file: UploadFile,
        session: String,
        handle: TransportHandle,
    },
    Observe {
        job_id: JobId,
        channel: Channel,
        session: String,
        handle: TransportHandle,
    },
    HandOff {
        job_id: JobId,
        result: Option<Value>,
        handle: TransportHandle,
    },
}

struct Services {
    upload: UploadStrategy,
    poll: Arc<dyn ProgressSource>,
    push: Arc<dyn ProgressSource>,
    handoff: ResultHandoff,
}

/// Runs transports on a background tokio runtime and reports back through
/// [`EngineEvent`]s.
///
/// Cancelling methods act on the caller's thread: once `close_channel`,
/// `abort_upload` or `shutdown` returns, the affected task delivers nothing.
pub struct EngineHandle {
    cmd_tx: Option<mpsc::Sender<EngineCommand>>,
    event_rx: mpsc::Receiver<EngineEvent>,
    tasks: TaskMap,
    store: ResultStore,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings, navigator: Arc<dyn Navigator>) -> Result<Self, EngineError> {
        let services = Arc::new(Services {
            upload: UploadStrategy::new(&settings)?,
            poll: Arc::new(PollingStrategy::new(&settings)?),
            push: Arc::new(PushStrategy::new(&settings)?),
            handoff: ResultHandoff::new(&settings, navigator),
        });
        let store = services.handoff.store().clone();

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let tasks = TaskMap::default();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("recap-io")
            .build()?;

        let worker_tasks = tasks.clone();
        thread::Builder::new()
            .name("recap-engine".into())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    let services = services.clone();
                    let event_tx = event_tx.clone();
                    let tasks = worker_tasks.clone();
                    runtime.spawn(async move {
                        handle_command(&services, command, event_tx, tasks).await;
                    });
                }
                engine_debug!("Engine command loop finished");
            })?;

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            event_rx,
            tasks,
            store,
        })
    }

    pub fn start_upload(&self, job_id: JobId, file: UploadFile, session: impl Into<String>) {
        let handle = self.register(job_id, TaskKind::Upload);
        self.send(EngineCommand::Upload {
            job_id,
            file,
            session: session.into(),
            handle,
        });
    }

    pub fn open_channel(&self, job_id: JobId, channel: Channel, session: impl Into<String>) {
        let handle = self.register(job_id, TaskKind::Channel);
        self.send(EngineCommand::Observe {
            job_id,
            channel,
            session: session.into(),
            handle,
        });
    }

    pub fn close_channel(&self, job_id: JobId) {
        self.dispose(job_id, TaskKind::Channel);
    }

    /// Stops reporting on an upload. The backend is not told.
    pub fn abort_upload(&self, job_id: JobId) {
        self.dispose(job_id, TaskKind::Upload);
    }

    pub fn hand_off(&self, job_id: JobId, result: Option<Value>) {
        let handle = self.register(job_id, TaskKind::Handoff);
        self.send(EngineCommand::HandOff {
            job_id,
            result,
            handle,
        });
    }

    /// Where completed results are stored.
    pub fn result_store(&self) -> &ResultStore {
        &self.store
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Disposes every running task, pending navigation included. Idempotent.
    pub fn shutdown(&self) {
        let handles: Vec<TransportHandle> = lock(&self.tasks).drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            engine_info!("Disposing {} engine task(s)", handles.len());
        }
        for handle in handles {
            handle.dispose();
        }
    }

    fn register(&self, job_id: JobId, kind: TaskKind) -> TransportHandle {
        let handle = TransportHandle::new();
        if let Some(previous) = lock(&self.tasks).insert((job_id, kind), handle.clone()) {
            previous.dispose();
        }
        handle
    }

    fn dispose(&self, job_id: JobId, kind: TaskKind) {
        if let Some(handle) = lock(&self.tasks).remove(&(job_id, kind)) {
            engine_debug!("Disposing {:?} task of job {}", kind, job_id);
            handle.dispose();
        }
    }

    fn send(&self, command: EngineCommand) {
        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(command);
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
        // Closing the command channel ends the worker thread and its runtime.
        self.cmd_tx.take();
    }
}

fn lock(tasks: &TaskMap) -> MutexGuard<'_, HashMap<(JobId, TaskKind), TransportHandle>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the registry entry, unless a newer task took its slot.
fn forget(tasks: &TaskMap, job_id: JobId, kind: TaskKind, handle: &TransportHandle) {
    let mut tasks = lock(tasks);
    if tasks
        .get(&(job_id, kind))
        .is_some_and(|current| current.same_as(handle))
    {
        tasks.remove(&(job_id, kind));
    }
}

async fn handle_command(
    services: &Services,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
    tasks: TaskMap,
) {
    match command {
        EngineCommand::Upload {
            job_id,
            file,
            session,
            handle,
        } => {
            let observer = Arc::new(UploadEvents {
                job_id,
                tx: event_tx.clone(),
                handle: handle.clone(),
            });
            let token = handle.token();
            let result = tokio::select! {
                _ = token.cancelled() => {
                    engine_debug!("Upload of job {} aborted", job_id);
                    return;
                }
                result = services.upload.submit(&file, &session, observer) => result,
            };
            {
                let _gate = handle.deliver();
                if !handle.is_disposed() {
                    let _ = event_tx.send(EngineEvent::SubmitCompleted { job_id, result });
                }
            }
            handle.dispose();
            forget(&tasks, job_id, TaskKind::Upload, &handle);
        }
        EngineCommand::Observe {
            job_id,
            channel,
            session,
            handle,
        } => {
            let source = match channel {
                Channel::Poll => services.poll.clone(),
                Channel::Push => services.push.clone(),
            };
            engine_info!("Observing job {} via {:?} as session {}", job_id, channel, session);
            let sink = handle.guard(ChannelEvents {
                job_id,
                tx: event_tx,
            });
            source.run(&session, &sink, handle.token()).await;
            handle.dispose();
            forget(&tasks, job_id, TaskKind::Channel, &handle);
        }
        EngineCommand::HandOff {
            job_id,
            result,
            handle,
        } => {
            let token = handle.token();
            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    engine_debug!("Hand-off of job {} dropped", job_id);
                    return;
                }
                outcome = services.handoff.execute(result.as_ref()) => outcome,
            };
            let event = match outcome {
                Ok(stored) => EngineEvent::HandoffCompleted {
                    job_id,
                    stored,
                    route: services.handoff.route().to_string(),
                },
                Err(err) => {
                    engine_error!("Could not store result of job {}: {}", job_id, err);
                    EngineEvent::HandoffFailed {
                        job_id,
                        message: err.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
            handle.dispose();
            forget(&tasks, job_id, TaskKind::Handoff, &handle);
        }
    }
}

struct ChannelEvents {
    job_id: JobId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ProgressSink for ChannelEvents {
    fn on_update(&self, raw: String) {
        let _ = self.tx.send(EngineEvent::ChannelMessage {
            job_id: self.job_id,
            raw,
        });
    }

    fn on_error(&self, error: TransportError) {
        let _ = self.tx.send(EngineEvent::ChannelFailed {
            job_id: self.job_id,
            error,
        });
    }
}

struct UploadEvents {
    job_id: JobId,
    tx: mpsc::Sender<EngineEvent>,
    handle: TransportHandle,
}

impl UploadObserver for UploadEvents {
    fn on_progress(&self, sent: u64, total: u64) {
        let _gate = self.handle.deliver();
        if !self.handle.is_disposed() {
            let _ = self.tx.send(EngineEvent::UploadProgress {
                job_id: self.job_id,
                sent,
                total,
            });
        }
    }

    fn on_sent(&self) {
        let _gate = self.handle.deliver();
        if !self.handle.is_disposed() {
            let _ = self.tx.send(EngineEvent::UploadSent { job_id: self.job_id });
        }
    }
}

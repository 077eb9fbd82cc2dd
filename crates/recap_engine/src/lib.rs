//! Recap engine: transports, result hand-off and effect execution.
mod engine;
mod handoff;
mod persist;
mod settings;
pub mod transport;
mod types;

pub use engine::EngineHandle;
pub use handoff::{LogNavigator, Navigator, ResultHandoff};
pub use persist::{ensure_storage_dir, AtomicFileWriter, PersistError, ResultStore};
pub use settings::EngineSettings;
pub use transport::{
    PollingStrategy, ProgressSink, ProgressSource, PushStrategy, SseDecoder, TransportHandle,
    UploadObserver, UploadStrategy,
};
pub use types::{
    Channel, EngineError, EngineEvent, JobId, SubmitResponse, TransportError, UploadFile,
};

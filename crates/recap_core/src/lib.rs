//! Recap core: pure job-coordination state machine, progress normalization
//! and stage tracking.
mod catalog;
mod effect;
mod msg;
mod normalize;
mod progress;
mod state;
mod tracker;
mod update;
mod view_model;

pub use catalog::{icon_for, label_for, lookup as lookup_stage, StageInfo, UPLOAD_STAGE};
pub use effect::Effect;
pub use msg::Msg;
pub use normalize::normalize;
pub use progress::{ProgressUpdate, StageKey, Terminal};
pub use state::{AppState, ChannelKind, JobId, JobStatus, SessionToken, SourceFile, SubmitOutcome};
pub use tracker::{Applied, StageTracker};
pub use update::{update, CONNECTION_LOST, EMPTY_FILE, NO_FILE_SELECTED};
pub use view_model::AppViewModel;

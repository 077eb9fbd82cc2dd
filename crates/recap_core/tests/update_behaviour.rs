use std::path::PathBuf;
use std::sync::Once;

use pretty_assertions::assert_eq;
use recap_core::{
    update, AppState, ChannelKind, Effect, JobStatus, Msg, SessionToken, SourceFile,
    SubmitOutcome, CONNECTION_LOST, EMPTY_FILE, NO_FILE_SELECTED,
};
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn archive(len: u64) -> SourceFile {
    SourceFile {
        path: PathBuf::from("/tmp/letterboxd-export.zip"),
        name: "letterboxd-export.zip".to_string(),
        len,
    }
}

fn submit(state: AppState) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::SubmitRequested {
            file: Some(archive(2048)),
            session: SessionToken::new("client-token"),
        },
    )
}

fn running(state: AppState) -> (AppState, Vec<Effect>) {
    let (state, _) = submit(state);
    let job_id = state.active_job_id().expect("job started");
    update(state, Msg::UploadSent { job_id })
}

#[test]
fn submit_without_file_only_sets_notice() {
    init_logging();
    let (mut state, effects) = update(
        AppState::new(),
        Msg::SubmitRequested {
            file: None,
            session: SessionToken::new("s"),
        },
    );
    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.status, JobStatus::Idle);
    assert_eq!(view.error.as_deref(), Some(NO_FILE_SELECTED));
    assert!(state.consume_dirty());

    let (state, effects) = update(
        state,
        Msg::SubmitRequested {
            file: Some(archive(0)),
            session: SessionToken::new("s"),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().error.as_deref(), Some(EMPTY_FILE));
}

#[test]
fn unreadable_file_is_rejected_without_a_job() {
    init_logging();
    let (state, effects) = update(
        AppState::new(),
        Msg::SubmitRejected {
            reason: "Could not read export.zip: permission denied".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.active_job_id(), None);
    assert_eq!(
        state.view().error.as_deref(),
        Some("Could not read export.zip: permission denied")
    );

    // A running job keeps its own error slot untouched.
    let (state, _) = running(state);
    let (state, effects) = update(
        state,
        Msg::SubmitRejected {
            reason: "ignored".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().error, None);
}

#[test]
fn submit_starts_upload() {
    init_logging();
    let (state, effects) = submit(AppState::new());

    assert_eq!(state.status(), JobStatus::Uploading);
    assert_eq!(
        effects,
        vec![Effect::StartUpload {
            job_id: 1,
            file: archive(2048),
            session: SessionToken::new("client-token"),
        }]
    );

    // A second submit while the first job is active is ignored.
    let (state, effects) = submit(state);
    assert!(effects.is_empty());
    assert_eq!(state.active_job_id(), Some(1));
}

#[test]
fn upload_progress_moves_fraction_within_upload_slice() {
    init_logging();
    let (state, _) = submit(AppState::new());
    let (state, _) = update(
        state,
        Msg::UploadProgress {
            job_id: 1,
            sent: 1024,
            total: 2048,
        },
    );
    let view = state.view();
    assert_eq!(view.current_label, "Uploading archive");
    assert!((view.overall_fraction - 0.05).abs() < 1e-9);
    assert_eq!(view.percent, 5);
}

#[test]
fn upload_sent_opens_poll_channel() {
    init_logging();
    let (state, effects) = running(AppState::new());
    assert_eq!(state.status(), JobStatus::Running);
    assert_eq!(
        effects,
        vec![Effect::OpenChannel {
            job_id: 1,
            channel: ChannelKind::Poll,
            session: SessionToken::new("client-token"),
        }]
    );
}

#[test]
fn push_channel_waits_for_acknowledgement() {
    init_logging();
    let state = AppState::with_channel(Some(ChannelKind::Push));
    let (state, _) = submit(state);
    let (state, effects) = update(state, Msg::UploadSent { job_id: 1 });
    assert!(effects.is_empty());
    assert_eq!(state.status(), JobStatus::Running);

    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Accepted {
                session: Some(SessionToken::new("server-job-7")),
                channel: None,
            },
        },
    );
    assert_eq!(
        effects,
        vec![Effect::OpenChannel {
            job_id: 1,
            channel: ChannelKind::Push,
            session: SessionToken::new("server-job-7"),
        }]
    );
    assert_eq!(state.view().session.as_deref(), Some("server-job-7"));
}

#[test]
fn synchronous_result_completes_and_hands_off_once() {
    init_logging();
    let (state, _) = running(AppState::new());
    let stats = json!({"total_films": 312});
    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Result(stats.clone()),
        },
    );
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::HandOff {
                job_id: 1,
                result: Some(stats),
            },
        ]
    );
    let view = state.view();
    assert_eq!(view.status, JobStatus::Complete);
    assert_eq!(view.overall_fraction, 1.0);

    // A poll that was in flight during teardown lands afterwards.
    let (next, effects) = update(
        state.clone(),
        Msg::ChannelMessage {
            job_id: 1,
            raw: "[ERROR] too late".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(next.view().status, JobStatus::Complete);
    assert_eq!(next.view().error, None);
}

#[test]
fn done_sentinel_before_response_waits_for_result() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, effects) = update(
        state,
        Msg::ChannelMessage {
            job_id: 1,
            raw: r#"{"stage":"complete","message":"Analysis complete!","progress":4,"total":4}"#
                .to_string(),
        },
    );
    assert_eq!(effects, vec![Effect::CloseChannel { job_id: 1 }]);
    assert_eq!(state.status(), JobStatus::Complete);

    let stats = json!({"hours_watched": 401.5});
    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Result(stats.clone()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::HandOff {
            job_id: 1,
            result: Some(stats.clone()),
        }]
    );

    // Duplicate delivery of the response does not hand off again.
    let (_, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Result(stats),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn submission_error_surfaces_server_message() {
    init_logging();
    let (state, _) = submit(AppState::new());
    let (state, effects) = update(
        state,
        Msg::SubmitFailed {
            job_id: 1,
            detail: "Please upload a ZIP file.".to_string(),
        },
    );
    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("Please upload a ZIP file."));
    assert!(!view.shows_progress());

    // A new submission is allowed after a failure.
    let (state, effects) = submit(state);
    assert_eq!(effects.len(), 1);
    assert_eq!(state.active_job_id(), Some(2));
    assert_eq!(state.view().error, None);
}

#[test]
fn channel_failure_releases_channel_and_upload() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, effects) = update(
        state,
        Msg::ChannelFailed {
            job_id: 1,
            reason: "5 consecutive polls failed".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::AbortUpload { job_id: 1 },
        ]
    );
    assert_eq!(state.view().error.as_deref(), Some(CONNECTION_LOST));
}

#[test]
fn cancel_releases_resources_and_returns_to_idle() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (mut state, effects) = update(state, Msg::CancelClicked);
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::AbortUpload { job_id: 1 },
        ]
    );
    assert_eq!(state.status(), JobStatus::Idle);
    assert!(state.consume_dirty());

    let (state, effects) = update(
        state,
        Msg::ChannelMessage {
            job_id: 1,
            raw: "[stage=loading] 1/4".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.status(), JobStatus::Idle);
}

#[test]
fn teardown_is_idempotent() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, effects) = update(state, Msg::Teardown);
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::AbortUpload { job_id: 1 },
        ]
    );
    let (state, effects) = update(state, Msg::Teardown);
    assert!(effects.is_empty());
    let (_, effects) = update(state, Msg::Teardown);
    assert!(effects.is_empty());
}

#[test]
fn frames_for_a_previous_job_are_ignored() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, _) = update(state, Msg::CancelClicked);
    let (state, _) = running(state);
    assert_eq!(state.active_job_id(), Some(2));

    let before = state.view();
    let (state, effects) = update(
        state,
        Msg::ChannelMessage {
            job_id: 1,
            raw: "[DONE]".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().status, before.status);
    assert_eq!(state.view().overall_fraction, before.overall_fraction);
}

#[test]
fn acknowledgement_moves_polling_to_the_server_session_and_channel() {
    init_logging();
    let (state, effects) = running(AppState::new());
    assert_eq!(effects.len(), 1);

    let accepted = Msg::SubmitSucceeded {
        job_id: 1,
        outcome: SubmitOutcome::Accepted {
            session: Some(SessionToken::new("server-job-9")),
            channel: Some(ChannelKind::Push),
        },
    };
    let (state, effects) = update(state, accepted.clone());
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::OpenChannel {
                job_id: 1,
                channel: ChannelKind::Push,
                session: SessionToken::new("server-job-9"),
            },
        ]
    );
    assert_eq!(state.view().session.as_deref(), Some("server-job-9"));

    // Nothing new in a repeated acknowledgement.
    let (_, effects) = update(state, accepted);
    assert!(effects.is_empty());
}

#[test]
fn acknowledgement_matching_the_open_channel_changes_nothing() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Accepted {
                session: Some(SessionToken::new("client-token")),
                channel: None,
            },
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.status(), JobStatus::Running);
}

#[test]
fn cancel_leaves_finished_jobs_alone() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, _) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Result(json!({"total_films": 3})),
        },
    );
    let (state, effects) = update(state, Msg::CancelClicked);
    assert!(effects.is_empty());
    assert_eq!(state.status(), JobStatus::Complete);
    assert_eq!(state.active_job_id(), Some(1));

    let (state, _) = running(AppState::new());
    let (state, _) = update(
        state,
        Msg::ChannelFailed {
            job_id: 1,
            reason: "stream closed".to_string(),
        },
    );
    let (state, effects) = update(state, Msg::CancelClicked);
    assert!(effects.is_empty());
    assert_eq!(state.status(), JobStatus::Failed);
    assert_eq!(state.view().error.as_deref(), Some(CONNECTION_LOST));
}

#[test]
fn new_submit_waits_for_a_pending_hand_off() {
    init_logging();
    let (state, _) = running(AppState::new());
    let (state, _) = update(
        state,
        Msg::ChannelMessage {
            job_id: 1,
            raw: "[DONE]".to_string(),
        },
    );
    assert_eq!(state.status(), JobStatus::Complete);
    assert!(state.is_busy());

    let (state, effects) = submit(state);
    assert!(effects.is_empty());
    assert_eq!(state.active_job_id(), Some(1));

    let stats = json!({"films": 88});
    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Result(stats.clone()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::HandOff {
            job_id: 1,
            result: Some(stats),
        }]
    );
    assert!(!state.is_busy());

    let (state, effects) = submit(state);
    assert_eq!(effects.len(), 1);
    assert_eq!(state.active_job_id(), Some(2));
}

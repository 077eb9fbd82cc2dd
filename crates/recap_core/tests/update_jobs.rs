use std::path::PathBuf;

use recap_core::{
    update, AppState, ChannelKind, Effect, JobStatus, Msg, SessionToken, SourceFile,
    SubmitOutcome, CONNECTION_LOST,
};

/// Drives a job to `running` on a push channel and returns the state.
fn push_job() -> AppState {
    let state = AppState::with_channel(Some(ChannelKind::Push));
    let (state, _) = update(
        state,
        Msg::SubmitRequested {
            file: Some(SourceFile {
                path: PathBuf::from("export.zip"),
                name: "export.zip".to_string(),
                len: 10,
            }),
            session: SessionToken::new("abc"),
        },
    );
    let (state, _) = update(state, Msg::UploadSent { job_id: 1 });
    let (state, effects) = update(
        state,
        Msg::SubmitSucceeded {
            job_id: 1,
            outcome: SubmitOutcome::Accepted {
                session: None,
                channel: None,
            },
        },
    );
    assert!(matches!(effects.as_slice(), [Effect::OpenChannel { channel: ChannelKind::Push, .. }]));
    state
}

fn feed(mut state: AppState, frames: &[&str]) -> (AppState, Vec<Effect>) {
    let mut all = Vec::new();
    for frame in frames {
        let (next, effects) = update(
            state,
            Msg::ChannelMessage {
                job_id: 1,
                raw: frame.to_string(),
            },
        );
        state = next;
        all.extend(effects);
    }
    (state, all)
}

#[test]
fn three_stage_job_completes() {
    let (state, effects) = feed(
        push_job(),
        &[
            "[stage=extract] 1/4",
            "[stage=extract] 4/4",
            "[stage=enrich] 10/50",
            "[stage=enrich] 50/50",
            "[DONE]",
        ],
    );

    let view = state.view();
    assert_eq!(view.status, JobStatus::Complete);
    assert_eq!(view.overall_fraction, 1.0);
    assert_eq!(view.completed_stages, vec!["extract", "enrich"]);
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::HandOff {
                job_id: 1,
                result: None,
            },
        ]
    );
}

#[test]
fn reported_failure_freezes_fraction() {
    let (state, _) = feed(push_job(), &["[stage=enrich] 10/50"]);
    let before = state.view().overall_fraction;
    assert!(before > 0.0);

    let (state, effects) = feed(state, &["[ERROR] invalid archive format"]);
    let view = state.view();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("invalid archive format"));
    assert_eq!(view.overall_fraction, before);
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::HandOff { .. })));
    assert!(effects.contains(&Effect::CloseChannel { job_id: 1 }));
}

#[test]
fn transport_error_fails_and_late_frames_are_ignored() {
    let state = push_job();
    let (state, effects) = update(
        state,
        Msg::ChannelFailed {
            job_id: 1,
            reason: "connection reset".to_string(),
        },
    );
    assert!(effects.contains(&Effect::CloseChannel { job_id: 1 }));
    let failed = state.view();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(CONNECTION_LOST));

    let (state, effects) = feed(state, &["[stage=enrich] 40/50", "[DONE]"]);
    assert!(effects.is_empty());
    assert_eq!(state.view().status, failed.status);
    assert_eq!(state.view().overall_fraction, failed.overall_fraction);
    assert_eq!(state.view().error, failed.error);

    let (state, effects) = update(
        state,
        Msg::ChannelFailed {
            job_id: 1,
            reason: "again".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().error, failed.error);
}

#[test]
fn stale_and_duplicate_frames_never_lower_the_fraction() {
    let (state, _) = feed(
        push_job(),
        &[
            "📊 tmdb_matching: Matching films (100/100)",
            "📊 tmdb_metadata: Gathering film metadata (40/50)",
            "📊 tmdb_metadata: Gathering film metadata (10/50)",
            "📊 tmdb_matching: Matching films (50/100)",
            "📊 tmdb_metadata: Gathering film metadata (40/50)",
        ],
    );
    let view = state.view();
    assert!((view.overall_fraction - (0.45 + 0.8 * 0.45)).abs() < 1e-9);
    assert_eq!(view.current_label, "Gathering film metadata");
    assert_eq!(view.completed_stages, vec!["tmdb_matching"]);
}

#[test]
fn malformed_frame_keeps_job_running() {
    let (state, effects) = feed(push_job(), &["%%% nonsense %%%"]);
    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.status, JobStatus::Running);
    assert_eq!(view.current_label, "%%% nonsense %%%");
}

#[test]
fn embedded_result_is_handed_off_with_completion() {
    let (_, effects) = feed(
        push_job(),
        &[r#"{"stage":"complete","message":"done","stats":{"films":3}}"#],
    );
    assert_eq!(
        effects,
        vec![
            Effect::CloseChannel { job_id: 1 },
            Effect::HandOff {
                job_id: 1,
                result: Some(serde_json::json!({"films": 3})),
            },
        ]
    );
}
